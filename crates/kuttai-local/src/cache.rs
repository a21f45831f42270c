//! In-memory scrape cache, keyed by canonical URL.
//!
//! The cache is process-scoped and unbounded: there is no TTL and no eviction, and nothing is
//! persisted. The working set is a handful of pages from three domains, so growth is bounded in
//! practice by what an operator fetches in one session. Callers needing freshness re-fetch.
//!
//! `ScrapeCache` is a cheap cloneable handle; clones share the same store. Iteration order is the
//! key order of a `BTreeMap`, which keeps relevance tie-breaking deterministic.

use crate::url_guard;
use kuttai_core::ScrapedPage;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
pub struct ScrapeCache {
    pages: Arc<RwLock<BTreeMap<String, ScrapedPage>>>,
}

impl ScrapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite (never merge) the entry for `page.url`.
    pub fn put(&self, page: ScrapedPage) {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        pages.insert(page.url.clone(), page);
    }

    pub fn get(&self, canonical_url: &str) -> Option<ScrapedPage> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.get(canonical_url).cloned()
    }

    /// Lookup by a user-supplied URL (normalized first).
    pub fn get_raw(&self, raw_url: &str) -> Option<ScrapedPage> {
        let canonical = url_guard::normalize(raw_url)?;
        self.get(&canonical)
    }

    pub fn contains(&self, canonical_url: &str) -> bool {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.contains_key(canonical_url)
    }

    /// Snapshot of every cached page, in key order.
    pub fn all(&self) -> Vec<ScrapedPage> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.values().cloned().collect()
    }

    pub fn urls(&self) -> Vec<String> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
