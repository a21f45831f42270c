//! Keyword-overlap context selection over the scrape cache.

use crate::cache::ScrapeCache;
use crate::extract::truncate_chars;
use kuttai_core::ScrapedPage;

/// Pages included in one context block.
pub const MAX_CONTEXT_PAGES: usize = 2;
/// Content excerpt length per page.
pub const EXCERPT_CHARS: usize = 500;

fn query_tokens(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Number of query tokens found as substrings of the page's combined text.
pub fn score(tokens: &[String], page: &ScrapedPage) -> usize {
    let hay = format!("{} {} {}", page.title, page.description, page.content).to_lowercase();
    tokens.iter().filter(|t| hay.contains(t.as_str())).count()
}

fn format_page(page: &ScrapedPage) -> String {
    let (excerpt, _) = truncate_chars(&page.content, EXCERPT_CHARS);
    format!(
        "Source: {}\nTitle: {}\nContent: {}...",
        page.url, page.title, excerpt
    )
}

/// Rank `pages` against `query` and keep the top [`MAX_CONTEXT_PAGES`] with a non-zero score.
///
/// Ties keep input order.
pub fn rank<'a>(query: &str, pages: &'a [ScrapedPage]) -> Vec<(usize, &'a ScrapedPage)> {
    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, &ScrapedPage)> = pages
        .iter()
        .map(|p| (score(&tokens, p), p))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(MAX_CONTEXT_PAGES);
    scored
}

/// Build the prompt context block for `query`, or `None` when nothing in the cache is relevant.
pub fn select_context(query: &str, cache: &ScrapeCache) -> Option<String> {
    let pages = cache.all();
    let ranked = rank(query, &pages);
    if ranked.is_empty() {
        return None;
    }
    Some(
        ranked
            .into_iter()
            .map(|(_, p)| format_page(p))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}
