//! Fetch orchestration: allowlist gate → GET → extract → cache.
//!
//! Two retry shapes live here and in [`crate::download`]; both are plain sequential loops over
//! candidates that absorb per-attempt failures and only give up once every candidate failed.

use crate::cache::ScrapeCache;
use crate::extract;
use crate::url_guard::Allowlist;
use kuttai_core::{AttemptFailure, Error, FetchBackend, FetchRequest, Result, ScrapedPage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The brand's home page, refreshed when users ask about the brand.
pub const BRAND_URL: &str = "https://ecocee.in";

/// Entry points tried in order for `ktu.edu.in`, whose root is unreliable.
pub const KTU_FALLBACK_PATHS: [&str; 5] = ["", "/home", "/index.php", "/eu/index.php", "/notifications"];

/// Per-domain ordered path suffixes for [`Scraper::fetch_with_fallback`].
#[derive(Debug, Clone)]
pub struct FallbackPaths {
    table: BTreeMap<String, Vec<String>>,
}

impl Default for FallbackPaths {
    fn default() -> Self {
        Self::empty().with_paths("ktu.edu.in", KTU_FALLBACK_PATHS)
    }
}

impl FallbackPaths {
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    pub fn with_paths<I, S>(mut self, domain: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.insert(
            domain.to_ascii_lowercase(),
            paths.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn for_domain(&self, domain: &str) -> Option<&[String]> {
        self.table
            .get(&domain.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}

fn join_path(base_url: &str, path: &str) -> String {
    if path.is_empty() {
        return base_url.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[derive(Clone)]
pub struct Scraper {
    backend: Arc<dyn FetchBackend>,
    cache: ScrapeCache,
    allowlist: Allowlist,
    fallback: FallbackPaths,
    timeout_ms: u64,
}

impl Scraper {
    pub fn new(backend: Arc<dyn FetchBackend>, cache: ScrapeCache) -> Self {
        Self {
            backend,
            cache,
            allowlist: Allowlist::default(),
            fallback: FallbackPaths::default(),
            timeout_ms: crate::DEFAULT_FETCH_TIMEOUT_MS,
        }
    }

    pub fn with_allowlist(mut self, allowlist: Allowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_fallback_paths(mut self, fallback: FallbackPaths) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn cache(&self) -> &ScrapeCache {
        &self.cache
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Fetch one URL. Never retries and never swallows: every failure reaches the caller.
    pub async fn fetch(&self, raw_url: &str) -> Result<ScrapedPage> {
        info!(url = %raw_url, "accessing");
        let canonical = self.allowlist.check(raw_url)?;
        let req = FetchRequest::new(canonical.clone()).with_timeout_ms(self.timeout_ms);
        let resp = match self.backend.fetch(&req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %canonical, error = %e, "fetch failed");
                return Err(e);
            }
        };
        if resp.status != 200 {
            warn!(url = %canonical, status = resp.status, "non-200 response");
            return Err(Error::HttpStatus {
                url: canonical,
                status: resp.status,
                reason: resp.reason,
            });
        }

        let page = extract::extract(&resp.text_lossy(), &canonical);
        debug!(
            url = %canonical,
            title = %page.title,
            words = page.word_count,
            truncated = resp.truncated,
            "page extracted"
        );
        self.cache.put(page.clone());
        Ok(page)
    }

    /// Try `base_url` + each path in order; the first success wins.
    ///
    /// Exactly one `fetch` per path is attempted until one succeeds.
    pub async fn fetch_with_fallback<S: AsRef<str>>(
        &self,
        base_url: &str,
        paths: &[S],
    ) -> Result<ScrapedPage> {
        let mut attempts = Vec::with_capacity(paths.len());
        for path in paths {
            let url = join_path(base_url, path.as_ref());
            info!(url = %url, "trying");
            match self.fetch(&url).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    if e.is_retryable_by_fallback() {
                        warn!(url = %url, error = %e, "path failed, advancing");
                    } else {
                        warn!(url = %url, error = %e, "path rejected, advancing");
                    }
                    attempts.push(AttemptFailure {
                        url,
                        message: e.to_string(),
                    });
                }
            }
        }
        Err(Error::AllPathsFailed {
            base_url: base_url.to_string(),
            attempts,
        })
    }

    /// The `/fetch` entry point: domains with a fallback table go through
    /// [`Scraper::fetch_with_fallback`], everything else through [`Scraper::fetch`].
    ///
    /// A non-root path given by the user is tried before the table's paths.
    pub async fn fetch_for_command(&self, raw_url: &str) -> Result<ScrapedPage> {
        let canonical = self.allowlist.check(raw_url)?;
        let paths = self
            .allowlist
            .matching_domain(&canonical)
            .and_then(|d| self.fallback.for_domain(d));
        let Some(paths) = paths else {
            return self.fetch(&canonical).await;
        };

        let u = url::Url::parse(&canonical).map_err(|_| Error::MalformedUrl(canonical.clone()))?;
        let base = u.origin().ascii_serialization();
        let mut candidates: Vec<String> = Vec::with_capacity(paths.len() + 1);
        let user_path = match u.query() {
            Some(q) => format!("{}?{q}", u.path()),
            None => u.path().to_string(),
        };
        if user_path != "/" && !paths.iter().any(|p| p == &user_path) {
            candidates.push(user_path);
        }
        candidates.extend(paths.iter().cloned());
        self.fetch_with_fallback(&base, &candidates).await
    }

    /// Return the cached page for `raw_url`, fetching it only when absent.
    pub async fn ensure_cached(&self, raw_url: &str) -> Result<ScrapedPage> {
        if let Some(page) = self.cache.get_raw(raw_url) {
            return Ok(page);
        }
        self.fetch(raw_url).await
    }

    /// Fire-and-forget [`Scraper::ensure_cached`]; failures are logged and dropped.
    pub fn spawn_refresh(&self, raw_url: &str) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let url = raw_url.to_string();
        tokio::spawn(async move {
            match this.ensure_cached(&url).await {
                Ok(page) => debug!(url = %page.url, "background refresh done"),
                Err(e) => debug!(url = %url, error = %e, "background refresh failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuttai_core::{FetchResponse, NetworkErrorKind};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBackend {
        routes: HashMap<String, (u16, String)>,
        requested: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes
                .insert(url.to_string(), (status, body.to_string()));
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl FetchBackend for ScriptedBackend {
        async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
            self.requested.lock().unwrap().push(req.url.clone());
            let Some((status, body)) = self.routes.get(&req.url) else {
                return Err(Error::Network {
                    url: req.url.clone(),
                    kind: NetworkErrorKind::ConnectionRefused,
                });
            };
            Ok(FetchResponse {
                url: req.url.clone(),
                final_url: req.url.clone(),
                status: *status,
                reason: String::new(),
                content_type: Some("text/html".to_string()),
                bytes: body.clone().into_bytes(),
                truncated: false,
                timings_ms: BTreeMap::new(),
            })
        }
    }

    fn scraper(backend: Arc<ScriptedBackend>) -> Scraper {
        Scraper::new(backend, ScrapeCache::new())
    }

    #[tokio::test]
    async fn fetch_rejects_before_any_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let s = scraper(backend.clone());

        let err = s.fetch("https://evil.com").await.unwrap_err();
        assert!(matches!(err, Error::DomainNotAllowed { .. }));
        let err = s.fetch("   ").await.unwrap_err();
        assert!(matches!(err, Error::MalformedUrl(_)));
        assert!(backend.requested().is_empty());
    }

    #[tokio::test]
    async fn fetch_surfaces_http_status_and_leaves_cache_untouched() {
        let backend =
            Arc::new(ScriptedBackend::default().route("https://ktunotes.in/", 503, "busy"));
        let s = scraper(backend);
        match s.fetch("ktunotes.in").await {
            Err(Error::HttpStatus { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        assert!(s.cache().is_empty());
    }

    #[tokio::test]
    async fn fetch_extracts_and_caches_under_canonical_url() {
        let backend = Arc::new(ScriptedBackend::default().route(
            "https://ecocee.in/",
            200,
            "<html><head><title>EcoCee</title></head><body><p>We build tools.</p></body></html>",
        ));
        let s = scraper(backend);
        let page = s.fetch("ecocee.in").await.unwrap();
        assert_eq!(page.url, "https://ecocee.in/");
        assert_eq!(page.title, "EcoCee");
        assert_eq!(s.cache().get("https://ecocee.in/").unwrap().title, "EcoCee");
    }

    #[tokio::test]
    async fn fallback_attempts_each_path_exactly_once_before_giving_up() {
        let backend = Arc::new(ScriptedBackend::default());
        let s = scraper(backend.clone());
        let paths = ["", "/a", "/b", "/c"];
        let err = s
            .fetch_with_fallback("https://ktu.edu.in", &paths)
            .await
            .unwrap_err();
        match err {
            Error::AllPathsFailed { attempts, .. } => assert_eq!(attempts.len(), paths.len()),
            other => panic!("expected AllPathsFailed, got {other:?}"),
        }
        assert_eq!(backend.requested().len(), paths.len());
    }

    #[tokio::test]
    async fn fallback_tolerates_disallowed_candidates() {
        let backend = Arc::new(ScriptedBackend::default());
        let s = scraper(backend.clone());
        let err = s
            .fetch_with_fallback("https://evil.com", &["", "/x"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllPathsFailed { .. }));
        assert!(backend.requested().is_empty());
    }

    #[tokio::test]
    async fn command_fetch_uses_fallback_table_and_caches_only_the_winner() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .route("https://ktu.edu.in/home", 500, "oops")
                .route(
                    "https://ktu.edu.in/index.php",
                    200,
                    r#"<html><head><title>KTU Portal</title>
                       <meta name="description" content="APJ Abdul Kalam Technological University">
                       </head><body><main>Announcements</main></body></html>"#,
                )
                .route("https://ktu.edu.in/notifications", 200, "<title>later</title>"),
        );
        let s = scraper(backend.clone());

        let page = s.fetch_for_command("https://ktu.edu.in").await.unwrap();
        assert_eq!(page.title, "KTU Portal");
        assert_eq!(page.description, "APJ Abdul Kalam Technological University");
        assert_eq!(s.cache().len(), 1);
        assert_eq!(
            s.cache().urls(),
            vec!["https://ktu.edu.in/index.php".to_string()]
        );
        assert_eq!(
            backend.requested(),
            vec![
                "https://ktu.edu.in/".to_string(),
                "https://ktu.edu.in/home".to_string(),
                "https://ktu.edu.in/index.php".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn command_fetch_tries_user_path_first_for_fallback_domains() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .route("https://ktu.edu.in/exam/timetable", 200, "<title>Timetable</title>"),
        );
        let s = scraper(backend.clone());
        let page = s
            .fetch_for_command("ktu.edu.in/exam/timetable")
            .await
            .unwrap();
        assert_eq!(page.title, "Timetable");
        assert_eq!(backend.requested().len(), 1);
    }

    #[tokio::test]
    async fn command_fetch_goes_direct_for_other_domains() {
        let backend = Arc::new(ScriptedBackend::default());
        let s = scraper(backend.clone());
        let err = s.fetch_for_command("https://ktunotes.in").await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert_eq!(backend.requested(), vec!["https://ktunotes.in/".to_string()]);
    }

    #[tokio::test]
    async fn spawn_refresh_fills_cache_and_swallows_failures() {
        let backend = Arc::new(ScriptedBackend::default().route(
            "https://ecocee.in/",
            200,
            "<title>EcoCee</title>",
        ));
        let s = scraper(backend.clone());
        s.spawn_refresh(BRAND_URL).await.unwrap();
        assert!(s.cache().contains("https://ecocee.in/"));

        // Cached now: no second request.
        s.spawn_refresh(BRAND_URL).await.unwrap();
        assert_eq!(backend.requested().len(), 1);

        // Failing refresh completes without panicking.
        s.spawn_refresh("https://ktunotes.in").await.unwrap();
    }
}
