use futures_util::StreamExt;
use kuttai_core::{Error, FetchBackend, FetchRequest, FetchResponse, NetworkErrorKind, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod cache;
pub mod download;
pub mod extract;
pub mod filter;
pub mod ollama;
pub mod relevance;
pub mod scraper;
pub mod url_guard;

/// Default bounded timeout for a single page fetch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
/// Default cap on bytes read from one HTML response.
pub const DEFAULT_MAX_BYTES: u64 = 5_000_000;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// True when an `io::Error` of kind `ConnectionRefused` sits anywhere in the source chain.
///
/// `reqwest::Error::is_connect` also covers DNS and TLS handshake failures, so it is not enough.
fn is_connection_refused(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = Some(e);
    while let Some(err) = cur {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        cur = err.source();
    }
    false
}

/// Map a transport failure onto the operator-facing taxonomy.
pub(crate) fn classify_reqwest_error(url: &str, e: &reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        NetworkErrorKind::Timeout
    } else if e.is_connect() && is_connection_refused(e) {
        NetworkErrorKind::ConnectionRefused
    } else {
        NetworkErrorKind::Other(e.to_string())
    };
    Error::Network {
        url: url.to_string(),
        kind,
    }
}

/// Build the shared HTTP client.
///
/// Certificate validation is disabled: the allowlisted university sites have historically served
/// broken chains. Only use this client behind [`url_guard::Allowlist::check`].
pub fn build_client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_millis(timeout_ms.min(10_000)))
        .timeout(Duration::from_millis(timeout_ms))
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_ms)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn apply_headers(
        &self,
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let mut timings_ms = BTreeMap::new();
        let t_req = std::time::Instant::now();
        let url = url::Url::parse(&req.url).map_err(|_| Error::MalformedUrl(req.url.clone()))?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        rb = self.apply_headers(rb, &req.headers);
        let resp = rb
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&req.url, &e))?;

        let final_url = resp.url().to_string();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(DEFAULT_MAX_BYTES) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(&req.url, &e))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        timings_ms.insert("network_fetch".to_string(), t_req.elapsed().as_millis());

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            bytes,
            truncated,
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn local_fetcher_returns_body_and_status() {
        let app = Router::new()
            .route(
                "/",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<h1>hi</h1>") }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "nope") }),
            );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(2_000).unwrap();

        let ok = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(ok.text_lossy(), "<h1>hi</h1>");
        assert_eq!(ok.content_type.as_deref(), Some("text/html"));
        assert!(!ok.truncated);

        let missing = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/missing")))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.reason, "Not Found");
    }

    #[tokio::test]
    async fn local_fetcher_truncates_at_max_bytes() {
        let app = Router::new().route("/", get(|| async { "x".repeat(10_000) }));
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(2_000).unwrap();
        let mut req = FetchRequest::new(format!("http://{addr}/"));
        req.max_bytes = Some(100);
        let resp = fetcher.fetch(&req).await.unwrap();
        assert_eq!(resp.bytes.len(), 100);
        assert!(resp.truncated);
    }

    #[tokio::test]
    async fn slow_server_surfaces_as_timeout() {
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new(10_000).unwrap();
        let req = FetchRequest::new(format!("http://{addr}/")).with_timeout_ms(200);
        let err = fetcher.fetch(&req).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Network {
                    kind: NetworkErrorKind::Timeout,
                    ..
                }
            ),
            "unexpected error: {err:?}"
        );
    }

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "connect: {}", self.0)
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn refusal_is_found_only_through_an_io_refused_source() {
        let refused = Wrapped(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(is_connection_refused(&refused));

        let dns = Wrapped(std::io::Error::other("failed to lookup address information"));
        assert!(!is_connection_refused(&dns));

        let tls = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(!is_connection_refused(&tls));
    }

    #[tokio::test]
    async fn unresolvable_host_is_not_reported_as_refused() {
        let fetcher = LocalFetcher::new(2_000).unwrap();
        let err = fetcher
            .fetch(&FetchRequest::new("http://kuttai-test.invalid/"))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::Network {
                    kind: NetworkErrorKind::Other(_) | NetworkErrorKind::Timeout,
                    ..
                }
            ),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn closed_port_surfaces_as_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = LocalFetcher::new(2_000).unwrap();
        let err = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::Network {
                    kind: NetworkErrorKind::ConnectionRefused,
                    ..
                }
            ),
            "unexpected error: {err:?}"
        );
    }
}
