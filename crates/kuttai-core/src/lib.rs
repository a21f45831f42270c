use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkErrorKind {
    ConnectionRefused,
    Timeout,
    Other(String),
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => f.write_str(
                "Connection refused. The website may be down or blocking requests.",
            ),
            Self::Timeout => {
                f.write_str("Connection timed out. The website may be slow or unavailable.")
            }
            Self::Other(msg) => write!(f, "Network error: {msg}"),
        }
    }
}

/// One failed candidate inside a fallback sequence.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub url: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid URL format: {0}")]
    MalformedUrl(String),
    #[error("Domain not allowed: {url}. Only {} are permitted.", .allowed.join(", "))]
    DomainNotAllowed { url: String, allowed: Vec<String> },
    #[error("{kind}")]
    Network { url: String, kind: NetworkErrorKind },
    #[error("HTTP Error: {status} - {reason}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },
    #[error("Could not access any paths for {base_url} ({} attempts)", .attempts.len())]
    AllPathsFailed {
        base_url: String,
        attempts: Vec<AttemptFailure>,
    },
    #[error("download failed for {url}: {message}")]
    Download { url: String, message: String },
    #[error("All download URLs failed: {last}")]
    AllDownloadsFailed { last: Box<Error> },
    #[error("io error: {0}")]
    Io(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("profile error: {0}")]
    Profile(String),
}

impl Error {
    /// Short, actionable next step for a human operator.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MalformedUrl(_) => "Check the URL spelling, e.g. https://ktu.edu.in",
            Self::DomainNotAllowed { .. } => {
                "Try a different URL on ecocee.in, ktu.edu.in or ktunotes.in."
            }
            Self::Network { .. } => "Check your internet connection and try again.",
            Self::HttpStatus { .. } | Self::AllPathsFailed { .. } => {
                "Some websites may be temporarily unavailable or block automated access. Try a different URL."
            }
            Self::Download { .. } | Self::AllDownloadsFailed { .. } => {
                "Download the model manually and place it in the models directory."
            }
            Self::Io(_) | Self::Profile(_) => "Check file permissions in the data directory.",
            Self::Llm(_) => "Make sure the local model runtime is running (e.g. `ollama serve`).",
            Self::NotConfigured(_) => "Run `kuttai doctor` to inspect the configuration.",
        }
    }

    /// Errors that a fallback sequence should absorb and move past.
    pub fn is_retryable_by_fallback(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::HttpStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "h1" => Some(Self::H1),
            "h2" => Some(Self::H2),
            "h3" => Some(Self::H3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "h1",
            Self::H2 => "h2",
            Self::H3 => "h3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    pub level: HeadingLevel,
    pub text: String,
}

/// One successfully retrieved and parsed page.
///
/// Bounds are enforced by the extractor: `content` holds at most
/// [`ScrapedPage::MAX_CONTENT_CHARS`] chars and `headings` at most
/// [`ScrapedPage::MAX_HEADINGS`] entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedPage {
    /// Canonical URL; the cache key.
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedPage {
    pub const MAX_CONTENT_CHARS: usize = 3_000;
    pub const MAX_HEADINGS: usize = 10;
    pub const MAX_DESCRIPTION_CHARS: usize = 200;
    pub const UNTITLED: &'static str = "Untitled Page";
    pub const NO_DESCRIPTION: &'static str = "No description available";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the whole request (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Extra request headers (best-effort; invalid names/values are dropped).
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub reason: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

/// Raw transport: one GET, no policy. Allowlisting and extraction live above this.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// The language-model runtime: text in, text out.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], opts: &SamplingOptions) -> Result<String>;
}
