//! URL canonicalization and the fixed domain allowlist.
//!
//! Every network access goes through [`Allowlist::check`] first.

use kuttai_core::{Error, Result};

/// The three domains the assistant may contact.
pub const ALLOWED_DOMAINS: [&str; 3] = ["ecocee.in", "ktu.edu.in", "ktunotes.in"];

/// Canonicalize a user-supplied URL: prepend `https://` when no scheme is present,
/// then parse and re-serialize. Returns `None` for malformed input.
pub fn normalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let u = url::Url::parse(&with_scheme).ok()?;
    u.host_str()?;
    Some(u.to_string())
}

fn host_of(canonical: &str) -> Option<String> {
    let u = url::Url::parse(canonical).ok()?;
    u.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

fn host_matches(host: &str, pat: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    let pat = pat.trim().to_ascii_lowercase();
    if host == pat {
        return true;
    }
    host.ends_with(&format!(".{pat}"))
}

/// How a URL host is compared against an allowlisted domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostMatch {
    /// `host == domain` or `host` ends with `.domain`.
    #[default]
    Suffix,
    /// `host` contains `domain` anywhere. Admits `ktu.edu.in.evil.com`.
    Substring,
}

#[derive(Debug, Clone)]
pub struct Allowlist {
    domains: Vec<String>,
    mode: HostMatch,
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new(ALLOWED_DOMAINS, HostMatch::Suffix)
    }
}

impl Allowlist {
    pub fn new<I, S>(domains: I, mode: HostMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn mode(&self) -> HostMatch {
        self.mode
    }

    /// True iff the canonical URL's host is covered by one of the domains.
    pub fn is_allowed(&self, canonical_url: &str) -> bool {
        let Some(host) = host_of(canonical_url) else {
            return false;
        };
        self.domains.iter().any(|d| match self.mode {
            HostMatch::Suffix => host_matches(&host, d),
            HostMatch::Substring => host.contains(&d.to_ascii_lowercase()),
        })
    }

    /// The domain entry that admits this URL, if any.
    pub fn matching_domain(&self, canonical_url: &str) -> Option<&str> {
        let host = host_of(canonical_url)?;
        self.domains
            .iter()
            .find(|d| match self.mode {
                HostMatch::Suffix => host_matches(&host, d),
                HostMatch::Substring => host.contains(&d.to_ascii_lowercase()),
            })
            .map(String::as_str)
    }

    /// Normalize, then enforce the allowlist. The gate in front of every request.
    pub fn check(&self, raw_url: &str) -> Result<String> {
        let canonical =
            normalize(raw_url).ok_or_else(|| Error::MalformedUrl(raw_url.trim().to_string()))?;
        if !self.is_allowed(&canonical) {
            return Err(Error::DomainNotAllowed {
                url: canonical,
                allowed: self.domains.clone(),
            });
        }
        Ok(canonical)
    }
}
