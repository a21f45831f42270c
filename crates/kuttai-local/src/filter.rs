//! Post-completion response rewriting.
//!
//! The upstream model cannot be constrained at generation time, so every completion passes
//! through an ordered list of [`ResponseRule`]s. Each rule sees the message topics, the raw
//! completion, and the response as rewritten by the rules before it. Filtering is pure: side effects (the brand page
//! refresh) are returned as requests in [`Filtered::refresh`] for the caller to carry out.

use kuttai_core::ScrapedPage;
use regex::{Regex, RegexSet};
use std::sync::OnceLock;

pub const PRODUCT_NAME: &str = "KuttAI";
pub const DEVELOPER_NAME: &str = "EcoCee";
pub const DEVELOPER_DOMAIN: &str = "ecocee.in";

/// The model family name that must not surface as the assistant's identity.
const MODEL_FAMILY: &str = "gemma";

pub const BRAND_ANSWER: &str = "EcoCee is the development team that created KuttAI! You can visit them \
at ecocee.in. They built me on an open-source language model and customized it specifically for KTU students to help with studies, exams, and university-related queries.";

pub const SELF_INTRODUCTION: &str = "I'm KuttAI, a CLI tool developed by EcoCee (visit ecocee.in) \
using an open-source language model from Google DeepMind. I'm specifically designed to help KTU \
students with their academic needs!";

pub const TECHNOLOGY_ANSWER: &str = "I'm powered by an open-source Gemma model from Google DeepMind, \
but I've been customized and developed by EcoCee (ecocee.in) specifically for KTU students. KuttAI \
is the interface that makes this technology accessible for your academic needs!";

const ATTRIBUTION: &str = " I was developed by EcoCee (ecocee.in).";

/// Raw-response markers that mean the model described itself instead of the product.
const LEAK_MARKERS: [&str; 3] = ["gemma", "google", "deepmind"];

/// Minimum cached brand description length worth quoting.
const MIN_BRAND_DESCRIPTION_CHARS: usize = 50;

fn identity_patterns() -> &'static RegexSet {
    static RE: OnceLock<RegexSet> = OnceLock::new();
    RE.get_or_init(|| {
        RegexSet::new([
            r"(?i)who\s+(made|created|developed|built)\s+you",
            r"(?i)who\s+are\s+you",
            r"(?i)what\s+are\s+you",
            r"(?i)what('s| is) your name",
            r"(?i)tell me about yourself",
            r"(?i)introduce yourself",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

fn brand_patterns() -> &'static RegexSet {
    static RE: OnceLock<RegexSet> = OnceLock::new();
    RE.get_or_init(|| {
        RegexSet::new([
            r"(?i)what is ecocee",
            r"(?i)who is ecocee",
            r"(?i)tell me about ecocee",
            r"(?i)ecocee\.in",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

fn technology_patterns() -> &'static RegexSet {
    static RE: OnceLock<RegexSet> = OnceLock::new();
    RE.get_or_init(|| {
        RegexSet::new([
            r"(?i)what (model|technology) do you use",
            r"(?i)how do you work",
            r"(?i)what are you built on",
            r"(?i)underlying (tech|technology|model)",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

fn model_family_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)gemma").ok()).as_ref()
}

fn my_name_is_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)my name is").ok()).as_ref()
}

/// What the user's message is about, classified once per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Topics {
    pub brand: bool,
    pub identity: bool,
    pub technology: bool,
    pub mentions_name: bool,
}

impl Topics {
    pub fn classify(message: &str) -> Self {
        Self {
            brand: brand_patterns().is_match(message),
            identity: identity_patterns().is_match(message),
            technology: technology_patterns().is_match(message),
            mentions_name: message.to_lowercase().contains("name"),
        }
    }
}

/// One (predicate, rewrite) step. `apply` returns `None` when the rule does not fire.
///
/// `raw` is the completion as the model produced it; `current` carries earlier rewrites.
pub trait ResponseRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, topics: &Topics, raw: &str, current: &str) -> Option<String>;
    /// URL to refresh in the background when this rule fires.
    fn refresh_url(&self) -> Option<&'static str> {
        None
    }
}

/// Brand questions get the canned brand paragraph and a refresh of the brand page.
pub struct BrandTopic;

impl ResponseRule for BrandTopic {
    fn name(&self) -> &'static str {
        "brand_topic"
    }

    fn apply(&self, topics: &Topics, _raw: &str, _current: &str) -> Option<String> {
        topics.brand.then(|| BRAND_ANSWER.to_string())
    }

    fn refresh_url(&self) -> Option<&'static str> {
        Some(crate::scraper::BRAND_URL)
    }
}

/// Identity questions whose answer leaks the model family or omits the developer.
pub struct SelfIdentity;

impl ResponseRule for SelfIdentity {
    fn name(&self) -> &'static str {
        "self_identity"
    }

    fn apply(&self, topics: &Topics, raw: &str, _current: &str) -> Option<String> {
        if !topics.identity {
            return None;
        }
        let lower = raw.to_lowercase();
        let leaks = LEAK_MARKERS.iter().any(|m| lower.contains(m));
        let omits_brand = !lower.contains(&DEVELOPER_NAME.to_lowercase());
        (leaks || omits_brand).then(|| SELF_INTRODUCTION.to_string())
    }
}

pub struct TechnologyTopic;

impl ResponseRule for TechnologyTopic {
    fn name(&self) -> &'static str {
        "technology_topic"
    }

    fn apply(&self, topics: &Topics, _raw: &str, _current: &str) -> Option<String> {
        topics.technology.then(|| TECHNOLOGY_ANSWER.to_string())
    }
}

/// Replace the model family name with the product name in identity contexts.
pub struct LeakScrub;

impl ResponseRule for LeakScrub {
    fn name(&self) -> &'static str {
        "leak_scrub"
    }

    fn apply(&self, topics: &Topics, _raw: &str, response: &str) -> Option<String> {
        if !(topics.identity || topics.mentions_name) {
            return None;
        }
        if !response.to_lowercase().contains(MODEL_FAMILY) {
            return None;
        }
        let mut out = match model_family_re() {
            Some(re) => re.replace_all(response, PRODUCT_NAME).into_owned(),
            None => response.to_string(),
        };
        if let Some(re) = my_name_is_re() {
            out = re.replace_all(&out, "I'm").into_owned();
        }
        if !out.contains(DEVELOPER_NAME) || !out.contains(DEVELOPER_DOMAIN) {
            out.push_str(ATTRIBUTION);
        }
        Some(out)
    }
}

/// Result of one filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub text: String,
    /// Rules that fired, in evaluation order.
    pub fired: Vec<&'static str>,
    /// Pages the caller should refresh without blocking the reply.
    pub refresh: Vec<&'static str>,
}

pub struct ResponseFilter {
    rules: Vec<Box<dyn ResponseRule>>,
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BrandTopic),
            Box::new(SelfIdentity),
            Box::new(TechnologyTopic),
            Box::new(LeakScrub),
        ])
    }
}

impl ResponseFilter {
    pub fn new(rules: Vec<Box<dyn ResponseRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn apply(&self, raw_response: &str, message: &str) -> Filtered {
        let topics = Topics::classify(message);
        let mut text = raw_response.to_string();
        let mut fired = Vec::new();
        let mut refresh = Vec::new();
        for rule in &self.rules {
            if let Some(rewritten) = rule.apply(&topics, raw_response, &text) {
                text = rewritten;
                fired.push(rule.name());
                refresh.extend(rule.refresh_url());
            }
        }
        Filtered {
            text,
            fired,
            refresh,
        }
    }
}

/// Default rule set, text only.
pub fn filter(raw_response: &str, message: &str) -> String {
    ResponseFilter::default().apply(raw_response, message).text
}

/// Swap in the cached brand description when the message mentions the brand.
pub fn enrich_with_brand(response: &str, message: &str, brand_page: Option<&ScrapedPage>) -> String {
    if !message.to_lowercase().contains("ecocee") {
        return response.to_string();
    }
    match brand_page {
        Some(page) if page.description.chars().count() > MIN_BRAND_DESCRIPTION_CHARS => format!(
            "EcoCee is the development team behind KuttAI! Based on their website (ecocee.in):\n\n{}\n\n\
             They built me on an open-source language model and customized it for KTU students.",
            page.description
        ),
        _ => response.to_string(),
    }
}
