//! One chat session: prompt assembly, the model call, and post-filtering.
//!
//! Per turn the order is fixed: brand pre-fetch (if mentioned), context selection from the cache,
//! one model call, then the response filter. Turns never overlap.

use crate::profile::{or_placeholder, UserProfile};
use kuttai_core::{ChatMessage, ChatModel, Result, Role, SamplingOptions};
use kuttai_local::filter::{self, ResponseFilter};
use kuttai_local::relevance;
use kuttai_local::scraper::{Scraper, BRAND_URL};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prior messages kept for the model (user + assistant).
pub const MAX_HISTORY_MESSAGES: usize = 20;

pub fn system_prompt(profile: &UserProfile) -> String {
    let np = "Not provided";
    format!(
        "IMPORTANT: You are KuttAI, a helpful assistant for KTU students developed by EcoCee.
Your name is KuttAI. Never say your name is Gemma or anything else.

You can access information from KTU-related websites when needed.

Always be friendly, helpful, and focused on assisting with studies, exams, and university matters.

Key information about the user:
- Name: {}
- Semester: {}
- Branch: {}
- Interests: {}

Available commands:
- /profile - View and edit your profile
- /sites - List available KTU websites
- /clear - Clear chat history
- /help - Show available commands
- Regular chat - Ask questions about studies, exams, etc.

Focus on providing accurate and helpful information for KTU students.
Always identify yourself as KuttAI, developed by EcoCee.",
        or_placeholder(&profile.name, np),
        or_placeholder(&profile.semester, np),
        or_placeholder(&profile.branch, np),
        or_placeholder(&profile.interests, np),
    )
}

/// The user turn as sent to the model: message, optional context block, profile JSON.
pub fn compose_prompt(message: &str, context: Option<&str>, profile: &UserProfile) -> String {
    let mut out = message.to_string();
    if let Some(ctx) = context {
        out.push_str("\n\nContext from KTU websites:\n");
        out.push_str(ctx);
    }
    let profile_json = serde_json::to_string(profile).unwrap_or_else(|_| "{}".to_string());
    out.push_str("\n\nUser profile: ");
    out.push_str(&profile_json);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Filter rules that rewrote the model output.
    pub rewritten_by: Vec<&'static str>,
    pub used_context: bool,
}

pub struct ChatSession {
    model: Arc<dyn ChatModel>,
    scraper: Scraper,
    filter: ResponseFilter,
    sampling: SamplingOptions,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn ChatModel>, scraper: Scraper) -> Self {
        Self {
            model,
            scraper,
            filter: ResponseFilter::default(),
            sampling: SamplingOptions::default(),
            history: Vec::new(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingOptions) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget the conversation. The profile and scrape cache are untouched.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub async fn turn(&mut self, message: &str, profile: &UserProfile) -> Result<Reply> {
        let mentions_brand = message.to_lowercase().contains("ecocee");
        if mentions_brand {
            if let Err(e) = self.scraper.ensure_cached(BRAND_URL).await {
                warn!(error = %e, "could not refresh brand page, using cached data");
            }
        }

        let context = relevance::select_context(message, self.scraper.cache());
        let prompt = compose_prompt(message, context.as_deref(), profile);

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new(Role::System, system_prompt(profile)));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new(Role::User, prompt.clone()));

        let raw = self.model.complete(&messages, &self.sampling).await?;

        let filtered = self.filter.apply(&raw, message);
        for url in &filtered.refresh {
            self.scraper.spawn_refresh(url);
        }
        let text = if mentions_brand {
            let brand = self.scraper.cache().get_raw(BRAND_URL);
            filter::enrich_with_brand(&filtered.text, message, brand.as_ref())
        } else {
            filtered.text
        };
        debug!(rules = ?filtered.fired, context = context.is_some(), "turn complete");

        self.history.push(ChatMessage::new(Role::User, prompt));
        self.history.push(ChatMessage::new(Role::Assistant, text.clone()));
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }

        Ok(Reply {
            text,
            rewritten_by: filtered.fired,
            used_context: context.is_some(),
        })
    }
}
