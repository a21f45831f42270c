//! Slash-command parsing and the static texts they print.

use crate::profile::{or_placeholder, UserProfile};
use kuttai_core::ScrapedPage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Profile,
    ProfileEdit,
    ProfileUnknown(String),
    Sites,
    Clear,
    Help,
    /// `/fetch` with its URL argument, if any.
    Fetch(Option<String>),
    About,
    Exit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command(Command),
    Chat(String),
}

/// Classify one line of REPL input.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(
        line.to_lowercase().as_str(),
        "exit" | "quit" | "/exit" | "/quit"
    ) {
        return Input::Command(Command::Exit);
    }
    if !line.starts_with('/') {
        return Input::Chat(line.to_string());
    }

    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().map(str::to_string);
    let cmd = match name.as_str() {
        "/profile" => match arg.as_deref() {
            None => Command::Profile,
            Some("edit") => Command::ProfileEdit,
            Some(other) => Command::ProfileUnknown(other.to_string()),
        },
        "/sites" => Command::Sites,
        "/clear" => Command::Clear,
        "/help" => Command::Help,
        "/fetch" => Command::Fetch(arg),
        "/about" => Command::About,
        _ => Command::Unknown(name),
    };
    Input::Command(cmd)
}

pub const HELP_TEXT: &str = "\
🤖 KuttAI Commands:
  /profile       - View and edit your profile
  /sites         - List available KTU websites
  /clear         - Clear chat history
  /fetch <url>   - Get information from KTU website
  /about         - Learn about KuttAI
  /help          - Show this help message
  exit/quit      - Exit the chatbot

💬 Chat Examples:
  'What are the upcoming exam dates?'
  'Tell me about S6 CSE syllabus'
  'How to calculate SGPA?'
  'Recent notifications from KTU'
";

pub const SITES_TEXT: &str = "\
🌐 Available KTU Websites:
   • https://ecocee.in - EcoCee Development
   • https://ktu.edu.in - KTU Official Website
   • https://ktunotes.in - KTU Notes & Materials

KuttAI can fetch information from these sites when needed.";

pub const FETCH_USAGE: &str = "\
❌ Please provide a URL to fetch.
Usage: /fetch <URL>
Example: /fetch https://ktu.edu.in";

pub fn about_text() -> String {
    let rule = "=".repeat(50);
    format!(
        "{rule}
📘 KuttAI - KTU STUDENT ASSISTANT
{rule}
Developed by EcoCee (ecocee.in)
Version: {}

KuttAI helps KTU students with:
• Study materials and notes
• Exam schedules and results
• University notifications
• Academic guidance
• And much more!

Your data is stored locally on your machine.
{rule}",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn profile_text(profile: &UserProfile) -> String {
    let mut out = String::from("📋 Your KuttAI Profile:\n");
    for (label, value) in profile.fields() {
        out.push_str(&format!("   {label}: {}\n", or_placeholder(value, "Not set")));
    }
    out.push_str("\nUse /profile edit to update your information");
    out
}

/// Longest description excerpt shown after `/fetch`.
pub const FETCH_EXCERPT_CHARS: usize = 150;

pub fn fetch_summary(page: &ScrapedPage) -> String {
    let excerpt: String = page.description.chars().take(FETCH_EXCERPT_CHARS).collect();
    let ellipsis = if page.description.chars().count() > FETCH_EXCERPT_CHARS {
        "..."
    } else {
        ""
    };
    format!(
        "📄 Information Retrieved:\n   Title: {}\n   Source: {}\n   Content: {excerpt}{ellipsis}\n   ✅ Data stored for context",
        page.title, page.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    #[test]
    fn exit_words_are_case_insensitive() {
        for w in ["exit", "QUIT", "/exit", " /Quit "] {
            assert_eq!(parse(w), Input::Command(Command::Exit), "{w}");
        }
        assert_eq!(parse("exit now"), Input::Chat("exit now".to_string()));
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(parse(""), Input::Empty);
        assert_eq!(parse("/profile"), Input::Command(Command::Profile));
        assert_eq!(parse("/profile edit"), Input::Command(Command::ProfileEdit));
        assert_eq!(
            parse("/profile nuke"),
            Input::Command(Command::ProfileUnknown("nuke".to_string()))
        );
        assert_eq!(
            parse("/FETCH https://ktu.edu.in"),
            Input::Command(Command::Fetch(Some("https://ktu.edu.in".to_string())))
        );
        assert_eq!(parse("/fetch"), Input::Command(Command::Fetch(None)));
        assert_eq!(
            parse("/bogus"),
            Input::Command(Command::Unknown("/bogus".to_string()))
        );
        assert_eq!(
            parse("  what is sgpa "),
            Input::Chat("what is sgpa".to_string())
        );
    }

    #[test]
    fn fetch_summary_truncates_long_descriptions() {
        let mut page = ScrapedPage {
            url: "https://ktu.edu.in/index.php".to_string(),
            title: "KTU".to_string(),
            description: "d".repeat(200),
            content: String::new(),
            headings: Vec::new(),
            word_count: 0,
            scraped_at: Utc::now(),
        };
        let s = fetch_summary(&page);
        assert!(s.contains(&format!("Content: {}...", "d".repeat(150))));
        assert!(s.contains("Source: https://ktu.edu.in/index.php"));

        page.description = "short".to_string();
        assert!(fetch_summary(&page).contains("Content: short\n"));
    }

    #[test]
    fn profile_text_marks_missing_fields() {
        let p = UserProfile {
            name: "Anu".to_string(),
            ..UserProfile::default()
        };
        let s = profile_text(&p);
        assert!(s.contains("Name: Anu"));
        assert!(s.contains("Branch: Not set"));
    }

    proptest! {
        #[test]
        fn parse_never_panics_and_chat_is_trimmed(line in "\\PC{0,64}") {
            if let Input::Chat(msg) = parse(&line) {
                prop_assert_eq!(msg.trim(), msg.as_str());
                prop_assert!(!msg.starts_with('/'));
            }
        }
    }
}
