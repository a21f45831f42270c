//! HTML → [`ScrapedPage`] extraction.
//!
//! This is intentionally "good enough" and deterministic, not a readability engine: target sites
//! are static informational pages, so a priority-ordered selector scan with an early-exit length
//! threshold finds the main content well enough.
//!
//! `extract` never fails. Missing fields degrade to placeholders.

use chrono::Utc;
use html_scraper::{ElementRef, Html, Selector};
use kuttai_core::{Heading, HeadingLevel, ScrapedPage};

/// Removed from the tree before any text is read.
const NOISE_SELECTOR: &str = "script, style, nav, footer, header, aside";

/// Candidate main-content containers, most specific first. `body` is the catch-all.
const CONTENT_SELECTORS: [&str; 9] = [
    "main",
    "article",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
    ".main-content",
    ".page-content",
    "body",
];

/// A candidate with more cleaned text than this stops the scan.
const ENOUGH_CONTENT_CHARS: usize = 300;

fn sel(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Collapse every whitespace run to a single space and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    if max_chars == 0 {
        return (String::new(), !s.is_empty());
    }
    let mut out = String::new();
    for (n, ch) in s.chars().enumerate() {
        if n >= max_chars {
            return (out, true);
        }
        out.push(ch);
    }
    (out, false)
}

fn strip_noise(doc: &mut Html) {
    let Some(noise) = sel(NOISE_SELECTOR) else {
        return;
    };
    let ids: Vec<_> = doc.select(&noise).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Matches reachable from the document root. `Html::select` scans the whole node arena, which
/// still holds detached noise subtrees.
fn select_live<'a, 'b>(
    doc: &'a Html,
    selector: &'b Selector,
) -> html_scraper::element_ref::Select<'a, 'b> {
    doc.root_element().select(selector)
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let s = sel(selector)?;
    select_live(doc, &s)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let s = sel(selector)?;
    let el = select_live(doc, &s).next()?;
    let v = el.value().attr(attr)?.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn pick_title(doc: &Html) -> String {
    first_text(doc, "title")
        .or_else(|| first_text(doc, "h1"))
        .unwrap_or_else(|| ScrapedPage::UNTITLED.to_string())
}

fn pick_description(doc: &Html) -> String {
    first_attr(doc, "meta[name=\"description\"]", "content")
        .or_else(|| first_attr(doc, "meta[property=\"og:description\"]", "content"))
        .or_else(|| {
            first_text(doc, "p").map(|p| truncate_chars(&p, ScrapedPage::MAX_DESCRIPTION_CHARS).0)
        })
        .unwrap_or_else(|| ScrapedPage::NO_DESCRIPTION.to_string())
}

/// Scan [`CONTENT_SELECTORS`] in order; the first present candidate with enough text wins,
/// otherwise the last present candidate is kept.
fn pick_content(doc: &Html) -> String {
    let mut content = String::new();
    for selector in CONTENT_SELECTORS {
        let Some(s) = sel(selector) else {
            continue;
        };
        let mut matched = false;
        let mut raw = String::new();
        for el in select_live(doc, &s) {
            matched = true;
            for t in el.text() {
                raw.push_str(t);
                raw.push(' ');
            }
        }
        if !matched {
            continue;
        }
        content = clean_text(&raw);
        if content.chars().count() > ENOUGH_CONTENT_CHARS {
            break;
        }
    }
    content
}

fn pick_headings(doc: &Html) -> Vec<Heading> {
    let Some(s) = sel("h1, h2, h3") else {
        return Vec::new();
    };
    select_live(doc, &s)
        .filter_map(|el| {
            let level = HeadingLevel::from_tag(el.value().name())?;
            let text = element_text(&el);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .take(ScrapedPage::MAX_HEADINGS)
        .collect()
}

/// Parse `html` fetched from `source_url` into a bounded [`ScrapedPage`].
pub fn extract(html: &str, source_url: &str) -> ScrapedPage {
    let mut doc = Html::parse_document(html);
    strip_noise(&mut doc);

    let title = pick_title(&doc);
    let description = pick_description(&doc);
    let (content, _clipped) = truncate_chars(&pick_content(&doc), ScrapedPage::MAX_CONTENT_CHARS);
    let headings = pick_headings(&doc);
    let word_count = content.split_whitespace().count();

    ScrapedPage {
        url: source_url.to_string(),
        title,
        description,
        content,
        headings,
        word_count,
        scraped_at: Utc::now(),
    }
}
