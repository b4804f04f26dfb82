use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::{ExtractionStats, Message, Role};

// ── Constants ────────────────────────────────────────────────────────────────

const DEFAULT_TITLE: &str = "Untitled Conversation";

/// Attribute the share page uses to tag conversation turn elements.
const ROLE_MARKER_SELECTOR: &str = "[data-message-author-role]";

/// Preferred content sub-elements inside a turn element.
const CONTENT_SELECTOR: &str = "[data-message-content], .markdown, .prose";

/// Messages at or below this many characters are discarded.
const MIN_CONTENT_LEN: usize = 5;

// ── Lazy static regexes ──────────────────────────────────────────────────────

static TITLE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^chatgpt\s*-\s*").unwrap());

// The bare role-name form requires a colon so that content which merely
// starts with the word "You" is never truncated.
static LABEL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:chatgpt|you)(?:\s+said)?\s*:\s*").unwrap());

static LABEL_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:chatgpt|you)\s+said:?$").unwrap());

// ── Public result type ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub title: String,
    pub messages: Vec<Message>,
    pub stats: ExtractionStats,
}

// ── Extraction pipeline ──────────────────────────────────────────────────────

/// Extract the conversation from a rendered share page.
///
/// Walks every element carrying the role marker attribute in document order,
/// so the returned messages reflect conversation turn order. Pages without
/// any marked elements yield an empty message list rather than an error.
pub fn extract_conversation(html: &str) -> Extraction {
    let document = Html::parse_document(html);

    let message_sel = Selector::parse(ROLE_MARKER_SELECTOR).unwrap();
    let content_sel = Selector::parse(CONTENT_SELECTOR).unwrap();

    let title = resolve_title(&document);

    let mut stats = ExtractionStats::default();
    let mut messages: Vec<Message> = Vec::new();

    for element in document.select(&message_sel) {
        let marker = element
            .value()
            .attr("data-message-author-role")
            .unwrap_or("");
        let role = Role::from_marker(marker);

        stats.total_elements += 1;
        match role {
            Role::User => stats.user_elements += 1,
            Role::Assistant => stats.assistant_elements += 1,
            Role::Other => {}
        }

        // Prefer the rendered content sub-element; fall back to the turn
        // element's full text.
        let raw = match element.select(&content_sel).next() {
            Some(content) => collect_text(content),
            None => collect_text(element),
        };

        if let Some(content) = normalize_message(&raw) {
            messages.push(Message { role, content });
        }
    }

    Extraction {
        title,
        messages,
        stats,
    }
}

// ── Title resolution ─────────────────────────────────────────────────────────

/// Resolve the display title: <title> with the product prefix stripped,
/// then the first <h1>, then a fixed placeholder.
fn resolve_title(document: &Html) -> String {
    let title_sel = Selector::parse("title").unwrap();
    let h1_sel = Selector::parse("h1").unwrap();

    document
        .select(&title_sel)
        .next()
        .map(|el| {
            let text = collect_text(el);
            TITLE_PREFIX_RE.replace(text.trim(), "").trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .or_else(|| {
            document
                .select(&h1_sel)
                .next()
                .map(|el| normalize_text(collect_text(el)))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

// ── Message normalization ────────────────────────────────────────────────────

/// Trim, strip one leading turn label, and apply the keep filters.
/// Returns `None` for content that should not become a message.
fn normalize_message(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = LABEL_PREFIX_RE.replace(trimmed, "");
    let content = stripped.trim();

    if content.chars().count() <= MIN_CONTENT_LEN {
        return None;
    }
    if LABEL_ONLY_RE.is_match(content) {
        return None;
    }
    Some(content.to_string())
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

/// Recursively collect all text from an element and its descendants.
fn collect_text(el: ElementRef<'_>) -> String {
    use scraper::node::Node;
    let mut parts = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => parts.push((&*text.text).to_string()),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    parts.push(collect_text(child_el));
                }
            }
            _ => {}
        }
    }
    parts.join("")
}

/// Collapse runs of whitespace into single spaces and trim.
fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
