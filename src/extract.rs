//! Heuristic metadata extraction from free-form notification text.
//!
//! This is a best-effort fallback for notifications that arrive without
//! structured metadata. It will happily pick up anything shaped like an
//! issue key, including one mentioned in unrelated prose.

use crate::tracker::NotificationMetadata;
use regex::Regex;
use std::sync::LazyLock;

static ISSUE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]+-[0-9]+\b").unwrap());

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bState:[ \t]*([^\s<]+)").unwrap());

/// Returns the first issue key (like `DEMO-12`) found in `text`.
pub fn issue_id(text: &str) -> Option<&str> {
    ISSUE_ID_RE.find(text).map(|m| m.as_str())
}

/// Derives whatever metadata can be found in `content`.
///
/// Each field is looked up independently. The description is never
/// extracted; callers fall back to the content itself.
pub fn extract(content: &str) -> NotificationMetadata {
    let id_match = ISSUE_ID_RE.find(content);

    let issue_title = id_match.and_then(|m| {
        let rest = &content[m.end()..];
        let end = rest.find(['\n', '<']).unwrap_or(rest.len());
        let title = rest[..end]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '-')
            .trim_end();
        (!title.is_empty()).then(|| title.to_string())
    });

    let issue_status = STATE_RE
        .captures(content)
        .map(|caps| caps[1].to_string());

    NotificationMetadata {
        issue_id: id_match.map(|m| m.as_str().to_string()),
        issue_title,
        issue_status,
        description: None,
    }
}
