//! Rendering of tracker entities into chat markup.
//!
//! The output is the HTML subset understood by the Telegram Bot API
//! (`parse_mode = HTML`). All text coming from the tracker is escaped
//! before any markup is produced, and every tag emitted here is closed, so
//! the result is well-formed no matter what the input contains.

use crate::tracker::{Issue, Notification};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// Maximum length of a notification body, in characters.
pub const NOTIFICATION_BODY_CAP: usize = 300;
/// Maximum length of an issue description in the compact issue card.
pub const ISSUE_DESCRIPTION_CAP: usize = 200;

const ELLIPSIS: &str = "…";

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

// The emphasis patterns run over already escaped text, so the only angle
// brackets they can meet are tags produced by an earlier pattern. Their
// bodies may contain complete tags but never a lone opening or closing one,
// which keeps the output properly nested.
static STRIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~~((?:[^<>\n]|<[bis]>[^<>\n]*</[bis]>)+?)~~").unwrap()
});
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*((?:[^<>\n]|<[bis]>[^<>\n]*</[bis]>)+?)\*\*").unwrap()
});
static STAR_BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*((?:[^<>\n*]|<[bis]>[^<>\n]*</[bis]>)+?)\*").unwrap()
});
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_((?:[^<>\n_]|<[bis]>[^<>\n]*</[bis]>)+?)_").unwrap()
});

static BREAK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?p(?:\s[^>]*)?>|</div\s*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^.*(?:\b(?:changed|created|updated|commented|reported) by\b|you received this (?:notification|message)|notification settings|unsubscribe|sent by youtrack|powered by youtrack).*$",
    )
    .unwrap()
});
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:-{3,}|_{3,}|={3,}|\*{3,})[ \t]*$").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static TRAILING_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Escapes text for inclusion in chat markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a `String` cannot fail.
    pulldown_cmark_escape::escape_html(&mut out, text).unwrap_or(());
    out
}

/// Reverses the entity escaping done by the tracker's HTML and by
/// [`escape_html`].
pub fn unescape_html(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Converts lightweight markdown into chat markup.
///
/// Supports `**bold**`, `*bold*`, `_italic_`, `~~strike~~` and `` `code` ``.
/// Code spans are rendered verbatim; emphasis does not reach into them.
pub fn render_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in CODE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&emphasize(&escape_html(&text[last..whole.start()])));
        out.push_str("<code>");
        out.push_str(&escape_html(&caps[1]));
        out.push_str("</code>");
        last = whole.end();
    }
    out.push_str(&emphasize(&escape_html(&text[last..])));
    out
}

fn emphasize(escaped: &str) -> String {
    let text = STRIKE_RE.replace_all(escaped, "<s>$1</s>");
    let text = BOLD_RE.replace_all(&text, "<b>$1</b>");
    let text = STAR_BOLD_RE.replace_all(&text, "<b>$1</b>");
    let text = ITALIC_RE.replace_all(&text, "<i>$1</i>");
    text.into_owned()
}

/// Reduces a tracker notification body to readable plain text.
///
/// Line-breaking tags become newlines, other tags are dropped, tracker
/// boilerplate and bare links are removed and runs of blank lines are
/// collapsed.
pub fn strip_noise(body: &str) -> String {
    let text = BREAK_TAG_RE.replace_all(body, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = unescape_html(&text);
    let text = BOILERPLATE_RE.replace_all(&text, "");
    let text = SEPARATOR_RE.replace_all(&text, "");
    let text = URL_RE.replace_all(&text, "");
    let text = TRAILING_SPACE_RE.replace_all(&text, "");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Cuts `text` down to at most `cap` characters, the last of which is an
/// ellipsis if anything was cut.
///
/// Characters are counted as grapheme clusters so that combined emoji and
/// accented letters are never split.
pub fn truncate(text: &str, cap: usize) -> Cow<'_, str> {
    if text.graphemes(true).count() <= cap {
        return Cow::Borrowed(text);
    }
    let kept: String = text.graphemes(true).take(cap.saturating_sub(1)).collect();
    Cow::Owned(format!("{}{ELLIPSIS}", kept.trim_end()))
}

/// The card for a notification: issue id, status, title and a short body.
pub fn render_notification(n: &Notification) -> String {
    let title = n.metadata.issue_title.as_deref().unwrap_or("No title");
    let status = n.metadata.issue_status.as_deref().unwrap_or("Unknown");
    let body = strip_noise(n.metadata.description.as_deref().unwrap_or(&n.content));

    let mut msg = format!(
        "<b>{}</b>\nStatus: {}\nTitle: {}",
        escape_html(n.display_id()),
        escape_html(status),
        escape_html(title),
    );
    if !body.is_empty() {
        msg.push_str("\n\n");
        msg.push_str(&render_markdown(&truncate(&body, NOTIFICATION_BODY_CAP)));
    }
    msg
}

/// The compact card for an updated issue.
pub fn render_issue(issue: &Issue) -> String {
    let status = issue.state.as_deref().unwrap_or("No Status");

    let mut msg = format!(
        "<b>{}</b>\nStatus: {}\nSummary: {}",
        escape_html(&issue.id),
        escape_html(status),
        escape_html(&issue.summary),
    );
    if let Some(description) = issue.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            msg.push_str("\n\n");
            msg.push_str(&render_markdown(&truncate(description, ISSUE_DESCRIPTION_CAP)));
        }
    }
    msg
}

/// A full chat message announcing a notification.
pub fn notification_message(n: &Notification) -> String {
    format!("<b>Notification</b>\n\n{}", render_notification(n))
}

/// A full chat message announcing an issue update.
pub fn issue_message(issue: &Issue) -> String {
    format!("<b>Issue Update</b>\n\n{}", render_issue(issue))
}

/// The reply sent after an issue was created from chat.
pub fn issue_created_message(issue_id: &str, summary: &str) -> String {
    format!(
        "<b>Issue created</b>\n\nID: <code>{}</code>\nSummary: {}",
        escape_html(issue_id),
        escape_html(summary)
    )
}
