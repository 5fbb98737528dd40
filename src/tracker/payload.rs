//! Parsing of tracker API responses into normalized entities.
//!
//! The tracker is inconsistent about the shape of notification fields:
//! `content` and `metadata` may be plain strings, base64+gzip strings, JSON
//! objects, or missing altogether. All of that is resolved here, once, so
//! nothing downstream ever sees a raw payload.

use super::{Issue, Notification, NotificationMetadata};
use crate::decode::decode;
use crate::extract;
use anyhow::{Context as _, bail};
use serde_json::{Map, Value};

/// Returned by [`created_issue_id`] when the response names no id at all.
pub const CREATED_SENTINEL: &str = "created";

/// The shape a loosely typed field arrived in.
#[derive(Debug)]
enum Field {
    Absent,
    Text(String),
    Object(Map<String, Value>),
    Other(Value),
}

impl Field {
    fn take(obj: &mut Map<String, Value>, key: &str) -> Field {
        match obj.remove(key) {
            None | Some(Value::Null) => Field::Absent,
            Some(Value::String(s)) => Field::Text(s),
            Some(Value::Object(m)) => Field::Object(m),
            Some(other) => Field::Other(other),
        }
    }
}

/// Parses the notification feed.
///
/// Anything other than a JSON array is treated as "no new data". Elements
/// that cannot be parsed are skipped individually.
pub fn parse_notifications(body: Value) -> Vec<Notification> {
    let Value::Array(items) = body else {
        tracing::warn!("notification feed is not a JSON array, ignoring it");
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match parse_notification(item) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("skipping notification #{idx}: {e:?}");
                None
            }
        })
        .collect()
}

fn parse_notification(item: Value) -> anyhow::Result<Notification> {
    let Value::Object(mut obj) = item else {
        bail!("element is not an object");
    };
    let id = match obj.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => bail!("missing `id`"),
    };

    let content = match Field::take(&mut obj, "content") {
        Field::Absent => String::new(),
        Field::Text(raw) => decode(&raw),
        Field::Object(m) => Value::Object(m).to_string(),
        Field::Other(v) => v.to_string(),
    };

    let structured = match Field::take(&mut obj, "metadata") {
        Field::Object(m) => Some(metadata_from_object(&m)),
        Field::Text(raw) => match metadata_from_text(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::debug!("notification {id}: unusable metadata string: {e:?}");
                None
            }
        },
        Field::Absent | Field::Other(_) => None,
    };

    let metadata = resolve_metadata(structured, &content);
    Ok(Notification {
        id,
        content,
        metadata,
    })
}

/// Combines structured metadata with what can be extracted from the content.
///
/// Structured fields win, except for the issue id: a key found in the
/// content takes precedence over the structured one.
fn resolve_metadata(structured: Option<NotificationMetadata>, content: &str) -> NotificationMetadata {
    let extracted = extract::extract(content);
    let Some(structured) = structured else {
        return extracted;
    };
    let content_id = extracted.issue_id.clone();
    let mut metadata = structured.or(extracted);
    if content_id.is_some() {
        metadata.issue_id = content_id;
    }
    metadata
}

fn metadata_from_object(obj: &Map<String, Value>) -> NotificationMetadata {
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    NotificationMetadata {
        issue_id: text("issueId"),
        issue_title: text("issueTitle"),
        issue_status: text("issueStatus"),
        description: text("description").map(|d| decode(&d)),
    }
}

fn metadata_from_text(raw: &str) -> anyhow::Result<NotificationMetadata> {
    let decoded = decode(raw);
    let value: Value = serde_json::from_str(&decoded).context("metadata is not JSON")?;
    match value {
        Value::Object(m) => Ok(metadata_from_object(&m)),
        _ => bail!("metadata is not a JSON object"),
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    id: Option<String>,
    id_readable: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    /// Milliseconds since the epoch.
    updated: Option<i64>,
    #[serde(default)]
    custom_fields: Vec<RawCustomField>,
}

#[derive(Debug, serde::Deserialize)]
struct RawCustomField {
    name: Option<String>,
    value: Option<Value>,
}

/// Parses the issue list, keeping only issues updated strictly after
/// `since_exclusive` (milliseconds since the epoch).
pub fn parse_issues(body: Value, since_exclusive: i64) -> Vec<Issue> {
    let Value::Array(items) = body else {
        tracing::warn!("issue list is not a JSON array, ignoring it");
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let raw = match serde_json::from_value::<RawIssue>(item) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("skipping issue #{idx}: {e}");
                    return None;
                }
            };
            if !raw.updated.is_some_and(|updated| updated > since_exclusive) {
                return None;
            }
            let Some(id) = raw.id_readable.or(raw.id) else {
                tracing::warn!("skipping issue #{idx}: no id");
                return None;
            };
            let state = raw
                .custom_fields
                .iter()
                .find(|field| field.name.as_deref() == Some("State"))
                .and_then(|field| field.value.as_ref())
                .and_then(|value| value.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Issue {
                id,
                summary: raw.summary.unwrap_or_default(),
                description: raw.description,
                state,
            })
        })
        .collect()
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedIssue {
    id: Option<String>,
    id_readable: Option<String>,
}

/// Picks the id out of an issue-creation response.
pub fn created_issue_id(body: &[u8]) -> String {
    let created: CreatedIssue = serde_json::from_slice(body).unwrap_or_default();
    created
        .id_readable
        .or(created.id)
        .unwrap_or_else(|| CREATED_SENTINEL.to_string())
}
