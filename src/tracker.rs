//! Normalized tracker entities and the client that produces them.

pub mod client;
pub mod payload;

pub use client::TrackerClient;

use std::fmt;

/// A tracker-generated event from the notification feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    /// Decoded content. May still contain HTML markup.
    pub content: String,
    pub metadata: NotificationMetadata,
}

impl Notification {
    /// The id used for links and headers: the issue id if known, otherwise
    /// the notification's own id.
    pub fn display_id(&self) -> &str {
        self.metadata.issue_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationMetadata {
    pub issue_id: Option<String>,
    pub issue_title: Option<String>,
    pub issue_status: Option<String>,
    pub description: Option<String>,
}

impl NotificationMetadata {
    /// Fills every field missing in `self` from `other`.
    pub(crate) fn or(self, other: NotificationMetadata) -> NotificationMetadata {
        NotificationMetadata {
            issue_id: self.issue_id.or(other.issue_id),
            issue_title: self.issue_title.or(other.issue_title),
            issue_status: self.issue_status.or(other.issue_status),
            description: self.description.or(other.description),
        }
    }
}

/// A tracked work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// The readable id (`DEMO-12`) when the tracker sent one, otherwise the
    /// internal id.
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub state: Option<String>,
}

/// Failures of tracker requests that callers may want to tell apart.
///
/// These are wrapped in an [`anyhow::Error`]; use `downcast_ref` to get
/// them back.
#[derive(Debug)]
pub enum TrackerError {
    /// A fetch returned a non-success status.
    Unavailable { status: reqwest::StatusCode },
    /// Creating an issue returned a non-success status.
    IssueCreationFailed { status: reqwest::StatusCode },
}

impl std::error::Error for TrackerError {}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackerError::Unavailable { status } => {
                write!(f, "tracker unavailable (HTTP {status})")
            }
            TrackerError::IssueCreationFailed { status } => {
                write!(f, "issue creation failed (HTTP {status})")
            }
        }
    }
}
