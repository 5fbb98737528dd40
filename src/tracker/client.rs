use super::payload::{created_issue_id, parse_issues, parse_notifications};
use super::{Issue, Notification, TrackerError};
use anyhow::Context;
use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing as log;

const NOTIFICATION_FIELDS: &str = "id,content,metadata";
const ISSUE_FIELDS: &str = "id,idReadable,summary,description,updated,customFields(name,value(name))";
const CREATED_FIELDS: &str = "id,idReadable";
const RECENT_ISSUES_PAGE: u32 = 50;

#[derive(Clone)]
pub struct TrackerClient {
    token: SecretString,
    client: Client,
    base_url: String,
}

impl TrackerClient {
    /// Creates a client for the tracker at `base_url`.
    ///
    /// Without a `timeout` the transport default applies, which means a hung
    /// request stalls its caller indefinitely.
    pub fn new(
        base_url: &str,
        token: SecretString,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(TrackerClient {
            client: builder.build().context("building tracker http client")?,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser link to an issue.
    pub fn issue_url(&self, issue_id: &str) -> String {
        format!("{}/issue/{}", self.base_url, issue_id)
    }

    /// Fetches the current user's notification feed.
    pub async fn fetch_notifications(&self) -> anyhow::Result<Vec<Notification>> {
        let url = format!("{}/api/users/me/notifications", self.base_url);
        let req = self.get(&url).query(&[("fields", NOTIFICATION_FIELDS)]);
        let body = self.fetch(req).await.context("fetching notifications")?;
        Ok(parse_notifications(parse_body(&body)))
    }

    /// Fetches issues updated strictly after `since_exclusive` (milliseconds
    /// since the epoch).
    pub async fn fetch_recent_issues(&self, since_exclusive: i64) -> anyhow::Result<Vec<Issue>> {
        let url = format!("{}/api/issues", self.base_url);
        let top = RECENT_ISSUES_PAGE.to_string();
        let req = self.get(&url).query(&[
            ("fields", ISSUE_FIELDS),
            ("query", "sort by: updated desc"),
            ("$top", top.as_str()),
        ]);
        let body = self.fetch(req).await.context("fetching recent issues")?;
        Ok(parse_issues(parse_body(&body), since_exclusive))
    }

    /// Creates an issue and returns its readable id.
    pub async fn create_issue(
        &self,
        project_id: &str,
        summary: &str,
        description: Option<&str>,
    ) -> anyhow::Result<String> {
        #[derive(serde::Serialize)]
        struct Project<'a> {
            id: &'a str,
        }

        #[derive(serde::Serialize)]
        struct NewIssue<'a> {
            project: Project<'a>,
            summary: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
        }

        let url = format!("{}/api/issues", self.base_url);
        let req = self
            .post(&url)
            .query(&[("fields", CREATED_FIELDS)])
            .json(&NewIssue {
                project: Project { id: project_id },
                summary,
                description,
            });
        let (status, body) = self.send_req(req).await.context("creating issue")?;
        if !status.is_success() {
            log::warn!(
                "issue creation failed with {status}: {}",
                String::from_utf8_lossy(&body)
            );
            return Err(TrackerError::IssueCreationFailed { status }.into());
        }
        let id = created_issue_id(&body);
        log::info!("created issue {id} in project {project_id}");
        Ok(id)
    }

    async fn fetch(&self, req: RequestBuilder) -> anyhow::Result<Bytes> {
        let (status, body) = self.send_req(req).await?;
        if !status.is_success() {
            return Err(anyhow::Error::new(TrackerError::Unavailable { status }))
                .with_context(|| format!("response: {}", String::from_utf8_lossy(&body)));
        }
        Ok(body)
    }

    async fn send_req(&self, req: RequestBuilder) -> anyhow::Result<(StatusCode, Bytes)> {
        log::debug!("send_req with {:?}", req);
        let req_dbg = format!("{req:?}");
        let resp = req
            .send()
            .await
            .with_context(|| format!("sending {req_dbg}"))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read response body {req_dbg}"))?;
        Ok((status, body))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        log::trace!("get {:?}", url);
        self.client.get(url).configure(self)
    }

    fn post(&self, url: &str) -> RequestBuilder {
        log::trace!("post {:?}", url);
        self.client.post(url).configure(self)
    }
}

/// An undecodable body is treated like any other unexpected shape.
fn parse_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        log::warn!("tracker response is not JSON: {e}");
        serde_json::Value::Null
    })
}

trait RequestSend: Sized {
    fn configure(self, t: &TrackerClient) -> Self;
}

impl RequestSend for RequestBuilder {
    fn configure(self, t: &TrackerClient) -> RequestBuilder {
        self.bearer_auth(t.token.expose_secret())
            .header(ACCEPT, "application/json")
    }
}
