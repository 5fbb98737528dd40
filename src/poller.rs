//! The poll loop: fetch, filter, render, deliver, sleep, repeat.

use crate::cache::DedupCache;
use crate::logger;
use crate::render;
use crate::telegram::{ChatSink, OutgoingMessage};
use crate::tracker::TrackerClient;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::Instrument;

/// Counters shared between the poll loop and command handling.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    sent: Arc<AtomicUsize>,
}

impl Stats {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of messages delivered since start-up.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

/// State owned by the poll loop alone.
#[derive(Debug)]
pub struct PollerState {
    pub seen: DedupCache,
    /// Issues updated at or before this time (milliseconds since the epoch)
    /// have already been reported.
    pub last_issue_check: i64,
}

impl PollerState {
    pub fn new(last_issue_check: i64) -> Self {
        PollerState {
            seen: DedupCache::default(),
            last_issue_check,
        }
    }
}

/// What a single cycle delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub notifications: usize,
    pub issues: usize,
    pub failed_deliveries: usize,
}

pub struct Poller<S> {
    tracker: TrackerClient,
    sink: S,
    chat_id: i64,
    interval: Duration,
    state: PollerState,
    stats: Stats,
}

impl<S: ChatSink> Poller<S> {
    /// Creates a poller that reports issues updated from now on.
    pub fn new(
        tracker: TrackerClient,
        sink: S,
        chat_id: i64,
        interval: Duration,
        stats: Stats,
    ) -> Self {
        Poller {
            tracker,
            sink,
            chat_id,
            interval,
            state: PollerState::new(Utc::now().timestamp_millis()),
            stats,
        }
    }

    pub fn with_state(mut self, state: PollerState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs one cycle.
    ///
    /// A failing fetch aborts the cycle without advancing the issue cursor.
    /// Failing deliveries are logged and counted but do not abort anything.
    /// The dedup cache is bounded after every cycle, failed or not.
    pub async fn poll_once(&mut self) -> anyhow::Result<CycleReport> {
        let result = self.fetch_and_deliver().await;
        self.state.seen.evict_if_full();
        result
    }

    async fn fetch_and_deliver(&mut self) -> anyhow::Result<CycleReport> {
        let cycle_start = Utc::now().timestamp_millis();
        let mut report = CycleReport::default();

        let notifications = self.tracker.fetch_notifications().await?;
        tracing::debug!("fetched {} notifications", notifications.len());
        for notification in &notifications {
            if !self.state.seen.add(&notification.id) {
                continue;
            }
            let message =
                OutgoingMessage::html(self.chat_id, render::notification_message(notification))
                    .with_open_link(self.tracker.issue_url(notification.display_id()));
            if self.deliver(&message).await {
                report.notifications += 1;
            } else {
                report.failed_deliveries += 1;
            }
        }

        let issues = self
            .tracker
            .fetch_recent_issues(self.state.last_issue_check)
            .await?;
        tracing::debug!(
            "fetched {} issues updated after {}",
            issues.len(),
            self.state.last_issue_check
        );
        for issue in &issues {
            let message = OutgoingMessage::html(self.chat_id, render::issue_message(issue))
                .with_open_link(self.tracker.issue_url(&issue.id));
            if self.deliver(&message).await {
                report.issues += 1;
            } else {
                report.failed_deliveries += 1;
            }
        }

        self.state.last_issue_check = cycle_start;
        Ok(report)
    }

    async fn deliver(&self, message: &OutgoingMessage) -> bool {
        match self.sink.send(message).await {
            Ok(()) => {
                self.stats.record_sent();
                true
            }
            Err(e) => {
                tracing::warn!("failed to deliver message: {e:?}");
                false
            }
        }
    }

    /// Polls forever. A failed cycle is logged and retried after the usual
    /// interval.
    pub async fn run(mut self) {
        tracing::info!("polling every {}s", self.interval.as_secs());
        loop {
            let span = logger::cycle_span();
            match self.poll_once().instrument(span.clone()).await {
                Ok(report) => span.in_scope(|| {
                    tracing::info!(
                        "cycle done: {} notifications, {} issues, {} failed deliveries",
                        report.notifications,
                        report.issues,
                        report.failed_deliveries
                    )
                }),
                Err(e) => span.in_scope(|| tracing::error!("poll cycle failed: {e:?}")),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
