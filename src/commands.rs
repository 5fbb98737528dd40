//! Handling of chat commands: the reverse path from chat into the tracker.
//!
//! Only messages from the configured chat are considered. Supported:
//!
//! * `/start` and `/help`: introductions.
//! * `/status`: what the bot has been doing.
//! * `/create <summary>`: creates an issue. Without a summary the bot asks
//!   for one and takes the next plain message as the summary.

use crate::poller::Stats;
use crate::render::{escape_html, issue_created_message};
use crate::telegram::api::Message;
use crate::telegram::{OutgoingMessage, TelegramClient, main_keyboard};
use crate::tracker::TrackerClient;
use std::time::Duration;

/// How long a single `getUpdates` call is held open.
const LONG_POLL_SECS: u64 = 30;
/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    Status,
    /// `/create`, with its (possibly empty) trimmed argument text.
    Create(&'a str),
    /// A message that is not a command.
    Text(&'a str),
}

/// Parses a chat message. Unknown commands yield `None`.
pub fn parse(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Some(Command::Text(text));
    };
    let (name, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    // Commands may be addressed to a bot, as in `/help@SomeBot`.
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "status" => Some(Command::Status),
        "create" => Some(Command::Create(args.trim())),
        _ => None,
    }
}

pub struct CommandHandler {
    tracker: TrackerClient,
    project_id: String,
    chat_id: i64,
    poll_interval: Duration,
    stats: Stats,
    awaiting_summary: bool,
}

impl CommandHandler {
    pub fn new(
        tracker: TrackerClient,
        project_id: String,
        chat_id: i64,
        poll_interval: Duration,
        stats: Stats,
    ) -> Self {
        CommandHandler {
            tracker,
            project_id,
            chat_id,
            poll_interval,
            stats,
            awaiting_summary: false,
        }
    }

    pub fn awaiting_summary(&self) -> bool {
        self.awaiting_summary
    }

    /// Handles one incoming message, returning the reply if there is one.
    pub async fn handle(&mut self, message: &Message) -> Option<OutgoingMessage> {
        if message.chat.id != self.chat_id {
            tracing::debug!("ignoring message from chat {}", message.chat.id);
            return None;
        }
        let command = parse(message.text.as_deref()?)?;
        tracing::debug!("handling {command:?}");
        match command {
            Command::Start => Some(
                OutgoingMessage::html(
                    self.chat_id,
                    "<b>YouTrack Telegram Bot</b>\n\n\
                     Automatic notifications from YouTrack and issue creation.\n\n\
                     Commands: /help",
                )
                .with_markup(main_keyboard()),
            ),
            Command::Help => Some(OutgoingMessage::html(self.chat_id, self.help_text())),
            Command::Status => Some(OutgoingMessage::html(self.chat_id, self.status_text())),
            Command::Create("") => {
                self.awaiting_summary = true;
                Some(OutgoingMessage::html(
                    self.chat_id,
                    "Please enter the issue summary:",
                ))
            }
            Command::Create(summary) => {
                self.awaiting_summary = false;
                Some(self.create_issue(summary).await)
            }
            Command::Text(text) => {
                if !self.awaiting_summary {
                    return None;
                }
                self.awaiting_summary = false;
                if text.is_empty() {
                    return None;
                }
                Some(self.create_issue(text).await)
            }
        }
    }

    async fn create_issue(&self, summary: &str) -> OutgoingMessage {
        match self
            .tracker
            .create_issue(&self.project_id, summary, None)
            .await
        {
            Ok(issue_id) => {
                OutgoingMessage::html(self.chat_id, issue_created_message(&issue_id, summary))
                    .with_open_link(self.tracker.issue_url(&issue_id))
            }
            Err(e) => {
                tracing::error!("failed to create issue {summary:?}: {e:?}");
                OutgoingMessage::plain(self.chat_id, format!("Failed to create issue: {e:#}"))
            }
        }
    }

    fn help_text(&self) -> String {
        format!(
            "<b>Commands:</b>\n\
             /create &lt;text&gt; - create an issue\n\
             /status - bot statistics\n\n\
             <b>Example:</b>\n\
             /create Fix login button bug\n\n\
             YouTrack: <code>{}</code>\n\
             Poll interval: {}s",
            escape_html(self.tracker.base_url()),
            self.poll_interval.as_secs()
        )
    }

    fn status_text(&self) -> String {
        format!(
            "<b>Status</b>\n\n\
             YouTrack: <code>{}</code>\n\
             Notifications sent: {}\n\
             Poll interval: {}s",
            escape_html(self.tracker.base_url()),
            self.stats.sent(),
            self.poll_interval.as_secs()
        )
    }
}

/// Receives chat messages forever and answers them.
pub async fn run(mut handler: CommandHandler, telegram: TelegramClient) {
    let mut offset = None;
    loop {
        let updates = match telegram.get_updates(offset, LONG_POLL_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("failed to fetch chat updates: {e:?}");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };
        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if let Some(reply) = handler.handle(&message).await {
                if let Err(e) = telegram.send_message(&reply).await {
                    tracing::warn!("failed to answer message {}: {e:?}", message.message_id);
                }
            }
        }
    }
}
