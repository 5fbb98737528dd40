//! The chat side of the bot: outgoing messages and the Telegram client.

pub mod api;
pub mod client;

pub use client::TelegramClient;

use api::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, ParseMode, ReplyKeyboardMarkup,
    ReplyMarkup,
};
use async_trait::async_trait;

const OPEN_BUTTON_TEXT: &str = "Open in YouTrack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub reply_markup: Option<ReplyMarkup>,
}

impl OutgoingMessage {
    /// A message rendered as chat HTML.
    pub fn html(chat_id: i64, text: impl Into<String>) -> Self {
        OutgoingMessage {
            chat_id,
            text: text.into(),
            parse_mode: Some(ParseMode::Html),
            reply_markup: None,
        }
    }

    /// A message sent verbatim, without markup.
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        OutgoingMessage {
            chat_id,
            text: text.into(),
            parse_mode: None,
            reply_markup: None,
        }
    }

    pub fn with_markup(mut self, markup: ReplyMarkup) -> Self {
        self.reply_markup = Some(markup);
        self
    }

    /// Attaches a button linking to `url` in the tracker.
    pub fn with_open_link(self, url: impl Into<String>) -> Self {
        self.with_markup(ReplyMarkup::Inline(InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: OPEN_BUTTON_TEXT.to_string(),
                url: url.into(),
            }]],
        }))
    }
}

/// The persistent keyboard offered on `/start`.
pub fn main_keyboard() -> ReplyMarkup {
    let button = |text: &str| KeyboardButton {
        text: text.to_string(),
    };
    ReplyMarkup::Keyboard(ReplyKeyboardMarkup {
        keyboard: vec![
            vec![button("/status"), button("/help")],
            vec![button("/create")],
        ],
        resize_keyboard: true,
        one_time_keyboard: false,
    })
}

/// Where rendered messages are delivered.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()>;
}

/// Logs messages instead of sending them.
pub struct DryRunSink;

#[async_trait]
impl ChatSink for DryRunSink {
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        tracing::info!("dry run, not sending to {}:\n{}", message.chat_id, message.text);
        Ok(())
    }
}

#[test]
fn open_link_markup_serializes_as_inline_keyboard() {
    let msg = OutgoingMessage::html(42, "hi").with_open_link("https://yt.example/issue/DEMO-1");
    assert_eq!(
        serde_json::to_value(msg.reply_markup.unwrap()).unwrap(),
        serde_json::json!({
            "inline_keyboard": [[
                {"text": "Open in YouTrack", "url": "https://yt.example/issue/DEMO-1"}
            ]]
        })
    );
}

#[test]
fn main_keyboard_layout() {
    assert_eq!(
        serde_json::to_value(main_keyboard()).unwrap(),
        serde_json::json!({
            "keyboard": [[{"text": "/status"}, {"text": "/help"}], [{"text": "/create"}]],
            "resize_keyboard": true,
            "one_time_keyboard": false
        })
    );
}
