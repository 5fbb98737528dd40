use crate::telegram::api::{ApiResponse, Message, ParseMode, ReplyMarkup, Update};
use crate::telegram::{ChatSink, OutgoingMessage};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

// Long polls are held open by Telegram for the requested time; the request
// itself gets a little longer than that.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    token: SecretString,
    timeout: Option<Duration>,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: SecretString, timeout: Option<Duration>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    pub async fn send_message(&self, message: &OutgoingMessage) -> anyhow::Result<Message> {
        #[derive(serde::Serialize)]
        struct SendMessage<'a> {
            chat_id: i64,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_mode: Option<ParseMode>,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<&'a ReplyMarkup>,
        }

        let mut req = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: message.chat_id,
                text: &message.text,
                parse_mode: message.parse_mode,
                reply_markup: message.reply_markup.as_ref(),
            });
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("fail sending Telegram message")?;

        deserialize_response::<Message>(response).await
    }

    /// Long-polls for updates with an id of at least `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> anyhow::Result<Vec<Update>> {
        #[derive(serde::Serialize)]
        struct GetUpdates {
            #[serde(skip_serializing_if = "Option::is_none")]
            offset: Option<i64>,
            timeout: u64,
            allowed_updates: [&'static str; 1],
        }

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs) + LONG_POLL_GRACE)
            .json(&GetUpdates {
                offset,
                timeout: timeout_secs,
                allowed_updates: ["message"],
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("fail polling Telegram updates")?;

        deserialize_response::<Vec<Update>>(response).await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token.expose_secret())
    }
}

#[async_trait]
impl ChatSink for TelegramClient {
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        self.send_message(message).await.map(|_| ())
    }
}

async fn deserialize_response<T>(response: Response) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Telegram API request failed")?;
        anyhow::bail!("Telegram API returned {status}: {body}");
    }
    let envelope = response
        .json::<ApiResponse<T>>()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| {
            anyhow::anyhow!(
                "Failed to deserialize value of type {}",
                std::any::type_name::<T>()
            )
        })?;
    if !envelope.ok {
        anyhow::bail!(
            "Telegram API refused the request: {}",
            envelope.description.unwrap_or_default()
        );
    }
    envelope
        .result
        .context("Telegram API response has no result")
}
