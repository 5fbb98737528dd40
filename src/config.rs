//! Process configuration, loaded once at start-up.
//!
//! The configuration comes either from a TOML file or from environment
//! variables (a `.env` file is honoured by `main`). A file looks like:
//!
//! ```toml
//! [tracker]
//! url = "https://youtrack.example.com"
//! token = "perm:..."
//! project-id = "0-1"
//! request-timeout-secs = 30   # optional
//!
//! [telegram]
//! token = "123456:ABC..."
//! chat-id = -1001234567890
//! api-url = "https://api.telegram.org"   # optional
//!
//! [polling]
//! interval-secs = 60   # optional
//! ```

use crate::telegram::client::DEFAULT_API_URL;
use anyhow::{Context as _, bail};
use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const CONFIG_ENV: &str = "RELAYBOT_CONFIG";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug)]
pub struct Config {
    pub tracker_url: Url,
    pub tracker_token: SecretString,
    pub project_id: String,
    pub telegram_token: SecretString,
    pub telegram_api_url: String,
    pub chat_id: i64,
    pub poll_interval: Duration,
    /// Timeout for outbound requests. `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    tracker: TrackerSection,
    telegram: TelegramSection,
    #[serde(default)]
    polling: PollingSection,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TrackerSection {
    url: String,
    token: String,
    project_id: String,
    request_timeout_secs: Option<u64>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TelegramSection {
    token: String,
    chat_id: i64,
    api_url: Option<String>,
}

#[derive(Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PollingSection {
    interval_secs: Option<u64>,
}

impl Config {
    /// Loads from `path`, or from the file named by `RELAYBOT_CONFIG`, or
    /// from the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(Into::into));
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Config::from_toml(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            None => Config::from_env(),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Config> {
        let file: ConfigFile = toml::from_str(text)?;
        Config::build(
            &file.tracker.url,
            file.tracker.token,
            file.tracker.project_id,
            file.telegram.token,
            file.telegram.api_url,
            file.telegram.chat_id,
            file.polling.interval_secs,
            file.tracker.request_timeout_secs,
        )
    }

    pub fn from_env() -> anyhow::Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let required = |key: &str| var(key).with_context(|| format!("{key} is not set"));
        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            var(key)
                .map(|v| v.parse().with_context(|| format!("{key} must be a number")))
                .transpose()
        };
        let chat_id = required("TELEGRAM_CHAT_ID")?
            .parse()
            .context("TELEGRAM_CHAT_ID must be an integer")?;

        Config::build(
            &required("TRACKER_URL")?,
            required("TRACKER_TOKEN")?,
            required("TRACKER_PROJECT_ID")?,
            required("TELEGRAM_TOKEN")?,
            var("TELEGRAM_API_URL"),
            chat_id,
            number("POLL_INTERVAL_SECS")?,
            number("REQUEST_TIMEOUT_SECS")?,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        tracker_url: &str,
        tracker_token: String,
        project_id: String,
        telegram_token: String,
        telegram_api_url: Option<String>,
        chat_id: i64,
        poll_interval_secs: Option<u64>,
        request_timeout_secs: Option<u64>,
    ) -> anyhow::Result<Config> {
        let tracker_url = Url::parse(tracker_url)
            .with_context(|| format!("tracker url `{tracker_url}` is not a valid URL"))?;
        if tracker_url.cannot_be_a_base() {
            bail!("tracker url `{tracker_url}` cannot be used as a base URL");
        }
        let poll_interval_secs = poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            bail!("poll interval must be at least one second");
        }
        Ok(Config {
            tracker_url,
            tracker_token: tracker_token.into(),
            project_id,
            telegram_token: telegram_token.into(),
            telegram_api_url: telegram_api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            chat_id,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: request_timeout_secs.map(Duration::from_secs),
        })
    }
}
