use clap::Parser;
use relaybot::commands::{self, CommandHandler};
use relaybot::config::Config;
use relaybot::logger;
use relaybot::poller::{Poller, PollerState, Stats};
use relaybot::telegram::{ChatSink, DryRunSink, TelegramClient};
use relaybot::tracker::TrackerClient;
use std::path::PathBuf;
use tracing::Instrument;

/// Relays YouTrack notifications and issue updates into a Telegram chat.
#[derive(Parser, Debug)]
struct Opt {
    /// TOML configuration file. Without it, configuration is read from the
    /// environment.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log rendered messages instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let opt = Opt::parse();
    let config = Config::load(opt.config.as_deref())?;
    tracing::info!("relaying {} to chat {}", config.tracker_url, config.chat_id);

    let tracker = TrackerClient::new(
        config.tracker_url.as_str(),
        config.tracker_token.clone(),
        config.request_timeout,
    )?;
    let telegram = TelegramClient::new(
        &config.telegram_api_url,
        config.telegram_token.clone(),
        config.request_timeout,
    );
    let stats = Stats::default();

    if opt.dry_run {
        run_poller(tracker, DryRunSink, &config, stats, opt.once).await
    } else {
        if !opt.once {
            let handler = CommandHandler::new(
                tracker.clone(),
                config.project_id.clone(),
                config.chat_id,
                config.poll_interval,
                stats.clone(),
            );
            tokio::spawn(commands::run(handler, telegram.clone()));
        }
        run_poller(tracker, telegram, &config, stats, opt.once).await
    }
}

async fn run_poller<S: ChatSink>(
    tracker: TrackerClient,
    sink: S,
    config: &Config,
    stats: Stats,
    once: bool,
) -> anyhow::Result<()> {
    let mut poller = Poller::new(tracker, sink, config.chat_id, config.poll_interval, stats);
    if once {
        // A one-off run looks back one poll interval, as if it were invoked
        // on that schedule.
        let lookback = i64::try_from(config.poll_interval.as_millis()).unwrap_or(i64::MAX);
        let since = chrono::Utc::now().timestamp_millis().saturating_sub(lookback);
        poller = poller.with_state(PollerState::new(since));
        let report = poller.poll_once().instrument(logger::cycle_span()).await?;
        tracing::info!("{report:?}");
    } else {
        poller.run().await;
    }
    Ok(())
}
