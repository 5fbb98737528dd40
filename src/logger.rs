use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Installs the global subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(std::env::var_os("DISABLE_COLOR").is_none())
        .init();
    tracing::debug!("initialized logging infra");
}

/// A span tagging everything logged during one poll cycle with a fresh id.
pub fn cycle_span() -> Span {
    let cycle_id = Uuid::new_v4();
    tracing::info_span!("poll_cycle", %cycle_id)
}
