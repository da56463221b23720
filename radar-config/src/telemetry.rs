use anyhow::anyhow;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::loader::LoggingConfig;

/// Quiet defaults with per-check summaries. Override via `RUST_LOG` or
/// `logging.filter`.
pub const DEFAULT_FILTER: &str =
    "info,radar::scan=info,radar::check=info,radar::lock=warn,radar::memory=warn";

/// Filter used when `RUST_LOG` is unset or invalid.
pub fn fallback_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let directives = config
        .filter
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives)
        .map_err(|err| anyhow!("invalid logging.filter {directives:?}: {err}"))
}

/// Install the global fmt subscriber.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => fallback_filter(config)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
