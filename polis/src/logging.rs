//! Logging bootstrap. The renderer itself is `tracing-subscriber`;
//! domain-specific log shipping stays external.

use polis_core::config::{LogFormat, LoggingConfig};
use std::io::IsTerminal;

/// Install the global subscriber from the run's `logging` section.
///
/// Level precedence: the `LOG_LEVEL` environment variable, then
/// `logging.level`, then `info`. Format `auto` renders for humans on
/// a TTY and as JSON lines otherwise. Safe to call more than once —
/// later calls are no-ops.
pub fn init(config: Option<&LoggingConfig>) {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .map(|value| value.to_ascii_lowercase())
        .or_else(|| config.map(|c| c.level.as_filter().to_owned()))
        .unwrap_or_else(|| "info".to_owned());
    let filter = tracing_subscriber::EnvFilter::new(level);

    let format = config.map_or(LogFormat::Auto, |c| c.format);
    let as_json = match format {
        LogFormat::Json => true,
        LogFormat::Console => false,
        LogFormat::Auto => !std::io::stderr().is_terminal(),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if as_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // A subscriber installed by the embedding binary wins.
    let _ = result;
}
