//! Subscriber setup for the server process.

use anyhow::Result;
use tracing::subscriber::set_global_default;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use snapex::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level;
/// records from the `log` facade are bridged in.
pub fn init(config: &LoggingConfig) -> Result<()> {
    LogTracer::init()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => set_global_default(
            Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true)),
        )?,
        LogFormat::Text => set_global_default(
            Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(true)),
        )?,
    }

    tracing::info!("Logging initialized at level '{}'", config.level);
    Ok(())
}
