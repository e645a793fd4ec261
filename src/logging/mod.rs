// Logging module for structured logging using the tracing crate

use std::error::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber for structured logging
///
/// The level comes from `config.level` unless `RUST_LOG` is set, in which
/// case `RUST_LOG` wins. With `config.json` set, events are written as JSON
/// lines for log aggregation.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global subscriber
/// is already installed.
///
/// # Examples
///
/// ```no_run
/// use mapcache::config::LoggingConfig;
/// use mapcache::logging::init_subscriber;
///
/// init_subscriber(&LoggingConfig::default()).expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = build_filter(config)?;
    let registry = Registry::default().with(filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, Box<dyn Error + Send + Sync>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}
