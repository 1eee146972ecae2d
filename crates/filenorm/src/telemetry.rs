//! Logging initialization.
//!
//! Messages are written through the `log` facade and spans through
//! `tracing`; both end up in one `tracing_subscriber` registry.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber and the `log` bridge.
///
/// Safe to call multiple times; returns false when a subscriber was
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);

    let installed = if config.json {
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .json()
                .with_timer(fmt::time::SystemTime)
                .with_current_span(true),
        );
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_names(true));
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    // Route `log` records into the subscriber above.
    let _ = tracing_log::LogTracer::init();

    installed
}
