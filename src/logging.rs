//! Tracing subscriber setup
use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Driver and runtime crates that log every connection and poll at debug level
const NOISY_CRATES: &str = "sqlx::pool=warn,tokio_util=warn,mio=warn,rustls=warn";

/// Build the filter: `RUST_LOG` if set, otherwise the configured level, then the
/// noisy-crate and dependency filters on top.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let filter_string = format!("{},{}", env_filter, NOISY_CRATES);
    env_filter = EnvFilter::try_new(&filter_string).unwrap_or(env_filter);

    if let Some(dep_filter) = &config.dependency_filter {
        let filter_string = format!("{},{}", env_filter, dep_filter);
        env_filter = EnvFilter::try_new(&filter_string).unwrap_or(env_filter);
    }

    env_filter
}

/// Install the global subscriber.
///
/// Returns false when a subscriber was already installed, which leaves the existing one in place.
pub fn init(config: &LoggingConfig) -> bool {
    let env_filter = build_filter(config);

    let result = if config.format == "json" {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer().json()).try_init()
    } else {
        let format = fmt::format().with_thread_ids(true).with_target(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().event_format(format))
            .try_init()
    };

    result.is_ok()
}
