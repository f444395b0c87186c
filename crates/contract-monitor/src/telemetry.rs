//! Tracing subscriber setup for binaries and test harnesses embedding the engine.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{MonitorError, MonitorResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Returns an error
/// instead of panicking when a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> MonitorResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let result = match (config.json, config.timestamps) {
        (true, _) => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            subscriber.with(fmt_layer).try_init()
        }
        (false, true) => {
            let fmt_layer = fmt::layer().with_target(true);
            subscriber.with(fmt_layer).try_init()
        }
        (false, false) => {
            let fmt_layer = fmt::layer().with_target(true).without_time();
            subscriber.with(fmt_layer).try_init()
        }
    };

    result.map_err(|e| MonitorError::Telemetry(e.to_string()))
}

