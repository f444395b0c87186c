use thiserror::Error;

/// Errors from the monitoring engine.
///
/// Most failure modes in this crate are recovered locally and folded into
/// reports (violations, export summaries, dispatch reports). The variants
/// here describe what went wrong when that happens.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {field} -- {detail}")]
    InvalidConfig { field: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("export to {format} failed: {reason}")]
    Export { format: String, reason: String },

    #[error("delivery to channel {channel} failed: {reason}")]
    Delivery { channel: String, reason: String },

    #[error("provider {service} failed: {reason}")]
    Provider { service: String, reason: String },

    #[error("{operation} exceeded {limit_ms}ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error("snapshot collection failed: {0}")]
    Collection(String),

    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for MonitorError {
    fn from(e: config::ConfigError) -> Self {
        MonitorError::Config(e.to_string())
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(e: prometheus::Error) -> Self {
        MonitorError::Export {
            format: "prometheus".into(),
            reason: e.to_string(),
        }
    }
}

/// Convenience type alias for monitoring results.
pub type MonitorResult<T> = Result<T, MonitorError>;
