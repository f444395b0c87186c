//! Configuration for the monitoring engine.
//!
//! Loaded in layers: built-in defaults, then an optional file, then
//! `CONTRACT_MONITOR__<SECTION>__<FIELD>` environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerting::{AlertingConfig, ComparisonOperator, ThresholdConfig};
use crate::anomaly::AnomalyConfig;
use crate::compatibility::PlatformTargets;
use crate::error::{MonitorError, MonitorResult};
use crate::model::{CONTRACT_VALIDATION_TIME, ERROR_RATE, MEMORY_USAGE, RESPONSE_TIME_P95};
use crate::regression::RegressionConfig;
use crate::timeseries::DEFAULT_BUFFER_SIZE;
use crate::verification::VerificationConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CONTRACT_MONITOR";

/// Main monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Per-metric alert thresholds
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, ThresholdConfig>,

    #[serde(default)]
    pub regression: RegressionConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    /// Targets keyed by platform name
    #[serde(default = "default_platform_targets")]
    pub platform_targets: BTreeMap<String, PlatformTargets>,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            thresholds: default_thresholds(),
            regression: RegressionConfig::default(),
            anomaly: AnomalyConfig::default(),
            alerting: AlertingConfig::default(),
            platform_targets: default_platform_targets(),
            verification: VerificationConfig::default(),
            logging: LoggingConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Collection loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Tick interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Samples retained per metric
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Prometheus,
    Csv,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Prometheus => write!(f, "prometheus"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Report export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name stem shared by every exported file
    #[serde(default = "default_file_stem")]
    pub file_stem: String,

    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_stem: default_file_stem(),
            formats: default_formats(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("monitoring-results")
}

fn default_file_stem() -> String {
    "contract-performance".to_string()
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Json, ExportFormat::Prometheus, ExportFormat::Csv]
}

fn default_thresholds() -> BTreeMap<String, ThresholdConfig> {
    BTreeMap::from([
        (
            CONTRACT_VALIDATION_TIME.to_string(),
            ThresholdConfig::new(900.0, 1000.0, ComparisonOperator::GreaterThan, "ms"),
        ),
        (
            RESPONSE_TIME_P95.to_string(),
            ThresholdConfig::new(200.0, 500.0, ComparisonOperator::GreaterThan, "ms"),
        ),
        (
            ERROR_RATE.to_string(),
            ThresholdConfig::new(0.01, 0.05, ComparisonOperator::GreaterThan, "ratio"),
        ),
        (
            MEMORY_USAGE.to_string(),
            ThresholdConfig::new(512.0, 1024.0, ComparisonOperator::GreaterThan, "MB"),
        ),
    ])
}

fn default_platform_targets() -> BTreeMap<String, PlatformTargets> {
    ["web", "ios", "android"]
        .into_iter()
        .map(|p| (p.to_string(), PlatformTargets::default()))
        .collect()
}

fn invalid(field: &str, detail: impl Into<String>) -> MonitorError {
    MonitorError::InvalidConfig {
        field: field.to_string(),
        detail: detail.into(),
    }
}

impl MonitoringConfig {
    /// Load configuration from defaults, an optional file and the
    /// environment, then validate it.
    pub fn load(path: Option<&str>) -> MonitorResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&MonitoringConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with CONTRACT_MONITOR__ prefix
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: MonitoringConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.collection.interval_ms == 0 {
            return Err(invalid("collection.interval_ms", "must be greater than zero"));
        }
        if self.collection.buffer_size == 0 {
            return Err(invalid("collection.buffer_size", "must be greater than zero"));
        }

        let r = &self.regression;
        if r.regression_threshold.is_nan() || r.regression_threshold < 0.0 {
            return Err(invalid("regression.regression_threshold", "must be non-negative"));
        }
        if !(0.0 < r.significance_level && r.significance_level < 1.0) {
            return Err(invalid(
                "regression.significance_level",
                "must lie strictly between 0 and 1",
            ));
        }
        if r.min_data_points == 0 || r.comparison_window == 0 {
            return Err(invalid(
                "regression.min_data_points",
                "min_data_points and comparison_window must be greater than zero",
            ));
        }
        if r.min_data_points > self.collection.buffer_size {
            return Err(invalid(
                "regression.min_data_points",
                "cannot exceed collection.buffer_size",
            ));
        }

        if self.anomaly.sigma_threshold.is_nan() || self.anomaly.sigma_threshold <= 0.0 {
            return Err(invalid("anomaly.sigma_threshold", "must be positive"));
        }

        for (metric, threshold) in &self.thresholds {
            threshold.validate(metric)?;
        }

        if self.alerting.resolve_after_clean_evaluations == 0 {
            return Err(invalid(
                "alerting.resolve_after_clean_evaluations",
                "must be at least one",
            ));
        }
        for rule in &self.alerting.escalation_rules {
            if let Some(missing) = rule
                .escalate_to
                .iter()
                .find(|name| !self.alerting.channels.iter().any(|c| &c.name == *name))
            {
                return Err(invalid(
                    "alerting.escalation_rules",
                    format!("rule {} escalates to unknown channel {missing}", rule.name),
                ));
            }
        }

        for (platform, targets) in &self.platform_targets {
            if !(0.0..=1.0).contains(&targets.min_compatibility_score) {
                return Err(invalid(
                    &format!("platform_targets.{platform}.min_compatibility_score"),
                    "must lie in [0, 1]",
                ));
            }
        }

        let v = &self.verification;
        if v.global_deadline_ms == 0 || v.max_verification_time_ms == 0 {
            return Err(invalid("verification", "time limits must be greater than zero"));
        }
        if v.max_verification_time_ms > v.global_deadline_ms {
            return Err(invalid(
                "verification.max_verification_time_ms",
                "must not exceed verification.global_deadline_ms",
            ));
        }

        if self.export.file_stem.trim().is_empty() {
            return Err(invalid("export.file_stem", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MonitoringConfig::default();
        config.validate().unwrap();
        assert_eq!(config.collection.interval(), Duration::from_secs(1));
        assert_eq!(config.regression.regression_threshold, 0.2);
        let t = &config.thresholds[CONTRACT_VALIDATION_TIME];
        assert_eq!(t.warning, 900.0);
        assert_eq!(t.critical, 1000.0);
        assert_eq!(config.platform_targets.len(), 3);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let config = MonitoringConfig::load(None).unwrap();
        assert_eq!(config.collection.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.alerting.channels.len(), 1);
        assert_eq!(
            config.alerting.escalation_rules[0].condition,
            crate::alerting::AlertPredicate::critical_firing()
        );
    }

    #[test]
    fn load_layers_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[collection]
interval_ms = 250

[regression]
regression_threshold = 0.3
"#
        )
        .unwrap();

        let config = MonitoringConfig::load(path.to_str()).unwrap();
        assert_eq!(config.collection.interval_ms, 250);
        assert_eq!(config.collection.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.regression.regression_threshold, 0.3);
        assert_eq!(config.regression.min_data_points, 30);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = MonitoringConfig::load(Some("/nonexistent/contract-monitor")).unwrap();
        assert_eq!(config, MonitoringConfig::load(None).unwrap());
    }

    #[test]
    fn validate_rejects_zero_buffer() {
        let mut config = MonitoringConfig::default();
        config.collection.buffer_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("collection.buffer_size"));
    }

    #[test]
    fn validate_rejects_bad_regression_settings() {
        let mut config = MonitoringConfig::default();
        config.regression.regression_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = MonitoringConfig::default();
        config.regression.significance_level = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = MonitoringConfig::default();
        config.thresholds.insert(
            "latency".into(),
            ThresholdConfig::new(1000.0, 800.0, ComparisonOperator::GreaterThan, "ms"),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_escalation_channel() {
        let mut config = MonitoringConfig::default();
        config.alerting.escalation_rules[0].escalate_to = vec!["pagerduty".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pagerduty"));
    }

    #[test]
    fn validate_rejects_per_provider_limit_above_deadline() {
        let mut config = MonitoringConfig::default();
        config.verification.max_verification_time_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_json_roundtrip() {
        let config = MonitoringConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: MonitoringConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
