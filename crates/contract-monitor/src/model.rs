//! Sample and snapshot primitives produced by the collector.
//!
//! `MetricSample` is the unit stored in a time series. `PerformanceSnapshot`
//! is what a collector hands over on every tick; the session fans it out into
//! one sample per metric.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form key/value tags attached to samples and snapshots.
pub type Tags = BTreeMap<String, String>;

/// Contract validation duration in milliseconds.
pub const CONTRACT_VALIDATION_TIME: &str = "contract_validation_time";
/// 95th percentile response time of the verified endpoints in milliseconds.
pub const RESPONSE_TIME_P95: &str = "response_time_p95";
/// Fraction of failed interactions (0.0 to 1.0).
pub const ERROR_RATE: &str = "error_rate";
/// CPU utilization percentage.
pub const CPU_USAGE: &str = "cpu_usage";
/// Resident memory in megabytes.
pub const MEMORY_USAGE: &str = "memory_usage";

/// A single observed value of a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub tags: Tags,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            tags: Tags::new(),
        }
    }

    pub fn with_tags(timestamp: DateTime<Utc>, value: f64, tags: Tags) -> Self {
        Self {
            timestamp,
            value,
            tags,
        }
    }
}

/// Resource usage of the process under verification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Point-in-time bundle of domain metrics captured on one collection tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub contract_validation_time_ms: f64,
    pub response_time_p95_ms: f64,
    pub error_rate: f64,
    pub resource_usage: ResourceUsage,
    /// Extra named metrics beyond the fixed set.
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: Tags,
}

impl PerformanceSnapshot {
    /// Snapshot with the fixed metric set and no tags or custom metrics.
    pub fn new(
        timestamp: DateTime<Utc>,
        contract_validation_time_ms: f64,
        response_time_p95_ms: f64,
        error_rate: f64,
        resource_usage: ResourceUsage,
    ) -> Self {
        Self {
            timestamp,
            contract_validation_time_ms,
            response_time_p95_ms,
            error_rate,
            resource_usage,
            custom_metrics: BTreeMap::new(),
            tags: Tags::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.custom_metrics.insert(name.into(), value);
        self
    }

    /// All metrics carried by this snapshot as `(name, value)` pairs.
    ///
    /// The fixed metrics come first in a stable order, followed by custom
    /// metrics in name order. Non-finite values are dropped.
    pub fn metrics(&self) -> Vec<(String, f64)> {
        let fixed = [
            (CONTRACT_VALIDATION_TIME, self.contract_validation_time_ms),
            (RESPONSE_TIME_P95, self.response_time_p95_ms),
            (ERROR_RATE, self.error_rate),
            (CPU_USAGE, self.resource_usage.cpu_percent),
            (MEMORY_USAGE, self.resource_usage.memory_mb),
        ];

        fixed
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .chain(
                self.custom_metrics
                    .iter()
                    .map(|(name, value)| (name.clone(), *value)),
            )
            .filter(|(_, value)| value.is_finite())
            .collect()
    }

    /// Build the sample recorded for one metric of this snapshot.
    pub fn sample(&self, value: f64) -> MetricSample {
        MetricSample::with_tags(self.timestamp, value, self.tags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot::new(
            Utc::now(),
            820.0,
            140.0,
            0.01,
            ResourceUsage {
                cpu_percent: 35.0,
                memory_mb: 256.0,
            },
        )
    }

    #[test]
    fn snapshot_metrics_fixed_order() {
        let metrics = snapshot().metrics();
        let names: Vec<&str> = metrics.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                CONTRACT_VALIDATION_TIME,
                RESPONSE_TIME_P95,
                ERROR_RATE,
                CPU_USAGE,
                MEMORY_USAGE
            ]
        );
        assert!((metrics[0].1 - 820.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_custom_metrics_appended() {
        let snap = snapshot()
            .with_metric("broker_publish_time", 12.0)
            .with_metric("interactions_verified", 42.0);
        let metrics = snap.metrics();
        assert_eq!(metrics.len(), 7);
        assert_eq!(metrics[5].0, "broker_publish_time");
        assert_eq!(metrics[6].0, "interactions_verified");
    }

    #[test]
    fn snapshot_drops_non_finite_values() {
        let mut snap = snapshot();
        snap.error_rate = f64::NAN;
        let metrics = snap.metrics();
        assert!(metrics.iter().all(|(name, _)| name != ERROR_RATE));
    }

    #[test]
    fn sample_inherits_snapshot_tags() {
        let snap = snapshot().with_tag("service", "auth");
        let sample = snap.sample(1.0);
        assert_eq!(sample.timestamp, snap.timestamp);
        assert_eq!(sample.tags.get("service").map(String::as_str), Some("auth"));
    }

    #[test]
    fn snapshot_serialization() {
        let snap = snapshot().with_tag("env", "ci");
        let json = serde_json::to_string(&snap).unwrap();
        let restored: PerformanceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snap);
    }
}
