//! Sigma-band anomaly detection over a series' recent samples.
//!
//! ```text
//!   MetricTimeSeries (statistics + recent k samples)
//!       │
//!       ▼
//!   [mean − nσ, mean + nσ] ──► Anomaly (per out-of-band sample)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::statistics::MetricStatistics;
use crate::timeseries::MetricTimeSeries;

/// Anomaly detection tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Width of the normal band in standard deviations.
    pub sigma_threshold: f64,
    /// How many of the most recent samples are inspected.
    pub recent_window: usize,
    /// Minimum series length before any sample can be flagged.
    pub min_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            sigma_threshold: 3.0,
            recent_window: 5,
            min_samples: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    LatencySpike,
    ErrorRateSpike,
    MemoryPressure,
    CpuSaturation,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyDirection {
    Above,
    Below,
}

/// A sample that fell outside its series' sigma band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Series mean at detection time.
    pub expected: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Distance from the mean in standard deviations.
    pub z_score: f64,
    pub direction: AnomalyDirection,
    pub severity: AnomalySeverity,
    pub category: AnomalyCategory,
    /// Position of the sample in its series, counting every append.
    pub sequence: u64,
}

fn categorize_metric(metric_name: &str) -> AnomalyCategory {
    if metric_name.contains("time") || metric_name.contains("latency") {
        AnomalyCategory::LatencySpike
    } else if metric_name.contains("error") {
        AnomalyCategory::ErrorRateSpike
    } else if metric_name.contains("memory") {
        AnomalyCategory::MemoryPressure
    } else if metric_name.contains("cpu") {
        AnomalyCategory::CpuSaturation
    } else {
        AnomalyCategory::Other
    }
}

/// Flags recent samples outside `[mean − nσ, mean + nσ]`.
#[derive(Clone, Debug)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    /// Next unreported sequence number per metric.
    watermarks: BTreeMap<String, u64>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            watermarks: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AnomalyConfig::default())
    }

    /// Classify a single value against the given statistics.
    ///
    /// A series with no spread has no band to fall outside of.
    pub fn check_value(
        &self,
        metric_name: &str,
        value: f64,
        stats: &MetricStatistics,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Option<Anomaly> {
        if stats.stddev < f64::EPSILON {
            return None;
        }
        let n = self.config.sigma_threshold;
        let lower_bound = stats.mean - n * stats.stddev;
        let upper_bound = stats.mean + n * stats.stddev;
        if value >= lower_bound && value <= upper_bound {
            return None;
        }

        let z_score = (value - stats.mean).abs() / stats.stddev;
        let severity = if z_score > n * 2.0 {
            AnomalySeverity::Critical
        } else if z_score > n * 1.5 {
            AnomalySeverity::Warning
        } else {
            AnomalySeverity::Info
        };

        Some(Anomaly {
            metric_name: metric_name.to_string(),
            timestamp,
            value,
            expected: stats.mean,
            lower_bound,
            upper_bound,
            z_score,
            direction: if value > upper_bound {
                AnomalyDirection::Above
            } else {
                AnomalyDirection::Below
            },
            severity,
            category: categorize_metric(metric_name),
            sequence,
        })
    }

    /// Inspect the most recent samples of `series` against its current
    /// statistics. Series shorter than `min_samples` yield nothing.
    pub fn check(&self, series: &MetricTimeSeries) -> Vec<Anomaly> {
        if series.len() < self.config.min_samples {
            return Vec::new();
        }
        let stats = series.statistics();
        let window = series.window(self.config.recent_window);
        let first_seq = series.total_appended() - window.len() as u64;

        window
            .iter()
            .enumerate()
            .filter_map(|(i, sample)| {
                self.check_value(
                    series.name(),
                    sample.value,
                    stats,
                    sample.timestamp,
                    first_seq + i as u64,
                )
            })
            .collect()
    }

    /// Like [`check`](Self::check), but each sample is reported at most once
    /// across calls.
    pub fn detect_new(&mut self, series: &MetricTimeSeries) -> Vec<Anomaly> {
        let watermark = self.watermarks.get(series.name()).copied().unwrap_or(0);
        let fresh: Vec<Anomaly> = self
            .check(series)
            .into_iter()
            .filter(|a| a.sequence >= watermark)
            .collect();

        if let Some(last) = fresh.last() {
            self.watermarks
                .insert(series.name().to_string(), last.sequence + 1);
            debug!(
                metric = %series.name(),
                count = fresh.len(),
                "anomalies detected"
            );
        }
        fresh
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }
}
