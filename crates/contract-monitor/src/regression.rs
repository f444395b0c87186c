//! Regression detection against learned baselines.
//!
//! A value regresses when a baseline exists for its metric and the value
//! exceeds `baseline × (1 + regression_threshold)`. The check is pure: it
//! reads baselines and never mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::baseline::{BaselineManager, PerformanceBaseline};
use crate::model::PerformanceSnapshot;

// ── Configuration ───────────────────────────────────────────────────────

/// Baseline and regression tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Number of most recent samples a baseline is computed over.
    pub comparison_window: usize,
    /// Fractional increase over baseline that counts as a regression.
    pub regression_threshold: f64,
    /// Samples required before a baseline is established.
    pub min_data_points: usize,
    /// Two-sided significance level used to mark a regression significant.
    pub significance_level: f64,
    /// Recompute baselines every this many appended samples; zero disables.
    pub refresh_interval_samples: u64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            comparison_window: 50,
            regression_threshold: 0.2,
            min_data_points: 30,
            significance_level: 0.05,
            refresh_interval_samples: 0,
        }
    }
}

impl RegressionConfig {
    /// Critical z-value for the configured significance level.
    ///
    /// Uses the closest tabulated level at or above the configured one.
    pub fn critical_z(&self) -> f64 {
        const TABLE: [(f64, f64); 4] = [(0.001, 3.291), (0.01, 2.576), (0.05, 1.960), (0.10, 1.645)];
        TABLE
            .iter()
            .find(|(alpha, _)| self.significance_level <= *alpha + f64::EPSILON)
            .map(|(_, z)| *z)
            .unwrap_or(1.645)
    }
}

// ── Regression ──────────────────────────────────────────────────────────

/// A value that exceeded its baseline by more than the threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub metric_name: String,
    pub detected_at: DateTime<Utc>,
    pub baseline_value: f64,
    pub current_value: f64,
    /// `baseline × (1 + threshold)`; the value crossed this.
    pub threshold_value: f64,
    /// `current / baseline`.
    pub ratio: f64,
    /// Standard score against the baseline; absent when the baseline has
    /// zero spread.
    pub z_score: Option<f64>,
    /// Whether the shift is also statistically significant.
    pub significant: bool,
}

/// Compares live values against baselines.
#[derive(Clone, Debug)]
pub struct RegressionDetector {
    threshold: f64,
    critical_z: f64,
}

impl RegressionDetector {
    pub fn new(config: &RegressionConfig) -> Self {
        Self {
            threshold: config.regression_threshold,
            critical_z: config.critical_z(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&RegressionConfig::default())
    }

    /// Compare `value` against an explicit baseline.
    ///
    /// Baselines at or below zero have no relative scale and never flag.
    pub fn compare(
        &self,
        baseline: &PerformanceBaseline,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<Regression> {
        if !value.is_finite() || baseline.baseline_value <= 0.0 {
            return None;
        }
        let threshold_value = baseline.baseline_value * (1.0 + self.threshold);
        if value <= threshold_value {
            return None;
        }

        let z_score = (baseline.standard_dev > f64::EPSILON)
            .then(|| (value - baseline.baseline_value) / baseline.standard_dev);
        let significant = z_score.map_or(true, |z| z >= self.critical_z);

        Some(Regression {
            metric_name: baseline.metric_name.clone(),
            detected_at: at,
            baseline_value: baseline.baseline_value,
            current_value: value,
            threshold_value,
            ratio: value / baseline.baseline_value,
            z_score,
            significant,
        })
    }

    /// Check one metric. Metrics without a baseline are skipped.
    pub fn check(
        &self,
        baselines: &BaselineManager,
        metric_name: &str,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<Regression> {
        let baseline = baselines.get(metric_name)?;
        let regression = self.compare(baseline, value, at);
        if let Some(r) = &regression {
            debug!(
                metric = %metric_name,
                value = r.current_value,
                baseline = r.baseline_value,
                ratio = r.ratio,
                "regression detected"
            );
        }
        regression
    }

    /// Check every metric of a snapshot independently.
    pub fn check_snapshot(
        &self,
        baselines: &BaselineManager,
        snapshot: &PerformanceSnapshot,
    ) -> Vec<Regression> {
        snapshot
            .metrics()
            .into_iter()
            .filter_map(|(name, value)| self.check(baselines, &name, value, snapshot.timestamp))
            .collect()
    }
}
