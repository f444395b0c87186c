//! Statistical baselines learned from a metric's recent history.
//!
//! A baseline is the population mean and standard deviation of a window of
//! samples, with a 95% confidence interval of `1.96 × stddev`. There is at
//! most one baseline per metric; recomputing overwrites it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::regression::RegressionConfig;
use crate::statistics::StatisticsEngine;
use crate::timeseries::MetricTimeSeries;

/// z-value of the two-sided 95% confidence interval.
pub const CONFIDENCE_Z: f64 = 1.96;

/// Learned "normal" level of a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub metric_name: String,
    /// Population mean of the window.
    pub baseline_value: f64,
    pub standard_dev: f64,
    /// Half-width of the 95% interval around `baseline_value`.
    pub confidence_interval: f64,
    pub sample_size: usize,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceBaseline {
    pub fn lower_bound(&self) -> f64 {
        self.baseline_value - self.confidence_interval
    }

    pub fn upper_bound(&self) -> f64 {
        self.baseline_value + self.confidence_interval
    }

    /// Whether `value` lies inside the confidence interval.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound() && value <= self.upper_bound()
    }
}

/// Owns one baseline per metric and decides when to (re)compute them.
#[derive(Clone, Debug)]
pub struct BaselineManager {
    baselines: BTreeMap<String, PerformanceBaseline>,
    /// `total_appended` of the series at the last computation.
    computed_at_sample: BTreeMap<String, u64>,
    min_data_points: usize,
    comparison_window: usize,
    refresh_interval_samples: u64,
}

impl BaselineManager {
    pub fn new(config: &RegressionConfig) -> Self {
        Self {
            baselines: BTreeMap::new(),
            computed_at_sample: BTreeMap::new(),
            min_data_points: config.min_data_points.max(1),
            comparison_window: config.comparison_window.max(1),
            refresh_interval_samples: config.refresh_interval_samples,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&RegressionConfig::default())
    }

    /// Compute the baseline for `metric_name` from `history`.
    ///
    /// Returns `None` and leaves any existing baseline untouched when the
    /// history is shorter than the configured minimum.
    pub fn establish(
        &mut self,
        metric_name: &str,
        history: &[f64],
        now: DateTime<Utc>,
    ) -> Option<&PerformanceBaseline> {
        if history.len() < self.min_data_points {
            debug!(
                metric = %metric_name,
                have = history.len(),
                need = self.min_data_points,
                "insufficient history for baseline"
            );
            return None;
        }

        let mean = StatisticsEngine::mean(history);
        let standard_dev = StatisticsEngine::population_std_dev(history, mean);
        let baseline = PerformanceBaseline {
            metric_name: metric_name.to_string(),
            baseline_value: mean,
            standard_dev,
            confidence_interval: CONFIDENCE_Z * standard_dev,
            sample_size: history.len(),
            last_updated: now,
        };

        info!(
            metric = %metric_name,
            mean = baseline.baseline_value,
            stddev = baseline.standard_dev,
            samples = baseline.sample_size,
            "baseline established"
        );
        self.baselines.insert(metric_name.to_string(), baseline);
        self.baselines.get(metric_name)
    }

    /// Apply the establishment and refresh policy after an append.
    ///
    /// The first baseline is computed as soon as the series holds
    /// `min_data_points` samples. Later recomputations happen only when a
    /// non-zero refresh interval has elapsed, measured in appended samples.
    /// Returns `true` when a baseline was (re)computed.
    pub fn observe(&mut self, series: &MetricTimeSeries, now: DateTime<Utc>) -> bool {
        let appended = series.total_appended();
        let due = match self.computed_at_sample.get(series.name()) {
            None => series.len() >= self.min_data_points,
            Some(_) if self.refresh_interval_samples == 0 => false,
            Some(&at) => appended.saturating_sub(at) >= self.refresh_interval_samples,
        };
        if !due {
            return false;
        }

        let history = series.recent_values(self.comparison_window);
        if self.establish(series.name(), &history, now).is_some() {
            self.computed_at_sample
                .insert(series.name().to_string(), appended);
            true
        } else {
            false
        }
    }

    pub fn get(&self, metric_name: &str) -> Option<&PerformanceBaseline> {
        self.baselines.get(metric_name)
    }

    /// Baselines in metric-name order.
    pub fn all(&self) -> impl Iterator<Item = &PerformanceBaseline> {
        self.baselines.values()
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}
