//! Rolling statistics over a sample window.
//!
//! All percentiles use the nearest-rank rule: the value at sorted index
//! `floor(len * p)`, clipped to `len - 1`. No interpolation, so results are
//! reproducible across implementations.

use serde::{Deserialize, Serialize};

/// Direction of a metric over its current window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Summary statistics of a metric's current sample window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    /// Population standard deviation.
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
    pub sample_count: usize,
}

/// Second-half average must exceed the first-half average by this factor
/// to count as increasing (and fall below its inverse to count as decreasing).
pub const TREND_UPPER_FACTOR: f64 = 1.05;
pub const TREND_LOWER_FACTOR: f64 = 0.95;

/// Stateless statistics calculator.
pub struct StatisticsEngine;

impl StatisticsEngine {
    /// Compute statistics over `values`, given in collection order.
    ///
    /// An empty window yields zeroed statistics with a stable trend.
    pub fn recompute(values: &[f64]) -> MetricStatistics {
        if values.is_empty() {
            return MetricStatistics::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let min = sorted[0];
        let max = sorted[n - 1];
        // Summation error can push the mean a ulp past the extremes.
        let mean = Self::mean(values).clamp(min, max);

        MetricStatistics {
            mean,
            median: Self::percentile(&sorted, 0.50),
            p95: Self::percentile(&sorted, 0.95),
            p99: Self::percentile(&sorted, 0.99),
            stddev: Self::population_std_dev(values, mean),
            min,
            max,
            trend: Self::trend(values),
            sample_count: n,
        }
    }

    /// Arithmetic mean; zero for an empty slice.
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Population (not sample-corrected) standard deviation around `mean`.
    pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.max(0.0).sqrt()
    }

    /// Nearest-rank percentile of an already sorted slice.
    ///
    /// `p` is resolved to per-mille precision so that `floor(len * p)` is
    /// computed in integers.
    pub fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let n = sorted.len();
        let per_mille = (p.clamp(0.0, 1.0) * 1000.0).round() as usize;
        sorted[(n * per_mille / 1000).min(n - 1)]
    }

    /// Compare the average of the first half of the window with the second.
    pub fn trend(values: &[f64]) -> Trend {
        if values.len() < 2 {
            return Trend::Stable;
        }
        let mid = values.len() / 2;
        let first = Self::mean(&values[..mid]);
        let second = Self::mean(&values[mid..]);

        if second > first * TREND_UPPER_FACTOR {
            Trend::Increasing
        } else if second < first * TREND_LOWER_FACTOR {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_zeroed() {
        let stats = StatisticsEngine::recompute(&[]);
        assert_eq!(stats, MetricStatistics::default());
        assert_eq!(stats.trend, Trend::Stable);
    }

    #[test]
    fn single_value_window() {
        let stats = StatisticsEngine::recompute(&[42.0]);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.p99, 42.0);
        assert_eq!(stats.stddev, 0.0);
        assert_eq!(stats.sample_count, 1);
    }

    #[test]
    fn nearest_rank_percentiles() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let stats = StatisticsEngine::recompute(&values);
        // floor(100 * 0.95) = index 95 -> value 96
        assert_eq!(stats.p95, 96.0);
        // floor(100 * 0.99) = index 99 -> value 100
        assert_eq!(stats.p99, 100.0);
        // floor(100 * 0.5) = index 50 -> value 51
        assert_eq!(stats.median, 51.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
    }

    #[test]
    fn percentile_index_clipped() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(StatisticsEngine::percentile(&sorted, 1.0), 3.0);
        assert_eq!(StatisticsEngine::percentile(&sorted, 0.99), 3.0);
        assert_eq!(StatisticsEngine::percentile(&sorted, 0.0), 1.0);
    }

    #[test]
    fn population_std_dev_not_sample_corrected() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = StatisticsEngine::recompute(&values);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.stddev - 2.0).abs() < 1e-12);
    }

    #[test]
    fn trend_increasing() {
        let values = [10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0];
        assert_eq!(StatisticsEngine::trend(&values), Trend::Increasing);
    }

    #[test]
    fn trend_decreasing() {
        let values = [20.0, 20.0, 20.0, 20.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(StatisticsEngine::trend(&values), Trend::Decreasing);
    }

    #[test]
    fn trend_stable() {
        assert_eq!(StatisticsEngine::trend(&[10.0; 4]), Trend::Stable);
        // 4% change stays inside the 5% band
        assert_eq!(
            StatisticsEngine::trend(&[100.0, 100.0, 104.0, 104.0]),
            Trend::Stable
        );
    }

    #[test]
    fn trend_needs_two_values() {
        assert_eq!(StatisticsEngine::trend(&[]), Trend::Stable);
        assert_eq!(StatisticsEngine::trend(&[5.0]), Trend::Stable);
    }

    #[test]
    fn trend_odd_length_split() {
        // mid = 2: first half [10, 10], second half [10, 30, 30]
        let values = [10.0, 10.0, 10.0, 30.0, 30.0];
        assert_eq!(StatisticsEngine::trend(&values), Trend::Increasing);
    }

    #[test]
    fn trend_display() {
        assert_eq!(Trend::Increasing.to_string(), "increasing");
        assert_eq!(
            serde_json::to_string(&Trend::Decreasing).unwrap(),
            "\"decreasing\""
        );
    }
}
