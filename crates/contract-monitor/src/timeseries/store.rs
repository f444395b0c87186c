use std::collections::BTreeMap;

use tracing::debug;

use crate::model::MetricSample;
use crate::statistics::{MetricStatistics, StatisticsEngine};

use super::ring::RingBuffer;

/// A named, bounded series of samples with statistics kept current.
#[derive(Clone, Debug)]
pub struct MetricTimeSeries {
    name: String,
    samples: RingBuffer<MetricSample>,
    statistics: MetricStatistics,
    /// Samples ever appended, including evicted ones.
    total_appended: u64,
}

impl MetricTimeSeries {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            samples: RingBuffer::new(capacity),
            statistics: MetricStatistics::default(),
            total_appended: 0,
        }
    }

    /// Append a sample and recompute statistics over the retained window.
    pub fn append(&mut self, sample: MetricSample) {
        self.samples.push(sample);
        self.total_appended += 1;
        let values = self.values();
        self.statistics = StatisticsEngine::recompute(&values);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistics(&self) -> &MetricStatistics {
        &self.statistics
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Sequence number of the oldest retained sample. Sequence numbers
    /// start at zero and count every append.
    pub fn first_sequence(&self) -> u64 {
        self.total_appended - self.samples.len() as u64
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.latest()
    }

    /// All retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// The most recent `n` samples (or fewer), oldest first.
    pub fn window(&self, n: usize) -> Vec<MetricSample> {
        self.samples.recent(n).cloned().collect()
    }

    /// Retained values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// The most recent `n` values, oldest first.
    pub fn recent_values(&self, n: usize) -> Vec<f64> {
        self.samples.recent(n).map(|s| s.value).collect()
    }
}

/// Per-metric bounded storage for every metric the session has seen.
#[derive(Clone, Debug)]
pub struct TimeSeriesStore {
    capacity: usize,
    series: BTreeMap<String, MetricTimeSeries>,
}

impl TimeSeriesStore {
    /// Create a store whose series each retain at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    /// Append a sample to `metric`, creating the series on first use.
    pub fn append(&mut self, metric: &str, sample: MetricSample) -> &MetricTimeSeries {
        let capacity = self.capacity;
        let series = self
            .series
            .entry(metric.to_string())
            .or_insert_with(|| MetricTimeSeries::new(metric, capacity));
        series.append(sample);
        debug!(
            metric = %metric,
            len = series.len(),
            mean = series.statistics().mean,
            "sample appended"
        );
        series
    }

    /// The most recent `n` samples of `metric`; empty for unknown metrics.
    pub fn window(&self, metric: &str, n: usize) -> Vec<MetricSample> {
        self.series
            .get(metric)
            .map(|s| s.window(n))
            .unwrap_or_default()
    }

    pub fn get(&self, metric: &str) -> Option<&MetricTimeSeries> {
        self.series.get(metric)
    }

    /// Series in metric-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricTimeSeries)> {
        self.series.iter()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
