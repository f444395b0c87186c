//! Bounded per-metric time series.
//!
//! ```text
//!   PerformanceSnapshot ──► TimeSeriesStore ──► MetricTimeSeries (per metric)
//!                                                  │
//!                                                  ├── RingBuffer<MetricSample>
//!                                                  └── MetricStatistics (recomputed on append)
//! ```

pub mod ring;
pub mod store;

pub use ring::{RingBuffer, RingBufferIter};
pub use store::{MetricTimeSeries, TimeSeriesStore};

/// Default number of samples retained per metric.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;
