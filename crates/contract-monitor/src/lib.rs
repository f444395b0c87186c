//! Contract performance monitoring
//!
//! This crate watches the performance of HTTP contract verification runs:
//! - Bounded per-metric time series with rolling statistics
//! - Baselines, regression and anomaly detection
//! - Threshold alerting with escalation, suppression and delivery
//! - Provider verification and cross-platform compatibility runs
//! - Report export as JSON, Prometheus text and CSV
//!
//! A [`MonitoringSession`] owns all per-run state. Snapshots come from a
//! [`SnapshotSource`] on a fixed interval and are fanned out into the
//! series store, detectors and alert manager.

pub mod alerting;
pub mod anomaly;
pub mod baseline;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod export;
mod fanout;
pub mod model;
pub mod regression;
pub mod session;
pub mod source;
pub mod statistics;
pub mod telemetry;
pub mod timeseries;
pub mod verification;
pub mod violation;

pub use alerting::{Alert, AlertManager, AlertNotifier, AlertSeverity, ThresholdConfig};
pub use anomaly::{Anomaly, AnomalyDetector};
pub use baseline::{BaselineManager, PerformanceBaseline};
pub use compatibility::{CompatibilityRunner, CrossPlatformReport, PlatformProbe};
pub use config::MonitoringConfig;
pub use error::{MonitorError, MonitorResult};
pub use export::{MonitoringReport, ReportExporter};
pub use model::{MetricSample, PerformanceSnapshot, ResourceUsage};
pub use regression::{Regression, RegressionDetector};
pub use session::{CollectionSummary, MonitoringSession, TickOutcome};
pub use source::{SimulatedSource, SnapshotSource};
pub use statistics::{MetricStatistics, StatisticsEngine, Trend};
pub use timeseries::{MetricTimeSeries, TimeSeriesStore};
pub use verification::{ProviderClient, VerificationReport, VerificationRunner};
pub use violation::{IssueSeverity, Violation, ViolationKind};
