//! The exported view of a monitoring session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerting::Alert;
use crate::anomaly::Anomaly;
use crate::baseline::PerformanceBaseline;
use crate::compatibility::{CompatibilityMatrix, CrossPlatformReport};
use crate::config::MonitoringConfig;
use crate::error::MonitorResult;
use crate::model::{MetricSample, PerformanceSnapshot};
use crate::regression::Regression;
use crate::statistics::MetricStatistics;
use crate::verification::VerificationReport;

/// Current state of one metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealTimeMetric {
    pub metric_name: String,
    pub latest: Option<f64>,
    pub statistics: MetricStatistics,
    /// Retained samples, oldest first.
    pub samples: Vec<MetricSample>,
}

/// Summary counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub snapshots_recorded: u64,
    /// Provider verification runs plus cross-platform runs.
    pub total_tests: usize,
    pub successful_tests: usize,
    /// Absent when no tests ran.
    pub success_rate: Option<f64>,
    pub regressions_detected: u64,
    pub anomalies_detected: u64,
    pub alerts_by_severity: BTreeMap<String, usize>,
    pub alerts_firing: usize,
    /// Mean pair score over every compatibility run; absent without pairs.
    pub overall_compatibility: Option<f64>,
}

/// Everything a session knows, as exported on teardown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub real_time_metrics: BTreeMap<String, RealTimeMetric>,
    pub performance_history: Vec<PerformanceSnapshot>,
    pub alerts_triggered: Vec<Alert>,
    pub anomalies: Vec<Anomaly>,
    pub regressions: Vec<Regression>,
    pub baselines: Vec<PerformanceBaseline>,
    /// Compatibility matrices keyed by test name.
    pub compatibility_matrix: BTreeMap<String, CompatibilityMatrix>,
    pub cross_platform_tests: Vec<CrossPlatformReport>,
    pub provider_verifications: Vec<VerificationReport>,
    pub monitoring_config: MonitoringConfig,
    pub summary: ReportSummary,
}

impl MonitoringReport {
    /// Whether the sample `value` of `metric` taken at `timestamp` sat inside
    /// a breach: it crosses an enabled threshold, or an alert on `metric`
    /// was raised at that instant.
    pub fn alert_triggered(&self, metric: &str, timestamp: DateTime<Utc>, value: f64) -> bool {
        let crossed = self
            .monitoring_config
            .thresholds
            .get(metric)
            .filter(|t| t.enabled)
            .and_then(|t| t.classify(value))
            .is_some();
        crossed
            || self
                .alerts_triggered
                .iter()
                .any(|a| a.metric_name == metric && a.timestamp == timestamp)
    }
}

/// Nested JSON rendering of the whole report.
pub fn render_json(report: &MonitoringReport) -> MonitorResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Parse a report previously produced by [`render_json`].
pub fn parse_json(json: &str) -> MonitorResult<MonitoringReport> {
    Ok(serde_json::from_str(json)?)
}
