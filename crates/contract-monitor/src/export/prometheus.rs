//! Prometheus text exposition of a report.

use std::collections::BTreeSet;

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::error::{MonitorError, MonitorResult};

use super::report::MonitoringReport;

/// Prefix of every exported metric name.
pub const METRIC_PREFIX: &str = "tchat_contract_monitoring";

/// Map an arbitrary metric name onto the Prometheus name alphabet.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Registers collectors, skipping any whose name is already taken.
struct Exposition {
    registry: Registry,
    names: BTreeSet<String>,
}

impl Exposition {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            names: BTreeSet::new(),
        }
    }

    fn claim(&mut self, name: &str) -> bool {
        if self.names.insert(name.to_string()) {
            return true;
        }
        warn!(metric = %name, "metric name already exported, skipping");
        false
    }

    fn gauge(&mut self, name: &str, help: &str, value: f64) -> MonitorResult<()> {
        if !self.claim(name) {
            return Ok(());
        }
        let g = Gauge::with_opts(Opts::new(name, help))?;
        g.set(value);
        self.registry.register(Box::new(g))?;
        Ok(())
    }

    fn counter(&mut self, name: &str, help: &str, value: u64) -> MonitorResult<()> {
        if !self.claim(name) {
            return Ok(());
        }
        let c = IntCounter::with_opts(Opts::new(name, help))?;
        c.inc_by(value);
        self.registry.register(Box::new(c))?;
        Ok(())
    }
}

/// Build a registry holding the report's metrics.
///
/// Session totals are registered first. A per-metric name that collides
/// with one already registered (after sanitizing) is logged and skipped.
pub fn build_registry(report: &MonitoringReport) -> MonitorResult<Registry> {
    let mut exp = Exposition::new();

    exp.counter(
        &format!("{METRIC_PREFIX}_alerts_total"),
        "Alerts raised during the session",
        report.alerts_triggered.len() as u64,
    )?;

    let by_severity_name = format!("{METRIC_PREFIX}_alerts_by_severity");
    exp.claim(&by_severity_name);
    let by_severity = IntCounterVec::new(
        Opts::new(by_severity_name, "Alerts raised during the session by severity"),
        &["severity"],
    )?;
    for (severity, count) in &report.summary.alerts_by_severity {
        by_severity
            .get_metric_with_label_values(&[severity.as_str()])?
            .inc_by(*count as u64);
    }
    exp.registry.register(Box::new(by_severity))?;

    exp.counter(
        &format!("{METRIC_PREFIX}_regressions_detected"),
        "Regressions detected during the session",
        report.summary.regressions_detected,
    )?;
    if let Some(score) = report.summary.overall_compatibility {
        exp.gauge(
            &format!("{METRIC_PREFIX}_compatibility_score"),
            "Mean cross-platform compatibility score",
            score,
        )?;
    }

    for (metric, rt) in &report.real_time_metrics {
        let Some(latest) = rt.latest else {
            continue;
        };
        let base = format!("{METRIC_PREFIX}_{}", sanitize_metric_name(metric));
        exp.gauge(&base, &format!("Latest {metric} sample"), latest)?;
        exp.gauge(
            &format!("{base}_mean"),
            &format!("Mean of retained {metric} samples"),
            rt.statistics.mean,
        )?;
        exp.gauge(
            &format!("{base}_p95"),
            &format!("95th percentile of retained {metric} samples"),
            rt.statistics.p95,
        )?;
    }

    Ok(exp.registry)
}

/// Render the report as Prometheus text exposition format.
pub fn render_prometheus(report: &MonitoringReport) -> MonitorResult<String> {
    let registry = build_registry(report)?;
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MonitorError::Export {
        format: "prometheus".into(),
        reason: e.to_string(),
    })
}
