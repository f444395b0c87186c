//! Flat CSV renderings of a report.
//!
//! Rows are built directly; free-text fields are quoted when they contain a
//! separator, quote or line break. Absent optional values render empty.

use std::fmt::Write as _;

use super::report::MonitoringReport;

pub const METRICS_HEADER: [&str; 4] = ["timestamp", "metric_name", "value", "alert_triggered"];
pub const CROSS_PLATFORM_HEADER: [&str; 6] = [
    "test_name",
    "duration_ms",
    "compatibility_score",
    "success",
    "violations",
    "platforms_count",
];
pub const PROVIDER_HEADER: [&str; 7] = [
    "service_name",
    "verification_time_ms",
    "p95_response_time_ms",
    "success",
    "violations",
    "memory_usage_mb",
    "rps",
];

/// Quote `field` if it would otherwise break the row.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn table(header: &[&str]) -> String {
    let mut out = header.join(",");
    out.push('\n');
    out
}

/// One row per retained sample of every metric.
pub fn render_metrics_csv(report: &MonitoringReport) -> String {
    let mut out = table(&METRICS_HEADER);
    for (metric, rt) in &report.real_time_metrics {
        for sample in &rt.samples {
            let _ = writeln!(
                out,
                "{},{},{},{}",
                sample.timestamp.to_rfc3339(),
                escape_field(metric),
                sample.value,
                report.alert_triggered(metric, sample.timestamp, sample.value),
            );
        }
    }
    out
}

/// One row per cross-platform run.
pub fn render_cross_platform_csv(report: &MonitoringReport) -> String {
    let mut out = table(&CROSS_PLATFORM_HEADER);
    for test in &report.cross_platform_tests {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            escape_field(&test.test_name),
            test.duration_ms,
            test.matrix.overall_score,
            test.success,
            test.violations.len(),
            test.platforms_count(),
        );
    }
    out
}

/// One row per provider outcome across every verification run.
pub fn render_provider_csv(report: &MonitoringReport) -> String {
    let mut out = table(&PROVIDER_HEADER);
    for outcome in report
        .provider_verifications
        .iter()
        .flat_map(|r| r.outcomes.iter())
    {
        let m = outcome.measurement.as_ref();
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            escape_field(&outcome.service_name),
            outcome.verification_time_ms,
            optional(m.map(|m| m.p95_response_time_ms)),
            outcome.success,
            outcome.violation_count,
            optional(m.map(|m| m.memory_usage_mb)),
            optional(m.map(|m| m.rps)),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_untouched() {
        assert_eq!(escape_field("response_time_p95"), "response_time_p95");
    }

    #[test]
    fn separators_and_quotes_escaped() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn missing_measurement_renders_empty() {
        assert_eq!(optional(None), "");
        assert_eq!(optional(Some(12.5)), "12.5");
    }
}
