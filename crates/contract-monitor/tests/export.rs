//! Report rendering and export to disk.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use contract_monitor::compatibility::{ContractCapture, PlatformTargets};
use contract_monitor::export::{
    parse_json, render_cross_platform_csv, render_json, render_metrics_csv, render_prometheus,
    render_provider_csv, METRIC_PREFIX,
};
use contract_monitor::verification::ProviderMeasurement;
use contract_monitor::{
    CompatibilityRunner, MonitorResult, MonitoringConfig, MonitoringReport, MonitoringSession,
    PerformanceSnapshot, PlatformProbe, ProviderClient, ReportExporter, ResourceUsage,
    VerificationRunner,
};
use serde_json::json;

struct StaticProvider(&'static str);

#[async_trait]
impl ProviderClient for StaticProvider {
    fn service_name(&self) -> &str {
        self.0
    }

    async fn verify(&self) -> MonitorResult<ProviderMeasurement> {
        Ok(ProviderMeasurement {
            p95_response_time_ms: 80.0,
            memory_usage_mb: 96.0,
            rps: 410.0,
            error_rate: 0.0,
            interactions_verified: 5,
        })
    }
}

struct StaticPlatform(&'static str);

#[async_trait]
impl PlatformProbe for StaticPlatform {
    fn platform(&self) -> &str {
        self.0
    }

    async fn capture(&self) -> MonitorResult<ContractCapture> {
        Ok(ContractCapture {
            platform: self.0.to_string(),
            schema: json!({"id": "x", "amount": 1.0}),
            status: 200,
            headers: BTreeMap::new(),
            body: json!({"id": "x", "amount": 1.0}),
            latency_ms: 50.0,
        })
    }
}

async fn populated_report() -> MonitoringReport {
    let session = MonitoringSession::new(MonitoringConfig::default()).unwrap();
    let start = Utc::now();
    for (i, validation) in [780.0, 820.0, 950.0, 1250.0].into_iter().enumerate() {
        session
            .record_snapshot(PerformanceSnapshot::new(
                start + chrono::Duration::seconds(i as i64),
                validation,
                140.0,
                0.003,
                ResourceUsage {
                    cpu_percent: 35.0,
                    memory_mb: 230.0,
                },
            ))
            .await;
    }

    let verification = VerificationRunner::with_defaults()
        .run(vec![
            Arc::new(StaticProvider("auth")) as Arc<dyn ProviderClient>,
            Arc::new(StaticProvider("content")),
        ])
        .await;
    session.record_verification(verification).await;

    let targets: BTreeMap<String, PlatformTargets> = BTreeMap::new();
    let cross = CompatibilityRunner::new(targets, Duration::from_secs(5))
        .run(
            "wallet-balance",
            vec![
                Arc::new(StaticPlatform("web")) as Arc<dyn PlatformProbe>,
                Arc::new(StaticPlatform("ios")),
            ],
        )
        .await;
    session.record_cross_platform(cross).await;

    session.report().await
}

#[tokio::test]
async fn json_round_trip_preserves_content() {
    let report = populated_report().await;
    assert_eq!(report.alerts_triggered.len(), 2);

    let parsed = parse_json(&render_json(&report).unwrap()).unwrap();
    assert_eq!(parsed.alerts_triggered.len(), report.alerts_triggered.len());
    assert_eq!(
        parsed.compatibility_matrix.keys().collect::<Vec<_>>(),
        vec!["wallet-balance"]
    );
    assert!(parsed.compatibility_matrix["wallet-balance"]
        .get("web", "ios")
        .is_some());
    assert_eq!(parsed.summary, report.summary);
    assert_eq!(parsed.summary.total_tests, 2);
    assert_eq!(parsed.summary.success_rate, Some(1.0));
    assert_eq!(parsed.summary.overall_compatibility, Some(1.0));
}

#[tokio::test]
async fn prometheus_exposes_gauges() {
    let report = populated_report().await;
    let text = render_prometheus(&report).unwrap();

    assert!(text.contains(&format!("{METRIC_PREFIX}_contract_validation_time 1250")));
    assert!(text.contains(&format!("{METRIC_PREFIX}_contract_validation_time_p95")));
    assert!(text.contains(&format!("{METRIC_PREFIX}_alerts_total 2")));
    assert!(text.contains(&format!(
        "{METRIC_PREFIX}_alerts_by_severity{{severity=\"critical\"}} 1"
    )));
    assert!(text.contains(&format!("{METRIC_PREFIX}_compatibility_score 1")));
}

#[tokio::test]
async fn csv_renderings_carry_headers_and_rows() {
    let report = populated_report().await;

    let metrics = render_metrics_csv(&report);
    let mut lines = metrics.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,metric_name,value,alert_triggered")
    );
    // five metrics, four snapshots each
    assert_eq!(lines.clone().count(), 20);
    assert_eq!(
        lines
            .filter(|l| l.contains("contract_validation_time") && l.ends_with(",true"))
            .count(),
        2
    );

    let cross = render_cross_platform_csv(&report);
    assert_eq!(cross.lines().count(), 2);
    assert!(cross.lines().nth(1).unwrap().starts_with("wallet-balance,"));

    let providers = render_provider_csv(&report);
    assert_eq!(providers.lines().count(), 3);
}

#[tokio::test]
async fn every_sample_of_a_sustained_breach_is_flagged() {
    let session = MonitoringSession::new(MonitoringConfig::default()).unwrap();
    let start = Utc::now();
    let mut deduplicated = 0;
    for (i, validation) in [850.0, 950.0, 960.0, 970.0, 880.0].into_iter().enumerate() {
        let tick = session
            .record_snapshot(PerformanceSnapshot::new(
                start + chrono::Duration::seconds(i as i64),
                validation,
                140.0,
                0.003,
                ResourceUsage {
                    cpu_percent: 35.0,
                    memory_mb: 230.0,
                },
            ))
            .await;
        deduplicated += tick.alerts_deduplicated;
    }
    let report = session.report().await;
    assert!(deduplicated > 0);

    let flags: Vec<bool> = render_metrics_csv(&report)
        .lines()
        .skip(1)
        .filter(|l| l.contains(",contract_validation_time,"))
        .map(|l| l.ends_with(",true"))
        .collect();
    assert_eq!(flags, vec![false, true, true, true, false]);
}

#[tokio::test]
async fn exporter_writes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = populated_report().await;
    let exporter = ReportExporter::to_dir(dir.path().join("nested/out"));

    let summary = exporter.export(&report).await;
    assert!(summary.is_complete());
    for name in [
        "contract-performance.json",
        "contract-performance.prom",
        "contract-performance_metrics.csv",
        "contract-performance_cross_platform.csv",
        "contract-performance_providers.csv",
    ] {
        assert!(exporter.output_dir().join(name).exists(), "{name} missing");
    }

    let written = std::fs::read_to_string(exporter.output_dir().join("contract-performance.json"))
        .unwrap();
    assert_eq!(parse_json(&written).unwrap().session_id, report.session_id);
}

#[tokio::test]
async fn export_failure_is_recorded_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    let summary = ReportExporter::to_dir(&blocker)
        .export(&populated_report().await)
        .await;
    assert!(!summary.is_complete());
    assert_eq!(summary.failures.len(), 5);
    assert!(summary.written.is_empty());
}
