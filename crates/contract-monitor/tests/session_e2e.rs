//! End-to-end: snapshots through a session into detections and alerts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use contract_monitor::model::{CONTRACT_VALIDATION_TIME, RESPONSE_TIME_P95};
use contract_monitor::{
    AlertSeverity, MonitoringConfig, MonitoringSession, PerformanceSnapshot, ResourceUsage,
    SimulatedSource,
};
use tokio::sync::watch;

fn snapshot(i: i64, validation_ms: f64) -> PerformanceSnapshot {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(i);
    PerformanceSnapshot::new(
        at,
        validation_ms,
        110.0,
        0.002,
        ResourceUsage {
            cpu_percent: 25.0,
            memory_mb: 210.0,
        },
    )
}

#[tokio::test]
async fn sustained_slowdown_is_detected_and_alerted() {
    let session = MonitoringSession::new(MonitoringConfig::default()).unwrap();

    for i in 0..50 {
        let validation = 700.0 + ((i * 37) % 200) as f64;
        let out = session.record_snapshot(snapshot(i, validation)).await;
        assert!(out.regressions.is_empty(), "tick {i} flagged early");
        assert!(out.alerts_fired.is_empty());
    }

    let mut regressions = 0;
    let mut critical = 0;
    for i in 50..60 {
        let out = session.record_snapshot(snapshot(i, 1300.0)).await;
        regressions += out
            .regressions
            .iter()
            .filter(|r| r.metric_name == CONTRACT_VALIDATION_TIME)
            .count();
        critical += out
            .alerts_fired
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .count();
    }
    assert!(regressions >= 1);
    assert!(critical >= 1);

    let report = session.report().await;
    assert!(report.summary.regressions_detected >= 1);
    assert!(report.summary.alerts_by_severity["critical"] >= 1);
    assert_eq!(report.summary.snapshots_recorded, 60);
    assert!(report
        .baselines
        .iter()
        .any(|b| b.metric_name == CONTRACT_VALIDATION_TIME));

    // One alert for the sustained breach, later ticks deduplicated into it.
    let alerts = session.alerts().await;
    let validation_alerts: Vec<_> = alerts
        .iter()
        .filter(|a| a.metric_name == CONTRACT_VALIDATION_TIME)
        .collect();
    assert_eq!(validation_alerts.len(), 1);
    assert_eq!(validation_alerts[0].occurrences, 10);
}

#[tokio::test]
async fn alert_resolves_after_recovery() {
    let session = MonitoringSession::new(MonitoringConfig::default()).unwrap();
    session.record_snapshot(snapshot(0, 1200.0)).await;

    let mut resolved = Vec::new();
    for i in 1..=3 {
        let out = session.record_snapshot(snapshot(i, 750.0)).await;
        resolved.extend(out.alerts_resolved);
    }
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].metric_name, CONTRACT_VALIDATION_TIME);

    let report = session.report().await;
    assert_eq!(report.summary.alerts_firing, 0);
}

#[tokio::test]
async fn healthy_metrics_raise_nothing() {
    let session = MonitoringSession::new(MonitoringConfig::default()).unwrap();
    for i in 0..40 {
        let out = session.record_snapshot(snapshot(i, 800.0)).await;
        assert!(out.alerts_fired.is_empty());
        assert!(out.anomalies.is_empty());
    }
    let report = session.report().await;
    assert!(report.alerts_triggered.is_empty());
    assert_eq!(
        report.real_time_metrics[RESPONSE_TIME_P95].statistics.mean,
        110.0
    );
}

#[tokio::test(start_paused = true)]
async fn simulated_regression_surfaces_through_collection_loop() {
    let mut config = MonitoringConfig::default();
    config.collection.interval_ms = 50;
    let session = MonitoringSession::new(config).unwrap();
    let source = Arc::new(SimulatedSource::new(42).with_regression(40, 1.6));
    let (tx, rx) = watch::channel(false);

    let runner = {
        let session = session.clone();
        let source = source.clone();
        tokio::spawn(async move { session.run_collection(source, rx).await })
    };
    tokio::time::sleep(Duration::from_millis(50 * 60)).await;
    tx.send(true).unwrap();
    let summary = runner.await.unwrap();

    assert!(summary.ticks >= 55);
    assert_eq!(summary.collection_errors, 0);
    assert!(summary.dispatch.delivered >= 1);

    let report = session.report().await;
    assert!(report
        .regressions
        .iter()
        .any(|r| r.metric_name == CONTRACT_VALIDATION_TIME));
    assert_eq!(source.ticks().await, summary.ticks);
}
