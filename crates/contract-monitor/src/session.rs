//! The single owner of all per-run monitoring state.
//!
//! ```text
//!   SnapshotSource ──tick──► record_snapshot ──► TimeSeriesStore
//!                                  │              BaselineManager
//!                                  │              RegressionDetector / AnomalyDetector
//!                                  │              AlertManager::evaluate
//!                                  ▼
//!                         dispatch_pending ──(outside the lock)──► AlertNotifier
//!
//!   teardown ──► report() ──► ReportExporter
//! ```
//!
//! All state sits behind one `RwLock`; every mutation is a single write
//! section and no I/O happens while it is held.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::alerting::{dispatch, Alert, AlertManager, AlertNotifier, DispatchReport, TracingNotifier};
use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::baseline::BaselineManager;
use crate::compatibility::CrossPlatformReport;
use crate::config::MonitoringConfig;
use crate::error::MonitorResult;
use crate::export::{ExportSummary, MonitoringReport, RealTimeMetric, ReportExporter, ReportSummary};
use crate::model::PerformanceSnapshot;
use crate::regression::{Regression, RegressionDetector};
use crate::source::SnapshotSource;
use crate::timeseries::{RingBuffer, TimeSeriesStore};
use crate::verification::VerificationReport;

// ── Tick outcome ────────────────────────────────────────────────────────

/// Everything one recorded snapshot produced.
#[derive(Clone, Debug, Default)]
pub struct TickOutcome {
    pub recorded_metrics: usize,
    pub baselines_established: Vec<String>,
    pub regressions: Vec<Regression>,
    pub anomalies: Vec<Anomaly>,
    pub alerts_fired: Vec<Alert>,
    pub alerts_resolved: Vec<Alert>,
    pub alerts_deduplicated: usize,
}

/// Totals of a collection loop run.
#[derive(Clone, Debug, Default)]
pub struct CollectionSummary {
    pub ticks: u64,
    pub collection_errors: u64,
    pub dispatch: DispatchReport,
}

// ── State ───────────────────────────────────────────────────────────────

struct SessionState {
    started_at: DateTime<Utc>,
    store: TimeSeriesStore,
    history: RingBuffer<PerformanceSnapshot>,
    baselines: BaselineManager,
    regression: RegressionDetector,
    anomaly: AnomalyDetector,
    alerts: AlertManager,
    regressions: RingBuffer<Regression>,
    anomalies: RingBuffer<Anomaly>,
    regressions_detected: u64,
    anomalies_detected: u64,
    snapshots_recorded: u64,
    verifications: Vec<VerificationReport>,
    cross_platform: Vec<CrossPlatformReport>,
}

impl SessionState {
    fn new(config: &MonitoringConfig) -> Self {
        let capacity = config.collection.buffer_size;
        Self {
            started_at: Utc::now(),
            store: TimeSeriesStore::new(capacity),
            history: RingBuffer::new(capacity),
            baselines: BaselineManager::new(&config.regression),
            regression: RegressionDetector::new(&config.regression),
            anomaly: AnomalyDetector::new(config.anomaly.clone()),
            alerts: AlertManager::new(config.thresholds.clone(), config.alerting.clone()),
            regressions: RingBuffer::new(capacity),
            anomalies: RingBuffer::new(capacity),
            regressions_detected: 0,
            anomalies_detected: 0,
            snapshots_recorded: 0,
            verifications: Vec::new(),
            cross_platform: Vec::new(),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────

/// A monitoring session. Cloning shares the same state.
#[derive(Clone)]
pub struct MonitoringSession {
    id: Uuid,
    config: Arc<MonitoringConfig>,
    state: Arc<RwLock<SessionState>>,
    notifier: Arc<dyn AlertNotifier>,
}

impl MonitoringSession {
    /// Validate `config` and start an empty session that notifies through
    /// tracing.
    pub fn new(config: MonitoringConfig) -> MonitorResult<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        info!(session_id = %id, "monitoring session started");
        Ok(Self {
            id,
            state: Arc::new(RwLock::new(SessionState::new(&config))),
            config: Arc::new(config),
            notifier: Arc::new(TracingNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Feed one snapshot through the whole pipeline.
    pub async fn record_snapshot(&self, snapshot: PerformanceSnapshot) -> TickOutcome {
        let mut guard = self.state.write().await;
        let st = &mut *guard;
        let at = snapshot.timestamp;
        let mut outcome = TickOutcome::default();

        for (metric, value) in snapshot.metrics() {
            let series = st.store.append(&metric, snapshot.sample(value));
            if st.baselines.observe(series, at) {
                outcome.baselines_established.push(metric.clone());
            }
            if let Some(r) = st.regression.check(&st.baselines, &metric, value, at) {
                outcome.regressions.push(r);
            }
            outcome.anomalies.extend(st.anomaly.detect_new(series));
            outcome.recorded_metrics += 1;
        }

        let evaluation = st.alerts.evaluate(&snapshot, &outcome.regressions);
        outcome.alerts_fired = evaluation.fired;
        outcome.alerts_resolved = evaluation.resolved;
        outcome.alerts_deduplicated = evaluation.deduplicated;

        st.regressions_detected += outcome.regressions.len() as u64;
        st.anomalies_detected += outcome.anomalies.len() as u64;
        for r in &outcome.regressions {
            st.regressions.push(r.clone());
        }
        for a in &outcome.anomalies {
            st.anomalies.push(a.clone());
        }
        st.history.push(snapshot);
        st.snapshots_recorded += 1;

        debug!(
            metrics = outcome.recorded_metrics,
            regressions = outcome.regressions.len(),
            anomalies = outcome.anomalies.len(),
            fired = outcome.alerts_fired.len(),
            "snapshot recorded"
        );
        outcome
    }

    /// Evaluate escalations and deliver everything due at `now`.
    ///
    /// Alerts are copied out under the lock and delivered after it is
    /// released.
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> DispatchReport {
        let pending = {
            let mut st = self.state.write().await;
            st.alerts.take_pending(now)
        };
        if pending.is_empty() {
            return DispatchReport::default();
        }
        dispatch(self.notifier.as_ref(), &pending).await
    }

    /// Collect from `source` on every interval tick until `shutdown` flips
    /// to `true` or its sender is dropped.
    ///
    /// Collection errors are logged and the tick skipped; a `collect()` that
    /// outlives the interval counts as an error. Delivery runs
    /// concurrently with collection and is drained before returning.
    #[instrument(skip(self, source, shutdown), fields(session_id = %self.id))]
    pub async fn run_collection(
        &self,
        source: Arc<dyn SnapshotSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> CollectionSummary {
        let mut summary = CollectionSummary::default();
        let mut deliveries: JoinSet<DispatchReport> = JoinSet::new();
        let period = self.config.collection.interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if *shutdown.borrow() {
            return summary;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let collected = tokio::select! {
                        res = tokio::time::timeout(period, source.collect()) => res,
                        _ = shutdown.wait_for(|stop| *stop) => break,
                    };
                    match collected {
                        Ok(Ok(snapshot)) => {
                            self.record_snapshot(snapshot).await;
                            summary.ticks += 1;
                            let session = self.clone();
                            deliveries.spawn(async move {
                                session.dispatch_pending(Utc::now()).await
                            });
                        }
                        Ok(Err(e)) => {
                            warn!(error = %e, "snapshot collection failed, skipping tick");
                            summary.collection_errors += 1;
                        }
                        Err(_) => {
                            warn!(
                                limit_ms = period.as_millis() as u64,
                                "snapshot collection timed out, skipping tick"
                            );
                            summary.collection_errors += 1;
                        }
                    }
                }
                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                    match joined {
                        Ok(report) => summary.dispatch.merge(report),
                        Err(e) => warn!(error = %e, "delivery task failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(report) => summary.dispatch.merge(report),
                Err(e) => warn!(error = %e, "delivery task failed"),
            }
        }

        info!(
            ticks = summary.ticks,
            errors = summary.collection_errors,
            delivered = summary.dispatch.delivered,
            "collection stopped"
        );
        summary
    }

    pub async fn record_verification(&self, report: VerificationReport) {
        self.state.write().await.verifications.push(report);
    }

    pub async fn record_cross_platform(&self, report: CrossPlatformReport) {
        self.state.write().await.cross_platform.push(report);
    }

    /// All alerts raised so far, in creation order.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.alerts().to_vec()
    }

    /// Snapshot every piece of session state into a report.
    pub async fn report(&self) -> MonitoringReport {
        let st = self.state.read().await;

        let real_time_metrics = st
            .store
            .iter()
            .map(|(name, series)| {
                (
                    name.clone(),
                    RealTimeMetric {
                        metric_name: name.clone(),
                        latest: series.latest().map(|s| s.value),
                        statistics: series.statistics().clone(),
                        samples: series.samples().cloned().collect(),
                    },
                )
            })
            .collect();

        let compatibility_matrix: BTreeMap<_, _> = st
            .cross_platform
            .iter()
            .map(|r| (r.test_name.clone(), r.matrix.clone()))
            .collect();

        let pair_scores: Vec<f64> = st
            .cross_platform
            .iter()
            .flat_map(|r| r.matrix.results.values().map(|p| p.compatibility_score))
            .collect();
        let overall_compatibility = (!pair_scores.is_empty())
            .then(|| pair_scores.iter().sum::<f64>() / pair_scores.len() as f64);

        let total_tests = st.verifications.len() + st.cross_platform.len();
        let successful_tests = st.verifications.iter().filter(|r| r.success).count()
            + st.cross_platform.iter().filter(|r| r.success).count();
        let success_rate =
            (total_tests > 0).then(|| successful_tests as f64 / total_tests as f64);

        let alerts_by_severity = st
            .alerts
            .count_by_severity()
            .into_iter()
            .map(|(sev, n)| (sev.to_string(), n))
            .collect();

        let summary = ReportSummary {
            snapshots_recorded: st.snapshots_recorded,
            total_tests,
            successful_tests,
            success_rate,
            regressions_detected: st.regressions_detected,
            anomalies_detected: st.anomalies_detected,
            alerts_by_severity,
            alerts_firing: st.alerts.firing().count(),
            overall_compatibility,
        };

        MonitoringReport {
            session_id: self.id,
            started_at: st.started_at,
            generated_at: Utc::now(),
            real_time_metrics,
            performance_history: st.history.iter().cloned().collect(),
            alerts_triggered: st.alerts.alerts().to_vec(),
            anomalies: st.anomalies.iter().cloned().collect(),
            regressions: st.regressions.iter().cloned().collect(),
            baselines: st.baselines.all().cloned().collect(),
            compatibility_matrix,
            cross_platform_tests: st.cross_platform.clone(),
            provider_verifications: st.verifications.clone(),
            monitoring_config: (*self.config).clone(),
            summary,
        }
    }

    /// Final delivery round and export of the session report.
    #[instrument(skip(self, exporter), fields(session_id = %self.id))]
    pub async fn teardown(&self, exporter: &ReportExporter) -> ExportSummary {
        let dispatch = self.dispatch_pending(Utc::now()).await;
        let report = self.report().await;
        let summary = exporter.export(&report).await;
        info!(
            snapshots = report.summary.snapshots_recorded,
            alerts = report.alerts_triggered.len(),
            delivered = dispatch.delivered,
            written = summary.written.len(),
            failed = summary.failures.len(),
            "monitoring session torn down"
        );
        summary
    }
}
