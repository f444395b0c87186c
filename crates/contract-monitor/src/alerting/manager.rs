//! Threshold evaluation and alert lifecycle.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::PerformanceSnapshot;
use crate::regression::Regression;

use super::delivery::{select_channels, AlertChannel, ChannelKind, PendingDelivery};
use super::rules::{AlertPredicate, EscalationRule, SuppressionRule};
use super::types::{Alert, AlertSeverity, AlertStatus, ThresholdConfig};

// ── Configuration ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Consecutive clean evaluations of a metric that resolve its alerts.
    pub resolve_after_clean_evaluations: u32,
    /// Labels attached to every alert.
    pub static_labels: BTreeMap<String, String>,
    pub channels: Vec<AlertChannel>,
    pub escalation_rules: Vec<EscalationRule>,
    pub suppression_rules: Vec<SuppressionRule>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            resolve_after_clean_evaluations: 3,
            static_labels: BTreeMap::from([(
                "service".to_string(),
                "contract-monitor".to_string(),
            )]),
            channels: vec![AlertChannel {
                name: "console".into(),
                kind: ChannelKind::Log,
                severities: vec![AlertSeverity::Warning, AlertSeverity::Critical],
                enabled: true,
                target: String::new(),
            }],
            escalation_rules: vec![EscalationRule {
                name: "critical-firing".into(),
                condition: AlertPredicate::critical_firing(),
                escalate_after_secs: 300,
                escalate_to: vec!["console".into()],
                max_escalations: 3,
            }],
            suppression_rules: Vec::new(),
        }
    }
}

// ── Evaluation result ───────────────────────────────────────────────────

/// What one threshold evaluation changed.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    /// Newly created alerts.
    pub fired: Vec<Alert>,
    /// Crossings folded into an already firing alert.
    pub deduplicated: usize,
    /// Crossings still waiting out their minimum duration.
    pub pending: usize,
    /// Alerts resolved by this evaluation.
    pub resolved: Vec<Alert>,
}

// ── Manager ─────────────────────────────────────────────────────────────

/// Owns every alert of a session and applies thresholds and rules.
#[derive(Clone, Debug)]
pub struct AlertManager {
    thresholds: BTreeMap<String, ThresholdConfig>,
    config: AlertingConfig,
    /// All alerts in creation order, firing and resolved.
    alerts: Vec<Alert>,
    /// Snapshot time at which the current unbroken breach began.
    breach_started: HashMap<String, DateTime<Utc>>,
    clean_streak: HashMap<String, u32>,
}

impl AlertManager {
    pub fn new(thresholds: BTreeMap<String, ThresholdConfig>, config: AlertingConfig) -> Self {
        Self {
            thresholds,
            config,
            alerts: Vec::new(),
            breach_started: HashMap::new(),
            clean_streak: HashMap::new(),
        }
    }

    /// Compare every metric of `snapshot` against its threshold.
    ///
    /// Critical is checked before warning and at most one alert is created
    /// per metric. `regressions` found in the same tick annotate the alerts
    /// raised on their metric.
    pub fn evaluate(
        &mut self,
        snapshot: &PerformanceSnapshot,
        regressions: &[Regression],
    ) -> Evaluation {
        let now = snapshot.timestamp;
        let mut evaluation = Evaluation::default();

        for (metric, value) in snapshot.metrics() {
            let Some(threshold) = self.thresholds.get(&metric).filter(|t| t.enabled) else {
                continue;
            };

            let Some((severity, limit)) = threshold.classify(value) else {
                self.breach_started.remove(&metric);
                let streak = self.clean_streak.entry(metric.clone()).or_insert(0);
                *streak = streak.saturating_add(1);
                if *streak >= self.config.resolve_after_clean_evaluations {
                    evaluation.resolved.extend(self.resolve_metric(&metric, now));
                }
                continue;
            };

            self.clean_streak.insert(metric.clone(), 0);
            let min_duration = threshold.min_duration_ms;
            let started = *self.breach_started.entry(metric.clone()).or_insert(now);
            let breached_ms = now.signed_duration_since(started).num_milliseconds();
            if breached_ms < min_duration as i64 {
                debug!(
                    metric = %metric,
                    breached_ms,
                    min_duration_ms = min_duration,
                    "threshold crossed, waiting out minimum duration"
                );
                evaluation.pending += 1;
                continue;
            }

            if let Some(existing) = self
                .alerts
                .iter_mut()
                .find(|a| a.is_firing() && a.metric_name == metric && a.severity == severity)
            {
                existing.occurrences = existing.occurrences.saturating_add(1);
                existing.last_value = value;
                evaluation.deduplicated += 1;
                continue;
            }

            let alert = self.create_alert(&metric, severity, value, limit, now, regressions);
            evaluation.fired.push(alert.clone());
            self.alerts.push(alert);
        }

        evaluation
    }

    fn create_alert(
        &self,
        metric: &str,
        severity: AlertSeverity,
        value: f64,
        limit: f64,
        now: DateTime<Utc>,
        regressions: &[Regression],
    ) -> Alert {
        let mut alert = Alert::new(metric, severity, value, limit, now);
        for (k, v) in &self.config.static_labels {
            alert.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }

        let unit = self
            .thresholds
            .get(metric)
            .map(|t| (t.operator, t.unit.clone()));
        if let Some((operator, unit)) = unit {
            alert.annotations.insert(
                "summary".into(),
                format!("{metric} {value:.2}{unit} {operator} {severity} threshold {limit:.2}{unit}"),
            );
            alert.annotations.insert("unit".into(), unit);
        }
        if let Some(r) = regressions.iter().find(|r| r.metric_name == metric) {
            alert
                .annotations
                .insert("regression_baseline".into(), format!("{:.2}", r.baseline_value));
            alert
                .annotations
                .insert("regression_ratio".into(), format!("{:.3}", r.ratio));
        }

        if Self::suppress(&mut alert, &self.config.suppression_rules, now) {
            debug!(alert_id = %alert.id, until = ?alert.suppressed_until, "alert suppressed");
        }

        info!(
            alert_id = %alert.id,
            metric = %metric,
            severity = %severity,
            value,
            threshold = limit,
            suppressed = alert.suppressed,
            "alert fired"
        );
        alert
    }

    fn resolve_metric(&mut self, metric: &str, now: DateTime<Utc>) -> Vec<Alert> {
        let mut resolved = Vec::new();
        for alert in self
            .alerts
            .iter_mut()
            .filter(|a| a.is_firing() && a.metric_name == metric)
        {
            alert.resolve(now);
            info!(alert_id = %alert.id, metric = %metric, "alert resolved");
            resolved.push(alert.clone());
        }
        resolved
    }

    /// Apply suppression rules to an alert.
    pub fn suppress(alert: &mut Alert, rules: &[SuppressionRule], now: DateTime<Utc>) -> bool {
        rules
            .iter()
            .fold(false, |applied, rule| rule.apply(alert, now) || applied)
    }

    /// Advance `alert` one escalation level if a rule is due.
    ///
    /// Returns the matching rule. At most one level is taken per call.
    pub fn escalate<'r>(
        alert: &mut Alert,
        rules: &'r [EscalationRule],
        now: DateTime<Utc>,
    ) -> Option<&'r EscalationRule> {
        let rule = rules.iter().find(|r| r.is_due(alert, now))?;
        alert.escalation_count += 1;
        alert.escalated = true;
        info!(
            alert_id = %alert.id,
            metric = %alert.metric_name,
            rule = %rule.name,
            level = alert.escalation_count,
            "alert escalated"
        );
        Some(rule)
    }

    /// Collect everything that should be sent at `now`: first notifications
    /// for new alerts and due escalations. Marks them handed over.
    ///
    /// Suppressed alerts are held back until their window ends.
    pub fn take_pending(&mut self, now: DateTime<Utc>) -> Vec<PendingDelivery> {
        let channels = &self.config.channels;
        let rules = &self.config.escalation_rules;
        let mut pending = Vec::new();

        for alert in self.alerts.iter_mut().filter(|a| a.is_firing()) {
            if alert.suppressed && !alert.is_suppressed_at(now) {
                alert.suppressed = false;
                alert.suppressed_until = None;
            }
            if alert.is_suppressed_at(now) {
                continue;
            }

            if !alert.notified {
                alert.notified = true;
                let targets = select_channels(alert, channels);
                if !targets.is_empty() {
                    pending.push(PendingDelivery {
                        alert: alert.clone(),
                        channels: targets,
                        escalation_level: None,
                    });
                }
            }

            if let Some(rule) = Self::escalate(alert, rules, now) {
                let targets: Vec<AlertChannel> = channels
                    .iter()
                    .filter(|c| c.enabled && rule.escalate_to.contains(&c.name))
                    .cloned()
                    .collect();
                pending.push(PendingDelivery {
                    alert: alert.clone(),
                    channels: targets,
                    escalation_level: Some(alert.escalation_count),
                });
            }
        }
        pending
    }

    /// All alerts in creation order.
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn firing(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| a.is_firing())
    }

    pub fn count_by_severity(&self) -> BTreeMap<AlertSeverity, usize> {
        let mut counts = BTreeMap::from([(AlertSeverity::Warning, 0), (AlertSeverity::Critical, 0)]);
        for alert in &self.alerts {
            *counts.entry(alert.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_by_status(&self, status: AlertStatus) -> usize {
        self.alerts.iter().filter(|a| a.status == status).count()
    }

    pub fn thresholds(&self) -> &BTreeMap<String, ThresholdConfig> {
        &self.thresholds
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::types::ComparisonOperator;
    use crate::model::{ResourceUsage, CONTRACT_VALIDATION_TIME};

    fn manager(threshold: ThresholdConfig, config: AlertingConfig) -> AlertManager {
        AlertManager::new(
            BTreeMap::from([(CONTRACT_VALIDATION_TIME.to_string(), threshold)]),
            config,
        )
    }

    fn latency_threshold() -> ThresholdConfig {
        ThresholdConfig::new(800.0, 1000.0, ComparisonOperator::GreaterThan, "ms")
    }

    fn snap(at: DateTime<Utc>, validation_ms: f64) -> PerformanceSnapshot {
        PerformanceSnapshot::new(at, validation_ms, 100.0, 0.0, ResourceUsage::default())
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn single_critical_alert_for_critical_crossing() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let eval = mgr.evaluate(&snap(Utc::now(), 1200.0), &[]);
        assert_eq!(eval.fired.len(), 1);
        let alert = &eval.fired[0];
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.threshold, 1000.0);
        assert_eq!(alert.value, 1200.0);
        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.labels.get("service").unwrap(), "contract-monitor");
        assert!(alert.annotations.contains_key("summary"));
    }

    #[test]
    fn warning_and_no_alert_below() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let eval = mgr.evaluate(&snap(Utc::now(), 900.0), &[]);
        assert_eq!(eval.fired[0].severity, AlertSeverity::Warning);
        let eval = mgr.evaluate(&snap(Utc::now(), 700.0), &[]);
        assert!(eval.fired.is_empty());
    }

    #[test]
    fn disabled_threshold_is_ignored() {
        let mut t = latency_threshold();
        t.enabled = false;
        let mut mgr = manager(t, AlertingConfig::default());
        assert!(mgr.evaluate(&snap(Utc::now(), 5000.0), &[]).fired.is_empty());
    }

    #[test]
    fn repeated_crossings_are_deduplicated() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 1200.0), &[]);
        let eval = mgr.evaluate(&snap(t0 + secs(1), 1300.0), &[]);
        assert!(eval.fired.is_empty());
        assert_eq!(eval.deduplicated, 1);
        assert_eq!(mgr.alerts().len(), 1);
        assert_eq!(mgr.alerts()[0].occurrences, 2);
        assert_eq!(mgr.alerts()[0].last_value, 1300.0);
        assert_eq!(mgr.alerts()[0].value, 1200.0);
    }

    #[test]
    fn min_duration_delays_firing() {
        let mut t = latency_threshold();
        t.min_duration_ms = 2_000;
        let mut mgr = manager(t, AlertingConfig::default());
        let t0 = Utc::now();
        assert_eq!(mgr.evaluate(&snap(t0, 1200.0), &[]).pending, 1);
        assert_eq!(mgr.evaluate(&snap(t0 + secs(1), 1200.0), &[]).pending, 1);
        let eval = mgr.evaluate(&snap(t0 + secs(2), 1200.0), &[]);
        assert_eq!(eval.fired.len(), 1);
    }

    #[test]
    fn min_duration_resets_when_breach_breaks() {
        let mut t = latency_threshold();
        t.min_duration_ms = 2_000;
        let mut mgr = manager(t, AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 1200.0), &[]);
        mgr.evaluate(&snap(t0 + secs(1), 500.0), &[]);
        let eval = mgr.evaluate(&snap(t0 + secs(2), 1200.0), &[]);
        assert!(eval.fired.is_empty());
        assert_eq!(eval.pending, 1);
    }

    #[test]
    fn resolves_after_clean_evaluations() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 1200.0), &[]);
        assert!(mgr.evaluate(&snap(t0 + secs(1), 500.0), &[]).resolved.is_empty());
        assert!(mgr.evaluate(&snap(t0 + secs(2), 500.0), &[]).resolved.is_empty());
        let eval = mgr.evaluate(&snap(t0 + secs(3), 500.0), &[]);
        assert_eq!(eval.resolved.len(), 1);
        assert_eq!(mgr.alerts()[0].status, AlertStatus::Resolved);
        assert_eq!(mgr.alerts()[0].resolved_at, Some(t0 + secs(3)));

        // a later crossing opens a new alert
        let eval = mgr.evaluate(&snap(t0 + secs(4), 1200.0), &[]);
        assert_eq!(eval.fired.len(), 1);
        assert_eq!(mgr.alerts().len(), 2);
    }

    #[test]
    fn regression_annotations_attached() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let now = Utc::now();
        let regression = Regression {
            metric_name: CONTRACT_VALIDATION_TIME.into(),
            detected_at: now,
            baseline_value: 800.0,
            current_value: 1200.0,
            threshold_value: 960.0,
            ratio: 1.5,
            z_score: Some(8.0),
            significant: true,
        };
        let eval = mgr.evaluate(&snap(now, 1200.0), &[regression]);
        let a = &eval.fired[0];
        assert_eq!(a.annotations.get("regression_baseline").unwrap(), "800.00");
        assert_eq!(a.annotations.get("regression_ratio").unwrap(), "1.500");
    }

    #[test]
    fn suppressed_alert_held_from_delivery() {
        let config = AlertingConfig {
            suppression_rules: vec![SuppressionRule {
                name: "maintenance".into(),
                matchers: BTreeMap::from([("metric".to_string(), CONTRACT_VALIDATION_TIME.to_string())]),
                duration_secs: 60,
            }],
            ..AlertingConfig::default()
        };
        let mut mgr = manager(latency_threshold(), config);
        let t0 = Utc::now();
        let eval = mgr.evaluate(&snap(t0, 1200.0), &[]);
        assert!(eval.fired[0].suppressed);
        assert!(mgr.take_pending(t0 + secs(30)).is_empty());

        let pending = mgr.take_pending(t0 + secs(60));
        assert_eq!(pending.len(), 1);
        assert!(!mgr.alerts()[0].suppressed);
    }

    #[test]
    fn take_pending_notifies_once() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 900.0), &[]);
        let pending = mgr.take_pending(t0);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channels[0].name, "console");
        assert_eq!(pending[0].escalation_level, None);
        assert!(mgr.take_pending(t0 + secs(1)).is_empty());
    }

    #[test]
    fn critical_alert_escalates_up_to_max() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 1200.0), &[]);
        assert_eq!(mgr.take_pending(t0).len(), 1);

        let mut levels = Vec::new();
        for minutes in [5, 10, 15, 20, 25] {
            for p in mgr.take_pending(t0 + chrono::Duration::minutes(minutes)) {
                levels.extend(p.escalation_level);
            }
        }
        assert_eq!(levels, vec![1, 2, 3]);
        assert!(mgr.alerts()[0].escalated);
        assert_eq!(mgr.alerts()[0].escalation_count, 3);
    }

    #[test]
    fn warning_alert_never_escalates() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        let t0 = Utc::now();
        mgr.evaluate(&snap(t0, 900.0), &[]);
        mgr.take_pending(t0);
        assert!(mgr.take_pending(t0 + chrono::Duration::hours(2)).is_empty());
        assert!(!mgr.alerts()[0].escalated);
    }

    #[test]
    fn counts_by_severity() {
        let mut mgr = manager(latency_threshold(), AlertingConfig::default());
        mgr.evaluate(&snap(Utc::now(), 1200.0), &[]);
        let counts = mgr.count_by_severity();
        assert_eq!(counts[&AlertSeverity::Critical], 1);
        assert_eq!(counts[&AlertSeverity::Warning], 0);
        assert_eq!(mgr.count_by_status(AlertStatus::Firing), 1);
    }
}
