//! Escalation and suppression rules with typed predicates.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Alert, AlertSeverity, AlertStatus};

/// Condition evaluated against an alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AlertPredicate {
    SeverityEquals(AlertSeverity),
    StatusEquals(AlertStatus),
    MetricEquals(String),
    LabelEquals { key: String, value: String },
    /// All inner predicates hold. An empty list always holds.
    All(Vec<AlertPredicate>),
}

impl AlertPredicate {
    /// `severity == critical AND status == firing`.
    pub fn critical_firing() -> Self {
        AlertPredicate::All(vec![
            AlertPredicate::SeverityEquals(AlertSeverity::Critical),
            AlertPredicate::StatusEquals(AlertStatus::Firing),
        ])
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        match self {
            AlertPredicate::SeverityEquals(s) => alert.severity == *s,
            AlertPredicate::StatusEquals(s) => alert.status == *s,
            AlertPredicate::MetricEquals(m) => alert.metric_name == *m,
            AlertPredicate::LabelEquals { key, value } => {
                alert.labels.get(key).is_some_and(|v| v == value)
            }
            AlertPredicate::All(inner) => inner.iter().all(|p| p.matches(alert)),
        }
    }
}

// ── Escalation ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub name: String,
    pub condition: AlertPredicate,
    /// Time between escalation levels, measured from alert creation.
    pub escalate_after_secs: u64,
    /// Channel names that receive the escalated alert.
    pub escalate_to: Vec<String>,
    pub max_escalations: u32,
}

impl EscalationRule {
    pub fn escalate_after(&self) -> Duration {
        Duration::from_secs(self.escalate_after_secs)
    }

    /// Whether `alert` should move to its next escalation level at `now`.
    ///
    /// Level `n` (1-based) becomes due `n × escalate_after` after creation.
    pub fn is_due(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        if alert.escalation_count >= self.max_escalations || !self.condition.matches(alert) {
            return false;
        }
        let elapsed = now.signed_duration_since(alert.timestamp).num_seconds();
        let due_after = self
            .escalate_after_secs
            .saturating_mul(u64::from(alert.escalation_count) + 1);
        elapsed >= 0 && elapsed as u64 >= due_after
    }
}

// ── Suppression ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub name: String,
    /// Label equalities that must all hold.
    pub matchers: BTreeMap<String, String>,
    pub duration_secs: u64,
}

impl SuppressionRule {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.matchers
            .iter()
            .all(|(k, v)| alert.labels.get(k).is_some_and(|actual| actual == v))
    }

    /// Mark `alert` suppressed until `now + duration` if every matcher holds.
    /// Returns whether the rule applied.
    pub fn apply(&self, alert: &mut Alert, now: DateTime<Utc>) -> bool {
        if !self.matches(alert) {
            return false;
        }
        let until = now + chrono::Duration::seconds(self.duration_secs as i64);
        alert.suppressed = true;
        alert.suppressed_until = Some(match alert.suppressed_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        true
    }
}
