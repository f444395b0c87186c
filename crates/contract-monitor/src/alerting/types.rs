use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};

// ── Severity / Status ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert lifecycle. `Resolved` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

// ── Thresholds ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl ComparisonOperator {
    /// Whether `value <op> limit` holds.
    pub fn holds(&self, value: f64, limit: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > limit,
            ComparisonOperator::LessThan => value < limit,
            ComparisonOperator::GreaterOrEqual => value >= limit,
            ComparisonOperator::LessOrEqual => value <= limit,
            ComparisonOperator::Equal => value == limit,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Warning/critical limits for one metric. Read-only at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub warning: f64,
    pub critical: f64,
    pub operator: ComparisonOperator,
    pub unit: String,
    /// How long the limit must be continuously crossed before an alert
    /// fires, measured in snapshot time.
    pub min_duration_ms: u64,
    pub enabled: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warning: 0.0,
            critical: 0.0,
            operator: ComparisonOperator::GreaterThan,
            unit: String::new(),
            min_duration_ms: 0,
            enabled: true,
        }
    }
}

impl ThresholdConfig {
    pub fn new(warning: f64, critical: f64, operator: ComparisonOperator, unit: &str) -> Self {
        Self {
            warning,
            critical,
            operator,
            unit: unit.to_string(),
            ..Self::default()
        }
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    /// The most severe level `value` crosses, critical checked first,
    /// together with the limit it crossed.
    pub fn classify(&self, value: f64) -> Option<(AlertSeverity, f64)> {
        if self.operator.holds(value, self.critical) {
            Some((AlertSeverity::Critical, self.critical))
        } else if self.operator.holds(value, self.warning) {
            Some((AlertSeverity::Warning, self.warning))
        } else {
            None
        }
    }

    /// Warning must be the less extreme limit for ordered operators.
    pub fn validate(&self, metric: &str) -> MonitorResult<()> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err(MonitorError::InvalidConfig {
                field: format!("thresholds.{metric}"),
                detail: "limits must be finite".into(),
            });
        }
        let ordered = match self.operator {
            ComparisonOperator::GreaterThan | ComparisonOperator::GreaterOrEqual => {
                self.warning <= self.critical
            }
            ComparisonOperator::LessThan | ComparisonOperator::LessOrEqual => {
                self.warning >= self.critical
            }
            ComparisonOperator::Equal => true,
        };
        if !ordered {
            return Err(MonitorError::InvalidConfig {
                field: format!("thresholds.{metric}"),
                detail: format!(
                    "warning {} is more extreme than critical {} for operator {}",
                    self.warning, self.critical, self.operator
                ),
            });
        }
        Ok(())
    }
}

// ── Alert ───────────────────────────────────────────────────────────────

/// Label carrying the metric name on every alert.
pub const LABEL_METRIC: &str = "metric";
/// Label carrying the severity on every alert.
pub const LABEL_SEVERITY: &str = "severity";

/// A threshold crossing that fired.
///
/// `value` crossed `threshold` under the metric's operator when the alert
/// was created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub severity: AlertSeverity,
    pub value: f64,
    pub threshold: f64,
    pub status: AlertStatus,
    pub escalated: bool,
    #[serde(default)]
    pub escalation_count: u32,
    pub suppressed: bool,
    #[serde(default)]
    pub suppressed_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Crossings folded into this alert, including the first.
    #[serde(default = "default_occurrences")]
    pub occurrences: u32,
    /// Most recent crossing value.
    pub last_value: f64,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Whether the initial notification has been handed to delivery.
    #[serde(default)]
    pub notified: bool,
}

fn default_occurrences() -> u32 {
    1
}

impl Alert {
    pub fn new(
        metric_name: &str,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_METRIC.to_string(), metric_name.to_string());
        labels.insert(LABEL_SEVERITY.to_string(), severity.to_string());
        Self {
            id: Uuid::new_v4(),
            timestamp,
            metric_name: metric_name.to_string(),
            severity,
            value,
            threshold,
            status: AlertStatus::Firing,
            escalated: false,
            escalation_count: 0,
            suppressed: false,
            suppressed_until: None,
            labels,
            annotations: BTreeMap::new(),
            occurrences: 1,
            last_value: value,
            resolved_at: None,
            notified: false,
        }
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }

    /// Whether delivery is held back at `now`.
    pub fn is_suppressed_at(&self, now: DateTime<Utc>) -> bool {
        self.suppressed && self.suppressed_until.map_or(true, |until| now < until)
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) {
        if self.is_firing() {
            self.status = AlertStatus::Resolved;
            self.resolved_at = Some(at);
        }
    }
}
