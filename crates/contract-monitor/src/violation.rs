//! Shared violation vocabulary for verification and compatibility runs.

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    /// High and critical findings fail the run they belong to.
    pub fn is_blocking(&self) -> bool {
        *self >= IssueSeverity::High
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Low => write!(f, "low"),
            IssueSeverity::Medium => write!(f, "medium"),
            IssueSeverity::High => write!(f, "high"),
            IssueSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Timeout,
    ResponseTime,
    ErrorRate,
    Compatibility,
    CheckTime,
    ResponseTimeVariance,
    Execution,
}

/// A target a service or platform failed to meet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: IssueSeverity,
    /// Service or platform (or platform pair) the violation is about.
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub measured: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        severity: IssueSeverity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            subject: subject.into(),
            message: message.into(),
            measured: None,
            limit: None,
        }
    }

    pub fn with_values(mut self, measured: f64, limit: f64) -> Self {
        self.measured = Some(measured);
        self.limit = Some(limit);
        self
    }

    /// Critical timeout for a task that did not finish within `limit_ms`.
    pub fn timeout(subject: impl Into<String>, limit_ms: u64) -> Self {
        let subject = subject.into();
        let message = MonitorError::Timeout {
            operation: subject.clone(),
            limit_ms,
        }
        .to_string();
        Self::new(ViolationKind::Timeout, IssueSeverity::Critical, subject, message)
            .with_limit(limit_ms as f64)
    }

    fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_severities() {
        assert!(!IssueSeverity::Low.is_blocking());
        assert!(!IssueSeverity::Medium.is_blocking());
        assert!(IssueSeverity::High.is_blocking());
        assert!(IssueSeverity::Critical.is_blocking());
    }

    #[test]
    fn timeout_violation() {
        let v = Violation::timeout("payment-service", 30_000);
        assert_eq!(v.kind, ViolationKind::Timeout);
        assert_eq!(v.severity, IssueSeverity::Critical);
        assert_eq!(v.subject, "payment-service");
        assert!(v.message.contains("30000ms"));
        assert_eq!(v.limit, Some(30_000.0));
        assert_eq!(v.measured, None);
    }

    #[test]
    fn violation_kind_serialization() {
        let json = serde_json::to_string(&ViolationKind::ResponseTimeVariance).unwrap();
        assert_eq!(json, "\"response_time_variance\"");
    }
}
