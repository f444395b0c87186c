//! Provider verification fan-out.
//!
//! Every provider is verified concurrently. Each one is bounded by the
//! per-provider limit and the whole run by the global deadline; a provider
//! that misses either gets exactly one critical timeout violation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::error::MonitorResult;
use crate::fanout::{fan_out, unique_names, TaskOutcome};
use crate::violation::{IssueSeverity, Violation, ViolationKind};

/// Limits applied to provider verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Bound on the whole run.
    pub global_deadline_ms: u64,
    /// Bound on a single provider; shorter than the global deadline.
    pub max_verification_time_ms: u64,
    pub max_p95_response_time_ms: f64,
    pub max_error_rate: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            global_deadline_ms: 30_000,
            max_verification_time_ms: 10_000,
            max_p95_response_time_ms: 200.0,
            max_error_rate: 0.01,
        }
    }
}

impl VerificationConfig {
    pub fn global_deadline(&self) -> Duration {
        Duration::from_millis(self.global_deadline_ms)
    }

    pub fn max_verification_time(&self) -> Duration {
        Duration::from_millis(self.max_verification_time_ms)
    }
}

/// What a provider reports after replaying its contract interactions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMeasurement {
    pub p95_response_time_ms: f64,
    pub memory_usage_mb: f64,
    pub rps: f64,
    pub error_rate: f64,
    pub interactions_verified: u32,
}

/// Verifies one provider service against its contracts.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn service_name(&self) -> &str;

    async fn verify(&self) -> MonitorResult<ProviderMeasurement>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub service_name: String,
    pub verification_time_ms: f64,
    /// Absent when the provider failed or timed out.
    pub measurement: Option<ProviderMeasurement>,
    pub success: bool,
    pub violation_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub started_at: DateTime<Utc>,
    pub total_time_ms: f64,
    pub outcomes: Vec<ProviderOutcome>,
    pub violations: Vec<Violation>,
    pub success: bool,
}

impl VerificationReport {
    pub fn outcome(&self, service: &str) -> Option<&ProviderOutcome> {
        self.outcomes.iter().find(|o| o.service_name == service)
    }
}

pub struct VerificationRunner {
    config: VerificationConfig,
}

impl VerificationRunner {
    pub fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(VerificationConfig::default())
    }

    /// Threshold checks for a completed measurement.
    fn check_measurement(&self, service: &str, m: &ProviderMeasurement) -> Vec<Violation> {
        let mut violations = Vec::new();
        if m.p95_response_time_ms > self.config.max_p95_response_time_ms {
            violations.push(
                Violation::new(
                    ViolationKind::ResponseTime,
                    IssueSeverity::High,
                    service,
                    format!(
                        "{service} p95 {:.1}ms exceeds {:.1}ms",
                        m.p95_response_time_ms, self.config.max_p95_response_time_ms
                    ),
                )
                .with_values(m.p95_response_time_ms, self.config.max_p95_response_time_ms),
            );
        }
        if m.error_rate > self.config.max_error_rate {
            violations.push(
                Violation::new(
                    ViolationKind::ErrorRate,
                    IssueSeverity::High,
                    service,
                    format!(
                        "{service} error rate {:.4} exceeds {:.4}",
                        m.error_rate, self.config.max_error_rate
                    ),
                )
                .with_values(m.error_rate, self.config.max_error_rate),
            );
        }
        violations
    }

    /// Verify every provider concurrently and aggregate the results.
    #[instrument(skip(self, clients), fields(providers = clients.len()))]
    pub async fn run(&self, clients: Vec<Arc<dyn ProviderClient>>) -> VerificationReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let per_task = self
            .config
            .max_verification_time()
            .min(self.config.global_deadline());

        let names = unique_names(clients.iter().map(|c| c.service_name()));
        let tasks: Vec<_> = clients
            .iter()
            .zip(names)
            .map(|(client, name)| {
                let client = Arc::clone(client);
                (name, async move { client.verify().await })
            })
            .collect();
        let results = fan_out(tasks, per_task, self.config.global_deadline()).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut violations = Vec::new();

        for (service, result) in results {
            let (outcome_violations, measurement, time_ms) = match result {
                TaskOutcome::Completed { value, elapsed } => (
                    self.check_measurement(&service, &value),
                    Some(value),
                    elapsed.as_secs_f64() * 1000.0,
                ),
                TaskOutcome::Failed { error, elapsed } => {
                    warn!(service = %service, error = %error, "provider verification failed");
                    (
                        vec![Violation::new(
                            ViolationKind::Execution,
                            IssueSeverity::High,
                            &service,
                            error.to_string(),
                        )],
                        None,
                        elapsed.as_secs_f64() * 1000.0,
                    )
                }
                TaskOutcome::TimedOut { limit } => {
                    let limit_ms = limit.as_millis() as u64;
                    warn!(service = %service, limit_ms, "provider verification timed out");
                    (
                        vec![Violation::timeout(&service, limit_ms)],
                        None,
                        limit.as_secs_f64() * 1000.0,
                    )
                }
            };

            outcomes.push(ProviderOutcome {
                service_name: service,
                verification_time_ms: time_ms,
                success: outcome_violations.is_empty(),
                violation_count: outcome_violations.len(),
                measurement,
            });
            violations.extend(outcome_violations);
        }

        let success = violations.is_empty();
        let total_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            providers = outcomes.len(),
            violations = violations.len(),
            total_time_ms,
            success,
            "provider verification complete"
        );

        VerificationReport {
            started_at,
            total_time_ms,
            outcomes,
            violations,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    struct FakeProvider {
        name: String,
        delay: Duration,
        measurement: MonitorResult<ProviderMeasurement>,
    }

    impl FakeProvider {
        fn healthy(name: &str, delay_ms: u64) -> Arc<dyn ProviderClient> {
            Arc::new(Self {
                name: name.into(),
                delay: Duration::from_millis(delay_ms),
                measurement: Ok(ProviderMeasurement {
                    p95_response_time_ms: 120.0,
                    memory_usage_mb: 128.0,
                    rps: 250.0,
                    error_rate: 0.0,
                    interactions_verified: 12,
                }),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        fn service_name(&self) -> &str {
            &self.name
        }

        async fn verify(&self) -> MonitorResult<ProviderMeasurement> {
            tokio::time::sleep(self.delay).await;
            match &self.measurement {
                Ok(m) => Ok(m.clone()),
                Err(e) => Err(MonitorError::Provider {
                    service: self.name.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_providers_pass() {
        let clients = vec![
            FakeProvider::healthy("auth-service", 100),
            FakeProvider::healthy("payment-service", 250),
        ];
        let report = VerificationRunner::with_defaults().run(clients).await;
        assert!(report.success);
        assert_eq!(report.outcomes.len(), 2);
        let auth = report.outcome("auth-service").unwrap();
        assert!(auth.success);
        assert!((auth.verification_time_ms - 100.0).abs() < 1.0);
        assert_eq!(auth.measurement.as_ref().unwrap().interactions_verified, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_breaches_are_high() {
        let slow = Arc::new(FakeProvider {
            name: "messaging-service".into(),
            delay: Duration::from_millis(10),
            measurement: Ok(ProviderMeasurement {
                p95_response_time_ms: 450.0,
                error_rate: 0.05,
                ..ProviderMeasurement::default()
            }),
        });
        let report = VerificationRunner::with_defaults().run(vec![slow]).await;
        assert!(!report.success);
        assert_eq!(report.violations.len(), 2);
        assert!(report
            .violations
            .iter()
            .all(|v| v.severity == IssueSeverity::High));
        assert_eq!(report.outcomes[0].violation_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_error_is_execution_violation() {
        let broken = Arc::new(FakeProvider {
            name: "content-service".into(),
            delay: Duration::from_millis(5),
            measurement: Err(MonitorError::Collection("pact file missing".into())),
        });
        let report = VerificationRunner::with_defaults().run(vec![broken]).await;
        assert!(!report.success);
        assert_eq!(report.violations[0].kind, ViolationKind::Execution);
        assert!(report.outcomes[0].measurement.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn per_provider_limit_is_shorter_than_deadline() {
        let config = VerificationConfig {
            max_verification_time_ms: 1_000,
            ..VerificationConfig::default()
        };
        let clients = vec![
            FakeProvider::healthy("auth-service", 10),
            FakeProvider::healthy("gateway", 5_000),
        ];
        let report = VerificationRunner::new(config).run(clients).await;
        let timeout = &report.violations[0];
        assert_eq!(timeout.kind, ViolationKind::Timeout);
        assert_eq!(timeout.subject, "gateway");
        assert_eq!(timeout.limit, Some(1_000.0));
        // the run did not wait for the global deadline
        assert!(report.total_time_ms < 2_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_service_names_are_all_reported() {
        let config = VerificationConfig {
            max_verification_time_ms: 500,
            ..VerificationConfig::default()
        };
        let clients = vec![
            FakeProvider::healthy("auth", 50),
            FakeProvider::healthy("auth", 900),
        ];
        let report = VerificationRunner::new(config).run(clients).await;
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcome("auth").unwrap().success);
        assert!(!report.outcome("auth#2").unwrap().success);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].subject, "auth#2");
    }
}
