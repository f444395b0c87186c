//! Parallel platform capture followed by pairwise scoring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::error::MonitorResult;
use crate::fanout::{fan_out, unique_names, TaskOutcome};
use crate::violation::{IssueSeverity, Violation, ViolationKind};

use super::scorer::CompatibilityScorer;
use super::types::{
    pair_key, CaptureOutcome, CompatibilityMatrix, ContractCapture, CrossPlatformReport,
    PlatformTargets,
};

/// Produces a platform's contract capture.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    fn platform(&self) -> &str;

    async fn capture(&self) -> MonitorResult<ContractCapture>;
}

/// Runs a cross-platform compatibility check.
pub struct CompatibilityRunner {
    targets: BTreeMap<String, PlatformTargets>,
    global_deadline: Duration,
}

impl CompatibilityRunner {
    pub fn new(targets: BTreeMap<String, PlatformTargets>, global_deadline: Duration) -> Self {
        Self {
            targets,
            global_deadline,
        }
    }

    fn targets_for(&self, platform: &str) -> PlatformTargets {
        self.targets.get(platform).cloned().unwrap_or_default()
    }

    /// Capture every platform concurrently, then compare every unordered
    /// pair of completed captures.
    #[instrument(skip(self, probes), fields(platforms = probes.len()))]
    pub async fn run(
        &self,
        test_name: &str,
        probes: Vec<Arc<dyn PlatformProbe>>,
    ) -> CrossPlatformReport {
        let started_at = Utc::now();
        let start = Instant::now();

        // Each platform is bounded by the slowest check time any target
        // allows; individual targets are enforced as violations afterwards.
        let per_task = probes
            .iter()
            .map(|p| self.targets_for(p.platform()).max_compatibility_check_time_ms)
            .max()
            .map(Duration::from_millis)
            .unwrap_or(self.global_deadline)
            .min(self.global_deadline);

        let names = unique_names(probes.iter().map(|p| p.platform()));
        let tasks: Vec<_> = probes
            .iter()
            .zip(names)
            .map(|(probe, name)| {
                let probe = Arc::clone(probe);
                (name, async move { probe.capture().await })
            })
            .collect();
        let outcomes = fan_out(tasks, per_task, self.global_deadline).await;

        let mut violations = Vec::new();
        let mut captures = Vec::new();
        let mut completed: Vec<(ContractCapture, PlatformTargets)> = Vec::new();

        // Repeated platform names are reported as `name#n` but keep the
        // targets of the platform they came from.
        for ((platform, outcome), probe) in outcomes.into_iter().zip(&probes) {
            let targets = self.targets_for(probe.platform());
            match outcome {
                TaskOutcome::Completed { mut value, elapsed } => {
                    value.platform = platform.clone();
                    let ms = elapsed.as_secs_f64() * 1000.0;
                    if ms > targets.max_compatibility_check_time_ms as f64 {
                        violations.push(
                            Violation::new(
                                ViolationKind::CheckTime,
                                IssueSeverity::High,
                                &platform,
                                format!(
                                    "{platform} capture took {ms:.1}ms, target {}ms",
                                    targets.max_compatibility_check_time_ms
                                ),
                            )
                            .with_values(ms, targets.max_compatibility_check_time_ms as f64),
                        );
                    }
                    captures.push(CaptureOutcome {
                        platform: platform.clone(),
                        capture_time_ms: ms,
                        completed: true,
                    });
                    completed.push((value, targets));
                }
                TaskOutcome::Failed { error, elapsed } => {
                    warn!(platform = %platform, error = %error, "platform capture failed");
                    violations.push(Violation::new(
                        ViolationKind::Execution,
                        IssueSeverity::High,
                        &platform,
                        error.to_string(),
                    ));
                    captures.push(CaptureOutcome {
                        platform: platform.clone(),
                        capture_time_ms: elapsed.as_secs_f64() * 1000.0,
                        completed: false,
                    });
                }
                TaskOutcome::TimedOut { limit } => {
                    warn!(platform = %platform, limit_ms = limit.as_millis() as u64, "platform capture timed out");
                    violations.push(Violation::timeout(&platform, limit.as_millis() as u64));
                    captures.push(CaptureOutcome {
                        platform: platform.clone(),
                        capture_time_ms: limit.as_secs_f64() * 1000.0,
                        completed: false,
                    });
                }
            }
        }

        let mut results = Vec::new();
        for (i, (a, a_targets)) in completed.iter().enumerate() {
            for (b, b_targets) in &completed[i + 1..] {
                let result = CompatibilityScorer::compare(a, b);
                let key = pair_key(&a.platform, &b.platform);

                let min_score = a_targets
                    .min_compatibility_score
                    .max(b_targets.min_compatibility_score);
                if result.compatibility_score < min_score {
                    violations.push(
                        Violation::new(
                            ViolationKind::Compatibility,
                            IssueSeverity::High,
                            &key,
                            format!(
                                "compatibility {:.3} below target {:.3}",
                                result.compatibility_score, min_score
                            ),
                        )
                        .with_values(result.compatibility_score, min_score),
                    );
                }

                let max_variance = a_targets
                    .max_response_time_variance
                    .min(b_targets.max_response_time_variance);
                let variance = result.performance_comparison.variance;
                if variance > max_variance {
                    violations.push(
                        Violation::new(
                            ViolationKind::ResponseTimeVariance,
                            IssueSeverity::Medium,
                            &key,
                            format!("response time variance {variance:.3} above {max_variance:.3}"),
                        )
                        .with_values(variance, max_variance),
                    );
                }
                results.push(result);
            }
        }

        let matrix = CompatibilityMatrix::from_results(results);
        let success = !violations.iter().any(|v| v.severity.is_blocking());
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            test = %test_name,
            pairs = matrix.len(),
            overall = matrix.overall_score,
            violations = violations.len(),
            success,
            "compatibility run complete"
        );

        CrossPlatformReport {
            test_name: test_name.to_string(),
            started_at,
            duration_ms,
            captures,
            matrix,
            violations,
            success,
        }
    }
}
