use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::violation::{IssueSeverity, Violation};

/// Per-platform performance and compatibility targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformTargets {
    pub max_compatibility_check_time_ms: u64,
    /// Lowest acceptable overall score for any pair involving this platform.
    pub min_compatibility_score: f64,
    /// Largest acceptable relative latency difference to any peer.
    pub max_response_time_variance: f64,
}

impl Default for PlatformTargets {
    fn default() -> Self {
        Self {
            max_compatibility_check_time_ms: 2_000,
            min_compatibility_score: 0.9,
            max_response_time_variance: 0.25,
        }
    }
}

/// What a platform exposes for one contract: its schema and an observed
/// response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractCapture {
    pub platform: String,
    /// Contract schema as a JSON document.
    pub schema: serde_json::Value,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub latency_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    TypeMismatch,
    HeaderMismatch,
    StatusMismatch,
    BodyMismatch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    /// Field path or header name the issue is about.
    pub location: String,
    pub description: String,
    pub suggestion: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaCompatibility {
    /// Shared fields over all fields.
    pub field_compatibility: f64,
    /// Shared fields with equal JSON type over shared fields.
    pub type_compatibility: f64,
    pub score: f64,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub type_mismatches: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseCompatibility {
    pub status_match: bool,
    /// Header names (lowercase) whose values differ or that only one side sends.
    pub differing_headers: Vec<String>,
    /// Whether both bodies have the same shape.
    pub body_match: bool,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub latency_a_ms: f64,
    pub latency_b_ms: f64,
    /// `|a − b| / max(a, b)`.
    pub variance: f64,
    pub score: f64,
}

/// Comparison of one unordered platform pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub platform_a: String,
    pub platform_b: String,
    /// Weighted overall score in `[0, 1]`.
    pub compatibility_score: f64,
    pub schema_compatibility: SchemaCompatibility,
    pub response_compatibility: ResponseCompatibility,
    pub performance_comparison: PerformanceComparison,
    pub issues: Vec<CompatibilityIssue>,
}

/// Key of an unordered platform pair; independent of argument order.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_vs_{b}")
    } else {
        format!("{b}_vs_{a}")
    }
}

/// Pairwise results of one run, keyed by [`pair_key`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    pub results: BTreeMap<String, CompatibilityResult>,
    /// Arithmetic mean of the pair scores; 1.0 when there are no pairs.
    pub overall_score: f64,
}

impl CompatibilityMatrix {
    pub fn from_results(results: Vec<CompatibilityResult>) -> Self {
        let overall_score = if results.is_empty() {
            1.0
        } else {
            results.iter().map(|r| r.compatibility_score).sum::<f64>() / results.len() as f64
        };
        Self {
            results: results
                .into_iter()
                .map(|r| (pair_key(&r.platform_a, &r.platform_b), r))
                .collect(),
            overall_score,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&CompatibilityResult> {
        self.results.get(&pair_key(a, b))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Capture outcome of one platform in a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub platform: String,
    pub capture_time_ms: f64,
    pub completed: bool,
}

/// Result of a cross-platform compatibility run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossPlatformReport {
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub captures: Vec<CaptureOutcome>,
    pub matrix: CompatibilityMatrix,
    pub violations: Vec<Violation>,
    pub success: bool,
}

impl CrossPlatformReport {
    pub fn platforms_count(&self) -> usize {
        self.captures.len()
    }
}
