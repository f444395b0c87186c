//! Weighted compatibility scoring of two platform captures.
//!
//! ```text
//!   schema   = (field + type) / 2
//!   response = 1 − 0.1·status − 0.1·header − 0.2·body
//!   overall  = 0.4·schema + 0.4·response + 0.2·performance
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::violation::IssueSeverity;

use super::types::{
    CompatibilityIssue, CompatibilityResult, ContractCapture, IssueKind, PerformanceComparison,
    ResponseCompatibility, SchemaCompatibility,
};

pub const SCHEMA_WEIGHT: f64 = 0.4;
pub const RESPONSE_WEIGHT: f64 = 0.4;
pub const PERFORMANCE_WEIGHT: f64 = 0.2;

const STATUS_PENALTY: f64 = 0.1;
const HEADER_PENALTY: f64 = 0.1;
const BODY_PENALTY: f64 = 0.2;

/// Flatten a JSON document into `dotted.path -> json type` leaves.
///
/// Objects recurse; arrays are leaves typed `array`, and when their first
/// element is an object its fields are flattened under `path[]`.
pub fn flatten_schema(value: &Value) -> BTreeMap<String, &'static str> {
    let mut out = BTreeMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, path: String, out: &mut BTreeMap<String, &'static str>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten_into(child, child_path, out);
            }
        }
        Value::Array(items) => {
            if !path.is_empty() {
                out.insert(path.clone(), "array");
            }
            if let Some(first @ Value::Object(_)) = items.first() {
                flatten_into(first, format!("{path}[]"), out);
            }
        }
        other => {
            if !path.is_empty() {
                out.insert(path, json_type(other));
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stateless pairwise scorer.
pub struct CompatibilityScorer;

impl CompatibilityScorer {
    /// Score two captures. Platform order only affects field naming in the
    /// result, never the scores.
    pub fn compare(a: &ContractCapture, b: &ContractCapture) -> CompatibilityResult {
        let schema = Self::schema_compatibility(&a.schema, &b.schema);
        let response = Self::response_compatibility(a, b);
        let performance = Self::performance_comparison(a.latency_ms, b.latency_ms);
        let compatibility_score = Self::overall(schema.score, response.score, performance.score);
        let issues = Self::identify_issues(a, b, &schema, &response);

        debug!(
            platform_a = %a.platform,
            platform_b = %b.platform,
            score = compatibility_score,
            issues = issues.len(),
            "platform pair compared"
        );

        CompatibilityResult {
            platform_a: a.platform.clone(),
            platform_b: b.platform.clone(),
            compatibility_score,
            schema_compatibility: schema,
            response_compatibility: response,
            performance_comparison: performance,
            issues,
        }
    }

    pub fn overall(schema: f64, response: f64, performance: f64) -> f64 {
        (SCHEMA_WEIGHT * schema + RESPONSE_WEIGHT * response + PERFORMANCE_WEIGHT * performance)
            .clamp(0.0, 1.0)
    }

    pub fn schema_compatibility(a: &Value, b: &Value) -> SchemaCompatibility {
        let fa = flatten_schema(a);
        let fb = flatten_schema(b);
        let keys_a: BTreeSet<&String> = fa.keys().collect();
        let keys_b: BTreeSet<&String> = fb.keys().collect();

        let common: Vec<&String> = keys_a.intersection(&keys_b).copied().collect();
        let union = keys_a.union(&keys_b).count();

        let field_compatibility = if union == 0 {
            1.0
        } else {
            common.len() as f64 / union as f64
        };

        let type_mismatches: Vec<String> = common
            .iter()
            .filter(|k| fa.get(**k) != fb.get(**k))
            .map(|k| (*k).clone())
            .collect();
        let type_compatibility = if common.is_empty() {
            if union == 0 {
                1.0
            } else {
                0.0
            }
        } else {
            (common.len() - type_mismatches.len()) as f64 / common.len() as f64
        };

        SchemaCompatibility {
            field_compatibility,
            type_compatibility,
            score: (field_compatibility + type_compatibility) / 2.0,
            only_in_a: keys_a.difference(&keys_b).map(|k| (*k).clone()).collect(),
            only_in_b: keys_b.difference(&keys_a).map(|k| (*k).clone()).collect(),
            type_mismatches,
        }
    }

    pub fn response_compatibility(a: &ContractCapture, b: &ContractCapture) -> ResponseCompatibility {
        let status_match = a.status == b.status;

        let ha = lowercase_headers(&a.headers);
        let hb = lowercase_headers(&b.headers);
        let names: BTreeSet<&String> = ha.keys().chain(hb.keys()).collect();
        let differing_headers: Vec<String> = names
            .into_iter()
            .filter(|name| ha.get(*name) != hb.get(*name))
            .cloned()
            .collect();

        let body_match = flatten_schema(&a.body) == flatten_schema(&b.body);

        let mut score = 1.0;
        if !status_match {
            score -= STATUS_PENALTY;
        }
        if !differing_headers.is_empty() {
            score -= HEADER_PENALTY;
        }
        if !body_match {
            score -= BODY_PENALTY;
        }

        ResponseCompatibility {
            status_match,
            differing_headers,
            body_match,
            score,
        }
    }

    /// `1 − min(1, |a − b| / max(a, b))`; identical or both-zero latencies
    /// score 1.
    pub fn performance_comparison(latency_a_ms: f64, latency_b_ms: f64) -> PerformanceComparison {
        let max = latency_a_ms.max(latency_b_ms);
        let variance = if max <= 0.0 {
            0.0
        } else {
            ((latency_a_ms - latency_b_ms).abs() / max).min(1.0)
        };
        PerformanceComparison {
            latency_a_ms,
            latency_b_ms,
            variance,
            score: 1.0 - variance,
        }
    }

    /// One medium issue per incompatible field and one low issue per
    /// differing header, plus status and body findings.
    pub fn identify_issues(
        a: &ContractCapture,
        b: &ContractCapture,
        schema: &SchemaCompatibility,
        response: &ResponseCompatibility,
    ) -> Vec<CompatibilityIssue> {
        let mut issues = Vec::new();

        for (path, present, missing) in schema
            .only_in_a
            .iter()
            .map(|p| (p, &a.platform, &b.platform))
            .chain(schema.only_in_b.iter().map(|p| (p, &b.platform, &a.platform)))
        {
            issues.push(CompatibilityIssue {
                kind: IssueKind::MissingField,
                severity: IssueSeverity::Medium,
                location: path.clone(),
                description: format!("field `{path}` is defined on {present} but not on {missing}"),
                suggestion: format!("Add `{path}` to the {missing} contract or remove it from {present}"),
            });
        }

        let fa = flatten_schema(&a.schema);
        let fb = flatten_schema(&b.schema);
        for path in &schema.type_mismatches {
            let ta = fa.get(path).copied().unwrap_or("unknown");
            let tb = fb.get(path).copied().unwrap_or("unknown");
            issues.push(CompatibilityIssue {
                kind: IssueKind::TypeMismatch,
                severity: IssueSeverity::Medium,
                location: path.clone(),
                description: format!(
                    "field `{path}` is {ta} on {} but {tb} on {}",
                    a.platform, b.platform
                ),
                suggestion: format!("Use a single type for `{path}` on every platform"),
            });
        }

        for header in &response.differing_headers {
            issues.push(CompatibilityIssue {
                kind: IssueKind::HeaderMismatch,
                severity: IssueSeverity::Low,
                location: header.clone(),
                description: format!(
                    "header `{header}` differs between {} and {}",
                    a.platform, b.platform
                ),
                suggestion: format!("Return `{header}` with the same value on every platform"),
            });
        }

        if !response.status_match {
            issues.push(CompatibilityIssue {
                kind: IssueKind::StatusMismatch,
                severity: IssueSeverity::High,
                location: "status".into(),
                description: format!(
                    "{} returned {} but {} returned {}",
                    a.platform, a.status, b.platform, b.status
                ),
                suggestion: "Align status codes for the same contract interaction".into(),
            });
        }
        if !response.body_match {
            issues.push(CompatibilityIssue {
                kind: IssueKind::BodyMismatch,
                severity: IssueSeverity::High,
                location: "body".into(),
                description: format!(
                    "response body shape differs between {} and {}",
                    a.platform, b.platform
                ),
                suggestion: "Serialize responses from a shared contract definition".into(),
            });
        }

        issues
    }
}

fn lowercase_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}
