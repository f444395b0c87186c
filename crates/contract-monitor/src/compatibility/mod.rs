//! Cross-platform contract compatibility.
//!
//! ```text
//!   PlatformProbe (per platform) ──► ContractCapture
//!                                        │
//!                  every unordered pair  ▼
//!   CompatibilityScorer::compare ──► CompatibilityResult ──► CompatibilityMatrix
//! ```

pub mod runner;
pub mod scorer;
pub mod types;

pub use runner::{CompatibilityRunner, PlatformProbe};
pub use scorer::{flatten_schema, CompatibilityScorer};
pub use types::{
    pair_key, CaptureOutcome, CompatibilityIssue, CompatibilityMatrix, CompatibilityResult,
    ContractCapture, CrossPlatformReport, IssueKind, PerformanceComparison, PlatformTargets,
    ResponseCompatibility, SchemaCompatibility,
};
