//! Failure codes and the error type every engine operation returns.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::host::HostError;

/// Stable, wire-visible classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    InvalidInput,
    InvalidTarget,
    TargetNotFound,
    MatchNotFound,
    AmbiguousMatch,
    CrossBlockMatch,
    SpanFragmented,
    TargetMoved,
    RevisionMismatch,
    CapabilityUnavailable,
    StyleConflict,
    PreconditionFailed,
    PlanConflictOverlap,
    InvalidStepCombination,
    NoOp,
    InternalError,
}

impl FailureCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::InvalidInput => "INVALID_INPUT",
            FailureCode::InvalidTarget => "INVALID_TARGET",
            FailureCode::TargetNotFound => "TARGET_NOT_FOUND",
            FailureCode::MatchNotFound => "MATCH_NOT_FOUND",
            FailureCode::AmbiguousMatch => "AMBIGUOUS_MATCH",
            FailureCode::CrossBlockMatch => "CROSS_BLOCK_MATCH",
            FailureCode::SpanFragmented => "SPAN_FRAGMENTED",
            FailureCode::TargetMoved => "TARGET_MOVED",
            FailureCode::RevisionMismatch => "REVISION_MISMATCH",
            FailureCode::CapabilityUnavailable => "CAPABILITY_UNAVAILABLE",
            FailureCode::StyleConflict => "STYLE_CONFLICT",
            FailureCode::PreconditionFailed => "PRECONDITION_FAILED",
            FailureCode::PlanConflictOverlap => "PLAN_CONFLICT_OVERLAP",
            FailureCode::InvalidStepCombination => "INVALID_STEP_COMBINATION",
            FailureCode::NoOp => "NO_OP",
            FailureCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of tracked mode the host is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityReason {
    MissingCommand,
    MissingMarkType,
    MissingAuthor,
}

const REVISION_REMEDIATION: &str =
    "Re-run the discovery query to obtain fresh refs, then retry with the current revision.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid target: {message}")]
    InvalidTarget { message: String },

    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("No match found for {selector}")]
    MatchNotFound { selector: String },

    #[error("Expected exactly one match, found {match_count}")]
    AmbiguousMatch { match_count: usize },

    #[error("Match spans {block_count} blocks and cannot be edited as one unit")]
    CrossBlockMatch { block_count: usize },

    #[error("Span fragmented: {message}")]
    SpanFragmented { message: String },

    #[error("Ref was issued at revision {ref_revision}, document is at {current_revision}")]
    TargetMoved {
        ref_revision: String,
        current_revision: String,
    },

    #[error("Expected revision {expected}, document is at {current}")]
    RevisionMismatch { expected: String, current: String },

    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable {
        reason: CapabilityReason,
        message: String,
    },

    #[error("Style conflict: {message}")]
    StyleConflict { message: String },

    #[error("Precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("Step {step_id} overlaps step {other_step_id}")]
    PlanConflictOverlap {
        step_id: String,
        other_step_id: String,
    },

    #[error("Steps {step_id} and {other_step_id} cannot be combined: {message}")]
    InvalidStepCombination {
        step_id: String,
        other_step_id: String,
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Step {step_id}: {source}")]
    Step {
        step_id: String,
        #[source]
        source: Box<DocError>,
    },
}

impl DocError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        DocError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_target(message: impl Into<String>) -> Self {
        DocError::InvalidTarget {
            message: message.into(),
        }
    }

    pub fn target_not_found(target: impl Into<String>) -> Self {
        DocError::TargetNotFound {
            target: target.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DocError::Internal {
            message: message.into(),
        }
    }

    /// Attribute the failure to a plan step. Already-attributed errors are left alone.
    pub fn in_step(self, step_id: &str) -> Self {
        match self {
            DocError::Step { .. } => self,
            other => DocError::Step {
                step_id: step_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn code(&self) -> FailureCode {
        match self {
            DocError::InvalidInput { .. } => FailureCode::InvalidInput,
            DocError::InvalidTarget { .. } => FailureCode::InvalidTarget,
            DocError::TargetNotFound { .. } => FailureCode::TargetNotFound,
            DocError::MatchNotFound { .. } => FailureCode::MatchNotFound,
            DocError::AmbiguousMatch { .. } => FailureCode::AmbiguousMatch,
            DocError::CrossBlockMatch { .. } => FailureCode::CrossBlockMatch,
            DocError::SpanFragmented { .. } => FailureCode::SpanFragmented,
            DocError::TargetMoved { .. } => FailureCode::TargetMoved,
            DocError::RevisionMismatch { .. } => FailureCode::RevisionMismatch,
            DocError::CapabilityUnavailable { .. } => FailureCode::CapabilityUnavailable,
            DocError::StyleConflict { .. } => FailureCode::StyleConflict,
            DocError::PreconditionFailed { .. } => FailureCode::PreconditionFailed,
            DocError::PlanConflictOverlap { .. } => FailureCode::PlanConflictOverlap,
            DocError::InvalidStepCombination { .. } => FailureCode::InvalidStepCombination,
            DocError::Internal { .. } => FailureCode::InternalError,
            DocError::Step { source, .. } => source.code(),
        }
    }

    /// Structured payload for the failure, when the code carries one.
    pub fn details(&self) -> Option<Value> {
        match self {
            DocError::AmbiguousMatch { match_count } => Some(json!({ "matchCount": match_count })),
            DocError::CrossBlockMatch { block_count } => Some(json!({ "blockCount": block_count })),
            DocError::TargetNotFound { target } => Some(json!({ "target": target })),
            DocError::TargetMoved {
                ref_revision,
                current_revision,
            } => Some(json!({
                "refRevision": ref_revision,
                "currentRevision": current_revision,
            })),
            DocError::RevisionMismatch { expected, current } => Some(json!({
                "expectedRevision": expected,
                "currentRevision": current,
                "refStability": "ephemeral",
                "remediation": REVISION_REMEDIATION,
            })),
            DocError::CapabilityUnavailable { reason, .. } => Some(json!({ "reason": reason })),
            DocError::PlanConflictOverlap {
                step_id,
                other_step_id,
            }
            | DocError::InvalidStepCombination {
                step_id,
                other_step_id,
                ..
            } => Some(json!({ "stepId": step_id, "conflictingStepId": other_step_id })),
            DocError::Step { step_id, source } => {
                let mut details = source.details().unwrap_or_else(|| json!({}));
                if let Value::Object(map) = &mut details {
                    map.entry("stepId")
                        .or_insert_with(|| Value::String(step_id.clone()));
                }
                Some(details)
            }
            _ => None,
        }
    }
}

impl From<HostError> for DocError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::SpanFragmented { .. } => DocError::SpanFragmented {
                message: err.to_string(),
            },
            other => DocError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(DocError::invalid_input("x"), "INVALID_INPUT")]
    #[case(DocError::AmbiguousMatch { match_count: 2 }, "AMBIGUOUS_MATCH")]
    #[case(DocError::internal("boom"), "INTERNAL_ERROR")]
    #[case(
        DocError::PlanConflictOverlap { step_id: "a".into(), other_step_id: "b".into() },
        "PLAN_CONFLICT_OVERLAP"
    )]
    fn test_codes_serialize_screaming_snake(#[case] error: DocError, #[case] expected: &str) {
        assert_eq!(error.code().as_str(), expected);
        assert_eq!(
            serde_json::to_value(error.code()).unwrap(),
            Value::String(expected.to_string())
        );
    }

    #[test]
    fn test_revision_mismatch_details_carry_remediation() {
        let error = DocError::RevisionMismatch {
            expected: "0".into(),
            current: "1".into(),
        };

        let details = error.details().unwrap();

        assert_eq!(details["expectedRevision"], "0");
        assert_eq!(details["currentRevision"], "1");
        assert_eq!(details["refStability"], "ephemeral");
        assert!(details["remediation"].as_str().unwrap().contains("discovery"));
    }

    #[test]
    fn test_step_wrapper_keeps_code_and_adds_step_id() {
        let error = DocError::AmbiguousMatch { match_count: 3 }
            .in_step("s2")
            .in_step("ignored");

        assert_eq!(error.code(), FailureCode::AmbiguousMatch);
        assert_eq!(
            error.details(),
            Some(json!({ "matchCount": 3, "stepId": "s2" }))
        );
        assert_eq!(error.to_string(), "Step s2: Expected exactly one match, found 3");
    }

    #[test]
    fn test_host_errors_map_to_failure_codes() {
        let fragmented: DocError = HostError::SpanFragmented { from: 3, to: 9 }.into();
        assert_eq!(fragmented.code(), FailureCode::SpanFragmented);

        let internal: DocError = HostError::NoTransaction.into();
        assert_eq!(internal.code(), FailureCode::InternalError);
    }
}
