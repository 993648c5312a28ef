//! Structured results of mutating operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DocError, FailureCode};
use crate::model::{EntityAddress, TextAddress};
use crate::plan::ChangeMode;
use crate::resolve::AbsoluteRange;
use crate::revision::Revision;

/// A well-formed request that could not take effect. Returned, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptFailure {
    pub code: FailureCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ReceiptFailure {
    pub fn no_op(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::NoOp,
            message: message.into(),
            details: None,
        }
    }
}

impl From<&DocError> for ReceiptFailure {
    fn from(err: &DocError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserted: Vec<EntityAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<EntityAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<EntityAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ReceiptFailure>,
}

impl Receipt {
    pub fn removed(removed: Vec<EntityAddress>) -> Self {
        Self {
            success: true,
            removed,
            ..Self::default()
        }
    }

    pub fn failed(failure: ReceiptFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSpan {
    pub before: Revision,
    pub after: Revision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEffect {
    Changed,
    Noop,
    AssertPassed,
    AssertFailed,
}

/// Where a text edit landed and what it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResolution {
    /// The target as resolved against the pre-plan document.
    pub target: TextAddress,
    /// Absolute range the edit was applied to.
    pub range: AbsoluteRange,
    /// The text that occupied the target before the edit.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepOutcomeData {
    Text { resolutions: Vec<TextResolution> },
    Style { resolutions: Vec<TextResolution> },
    #[serde(rename_all = "camelCase")]
    Assert { expected_count: usize, actual_count: usize },
    Domain { result: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_id: String,
    pub op: String,
    pub effect: StepEffect,
    pub data: StepOutcomeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReceipt {
    pub success: bool,
    pub change_mode: ChangeMode,
    pub revision: RevisionSpan,
    pub steps: Vec<StepOutcome>,
    /// Tracked changes the plan created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserted: Vec<EntityAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ReceiptFailure>,
}

impl PlanReceipt {
    pub fn changed(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.effect == StepEffect::Changed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub code: FailureCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl PreviewFailure {
    pub fn from_error(step_id: Option<&str>, err: &DocError) -> Self {
        let (step_id, err) = match err {
            DocError::Step { step_id, source } => (Some(step_id.as_str()), source.as_ref()),
            other => (step_id, other),
        };
        Self {
            step_id: step_id.map(str::to_string),
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationsPreviewOutput {
    pub evaluated_revision: Revision,
    pub valid: bool,
    pub change_mode: ChangeMode,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PreviewFailure>,
}

/// Result of `write` and `format_apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMutationReceipt {
    pub success: bool,
    pub dry_run: bool,
    pub revision: RevisionSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<TextResolution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserted: Vec<EntityAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ReceiptFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_step_outcome_wire_shape() {
        let outcome = StepOutcome {
            step_id: "s1".into(),
            op: "assert".into(),
            effect: StepEffect::AssertFailed,
            data: StepOutcomeData::Assert {
                expected_count: 1,
                actual_count: 3,
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "stepId": "s1",
                "op": "assert",
                "effect": "assert_failed",
                "data": { "kind": "assert", "expectedCount": 1, "actualCount": 3 }
            })
        );
    }

    #[test]
    fn test_preview_failure_unwraps_step_attribution() {
        let err = DocError::AmbiguousMatch { match_count: 2 }.in_step("s2");
        let failure = PreviewFailure::from_error(None, &err);

        assert_eq!(failure.step_id.as_deref(), Some("s2"));
        assert_eq!(failure.code, FailureCode::AmbiguousMatch);
        assert_eq!(failure.details, Some(json!({ "matchCount": 2 })));
    }

    #[test]
    fn test_no_op_receipt() {
        let receipt = Receipt::failed(ReceiptFailure::no_op("nothing to accept"));
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["failure"]["code"], "NO_OP");
    }
}
