/*!
 * # Mutation Plans
 *
 * A plan is an ordered list of steps applied as one unit:
 *
 * 1. **Validate**: shape checks, capability checks for tracked mode
 * 2. **Compile**: every step's `where` is resolved against the pre-plan snapshot,
 *    style policies are evaluated, and steps are checked pairwise for overlapping
 *    or contradictory targets
 * 3. **Execute**: inside one host transaction, each step's targets are remapped
 *    through the edits earlier steps made to the same block and applied
 * 4. **Commit or roll back**: any failure restores the pre-plan document exactly
 *
 * Preview runs the first two phases and predicts each step's effect without
 * opening a transaction.
 */

pub mod compile;
pub mod contracts;
pub mod domain;
pub mod execute;
pub mod receipt;
pub mod step;
pub mod style_policy;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DocError;

pub use compile::{CompiledOp, CompiledStep, ResolvedTarget};
pub use contracts::{OperationContract, operation_contracts};
pub use domain::{DomainContext, DomainEffect, DomainOp, DomainRegistry, DomainTarget};
pub use execute::{ExecutionOutcome, PlanEnv, apply_plan, check_plan, preview_plan};
pub use receipt::{
    MutationsPreviewOutput, PlanReceipt, PreviewFailure, Receipt, ReceiptFailure, RevisionSpan,
    StepEffect, StepOutcome, StepOutcomeData, TextMutationReceipt, TextResolution,
};
pub use step::{
    AssertArgs, InsertArgs, InsertPosition, MutationStep, Replacement, RewriteArgs,
    StepOp, StepWhere, StyleApplyArgs,
};
pub use style_policy::{InlineMode, InlineStylePolicy, NonUniformStrategy, StylePolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeMode {
    #[default]
    Direct,
    Tracked,
}

impl From<docplan_config::ChangeModeSetting> for ChangeMode {
    fn from(setting: docplan_config::ChangeModeSetting) -> Self {
        match setting {
            docplan_config::ChangeModeSetting::Direct => ChangeMode::Direct,
            docplan_config::ChangeModeSetting::Tracked => ChangeMode::Tracked,
        }
    }
}

fn default_atomic() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<String>,
    #[serde(default = "default_atomic")]
    pub atomic: bool,
    /// Falls back to the session default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_mode: Option<ChangeMode>,
    pub steps: Vec<MutationStep>,
}

impl Plan {
    pub fn new(steps: Vec<MutationStep>) -> Self {
        Self {
            expected_revision: None,
            atomic: true,
            change_mode: None,
            steps,
        }
    }

    pub fn expecting(mut self, revision: impl Into<String>) -> Self {
        self.expected_revision = Some(revision.into());
        self
    }

    pub fn with_change_mode(mut self, mode: ChangeMode) -> Self {
        self.change_mode = Some(mode);
        self
    }

    pub fn from_json(value: Value) -> Result<Self, DocError> {
        serde_json::from_value(value).map_err(|err| DocError::invalid_input(err.to_string()))
    }

    /// Shape checks that need no document.
    pub fn validate(&self) -> Result<(), DocError> {
        if !self.atomic {
            return Err(DocError::invalid_input("only atomic plans are supported"));
        }
        if self.steps.is_empty() {
            return Err(DocError::invalid_input("a plan needs at least one step"));
        }
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.id.is_empty() {
                return Err(DocError::invalid_input("step ids must not be empty"));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DocError::invalid_input(format!(
                    "duplicate step id {}",
                    step.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_plan_from_json_defaults() {
        let plan = Plan::from_json(json!({
            "expectedRevision": "0",
            "steps": [{
                "id": "s1",
                "op": "text.rewrite",
                "where": { "by": "select", "select": { "type": "text", "pattern": "world" } },
                "args": { "replacement": { "text": "Earth" } }
            }]
        }))
        .unwrap();

        assert!(plan.atomic);
        assert_eq!(plan.change_mode, None);
        assert_eq!(plan.expected_revision.as_deref(), Some("0"));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_non_atomic_plans_are_rejected() {
        let plan = Plan::from_json(json!({ "atomic": false, "steps": [] })).unwrap();
        assert_eq!(plan.validate().unwrap_err().code(), FailureCode::InvalidInput);
    }

    #[test]
    fn test_duplicate_step_ids_are_rejected() {
        let step = json!({
            "id": "same", "op": "text.delete", "where": { "by": "ref", "ref": "p1" }
        });
        let plan = Plan::from_json(json!({ "steps": [step.clone(), step] })).unwrap();
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate step id same"));
    }

    #[test]
    fn test_change_mode_from_config() {
        assert_eq!(
            ChangeMode::from(docplan_config::ChangeModeSetting::Tracked),
            ChangeMode::Tracked
        );
    }
}
