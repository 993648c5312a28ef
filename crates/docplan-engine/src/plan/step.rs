//! Wire shape of mutation steps.
//!
//! On the wire a step is `{ id, op, where, args }` with `args` depending on `op`.
//! Deserialization turns that into a `MutationStep` whose `StepOp` carries typed
//! arguments for the built-in operations. Any other op name becomes a
//! `StepOp::Domain` and is looked up in the session's registry at compile time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DocError;
use crate::model::{InlinePatch, NodeAddress, TextAddress};
use crate::plan::style_policy::StylePolicy;
use crate::query::{Cardinality, Selector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum StepWhere {
    Select {
        select: Selector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<NodeAddress>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        require: Option<Cardinality>,
    },
    Ref {
        #[serde(rename = "ref")]
        reference: String,
    },
    Target {
        target: TextAddress,
    },
}

impl StepWhere {
    pub fn select(select: Selector, require: Cardinality) -> Self {
        StepWhere::Select {
            select,
            within: None,
            require: Some(require),
        }
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        StepWhere::Ref {
            reference: reference.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Replacement {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RewriteArgs {
    pub replacement: Replacement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StylePolicy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertPosition {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InsertArgs {
    pub text: String,
    #[serde(default)]
    pub position: InsertPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StyleApplyArgs {
    pub inline: InlinePatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssertArgs {
    pub expect_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOp {
    TextRewrite(RewriteArgs),
    TextInsert(InsertArgs),
    TextDelete,
    StyleApply(StyleApplyArgs),
    Assert(AssertArgs),
    Domain { name: String, args: Value },
}

pub const TEXT_REWRITE: &str = "text.rewrite";
pub const TEXT_INSERT: &str = "text.insert";
pub const TEXT_DELETE: &str = "text.delete";
pub const STYLE_APPLY: &str = "style.apply";
pub const ASSERT: &str = "assert";

pub const BUILTIN_OPS: [&str; 5] = [TEXT_REWRITE, TEXT_INSERT, TEXT_DELETE, STYLE_APPLY, ASSERT];

impl StepOp {
    pub fn name(&self) -> &str {
        match self {
            StepOp::TextRewrite(_) => TEXT_REWRITE,
            StepOp::TextInsert(_) => TEXT_INSERT,
            StepOp::TextDelete => TEXT_DELETE,
            StepOp::StyleApply(_) => STYLE_APPLY,
            StepOp::Assert(_) => ASSERT,
            StepOp::Domain { name, .. } => name,
        }
    }

    pub fn args(&self) -> Value {
        let encoded = match self {
            StepOp::TextRewrite(args) => serde_json::to_value(args),
            StepOp::TextInsert(args) => serde_json::to_value(args),
            StepOp::TextDelete => Ok(Value::Object(Default::default())),
            StepOp::StyleApply(args) => serde_json::to_value(args),
            StepOp::Assert(args) => serde_json::to_value(args),
            StepOp::Domain { args, .. } => Ok(args.clone()),
        };
        encoded.unwrap_or(Value::Null)
    }

    /// Whether the op changes characters, as opposed to formatting or nothing.
    pub fn changes_text(&self) -> bool {
        matches!(
            self,
            StepOp::TextRewrite(_) | StepOp::TextInsert(_) | StepOp::TextDelete
        )
    }

    pub fn mutates(&self) -> bool {
        !matches!(self, StepOp::Assert(_))
    }

    fn parse(name: &str, args: Value) -> Result<Self, serde_json::Error> {
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        Ok(match name {
            TEXT_REWRITE => StepOp::TextRewrite(serde_json::from_value(args)?),
            TEXT_INSERT => StepOp::TextInsert(serde_json::from_value(args)?),
            TEXT_DELETE => StepOp::TextDelete,
            STYLE_APPLY => StepOp::StyleApply(serde_json::from_value(args)?),
            ASSERT => StepOp::Assert(serde_json::from_value(args)?),
            other => StepOp::Domain {
                name: other.to_string(),
                args,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct MutationStep {
    pub id: String,
    pub at: StepWhere,
    pub op: StepOp,
}

impl MutationStep {
    pub fn new(id: impl Into<String>, at: StepWhere, op: StepOp) -> Self {
        Self {
            id: id.into(),
            at,
            op,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStep {
    id: String,
    op: String,
    #[serde(rename = "where")]
    at: StepWhere,
    #[serde(default)]
    args: Value,
}

impl TryFrom<RawStep> for MutationStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let op = StepOp::parse(&raw.op, raw.args)
            .map_err(|err| format!("step {}: invalid args for {}: {err}", raw.id, raw.op))?;
        Ok(MutationStep {
            id: raw.id,
            at: raw.at,
            op,
        })
    }
}

impl From<MutationStep> for RawStep {
    fn from(step: MutationStep) -> Self {
        RawStep {
            id: step.id,
            op: step.op.name().to_string(),
            args: step.op.args(),
            at: step.at,
        }
    }
}

/// Parse a step from JSON, reporting shape errors as `INVALID_INPUT`.
pub fn parse_step(value: Value) -> Result<MutationStep, DocError> {
    serde_json::from_value(value).map_err(|err| DocError::invalid_input(err.to_string()))
}
