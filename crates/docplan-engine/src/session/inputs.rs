//! Request and response shapes of the session operations.

use serde::{Deserialize, Serialize};

use crate::discovery::PageInfo;
use crate::model::{InlinePatch, NodeAddress};
use crate::plan::{ChangeMode, InsertPosition, StepWhere};
use crate::query::{Cardinality, Handle, MatchCandidate, MatchStyleSummary, Selector};
use crate::revision::Revision;
use crate::tracked::TrackedChangeType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindInput {
    pub select: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<NodeAddress>,
    #[serde(default)]
    pub include_nodes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl FindInput {
    pub fn new(select: Selector) -> Self {
        Self {
            select,
            within: None,
            include_nodes: false,
            limit: None,
            offset: None,
        }
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatchInput {
    pub select: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<NodeAddress>,
    #[serde(default)]
    pub require: Cardinality,
    #[serde(default)]
    pub include_nodes: bool,
    #[serde(default)]
    pub include_style: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl QueryMatchInput {
    pub fn new(select: Selector, require: Cardinality) -> Self {
        Self {
            select,
            within: None,
            require,
            include_nodes: false,
            include_style: false,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatchItem {
    pub id: String,
    pub handle: Handle,
    #[serde(flatten)]
    pub candidate: MatchCandidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<MatchStyleSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatchOutput {
    pub evaluated_revision: Revision,
    /// Match count before pagination.
    pub total: usize,
    pub matches: Vec<QueryMatchItem>,
    pub page: PageInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOp {
    Insert,
    Replace,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub target: StepWhere,
    pub op: WriteOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Where `insert` puts the text relative to the target.
    #[serde(default)]
    pub position: InsertPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_mode: Option<ChangeMode>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<String>,
}

impl WriteRequest {
    pub fn replace(target: StepWhere, text: impl Into<String>) -> Self {
        Self::new(target, WriteOp::Replace, Some(text.into()))
    }

    pub fn insert(target: StepWhere, text: impl Into<String>) -> Self {
        Self::new(target, WriteOp::Insert, Some(text.into()))
    }

    pub fn delete(target: StepWhere) -> Self {
        Self::new(target, WriteOp::Delete, None)
    }

    fn new(target: StepWhere, op: WriteOp, text: Option<String>) -> Self {
        Self {
            target,
            op,
            text,
            position: InsertPosition::default(),
            change_mode: None,
            dry_run: false,
            expected_revision: None,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn tracked(mut self) -> Self {
        self.change_mode = Some(ChangeMode::Tracked);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
    pub target: StepWhere,
    pub inline: InlinePatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_mode: Option<ChangeMode>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<String>,
}

impl FormatRequest {
    pub fn new(target: StepWhere, inline: InlinePatch) -> Self {
        Self {
            target,
            inline,
            change_mode: None,
            dry_run: false,
            expected_revision: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackChangesListInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub change_type: Option<TrackedChangeType>,
}
