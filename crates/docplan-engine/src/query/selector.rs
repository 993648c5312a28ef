use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::index::contexts;
use crate::model::{NodeKind, NodeType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Selector {
    Text(TextSelector),
    Node(NodeSelector),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextMode {
    #[default]
    Contains,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelector {
    pub pattern: String,
    #[serde(default)]
    pub mode: TextMode,
    /// Falls back to the session's matching default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
}

impl Selector {
    pub fn text(pattern: impl Into<String>) -> Self {
        Selector::Text(TextSelector {
            pattern: pattern.into(),
            mode: TextMode::Contains,
            case_sensitive: None,
        })
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Selector::Text(TextSelector {
            pattern: pattern.into(),
            mode: TextMode::Regex,
            case_sensitive: None,
        })
    }

    pub fn node(node_type: NodeType) -> Self {
        Selector::Node(NodeSelector {
            node_type: Some(node_type),
            kind: None,
        })
    }

    /// Reject selectors that can never match.
    pub fn validate(&self) -> Result<(), DocError> {
        match self {
            Selector::Text(text) if text.pattern.is_empty() => {
                Err(DocError::invalid_input("text selector pattern must not be empty"))
            }
            Selector::Node(NodeSelector {
                node_type: Some(node_type),
                kind: Some(kind),
            }) if !contexts(*node_type).contains(kind) => Err(DocError::invalid_input(format!(
                "{node_type} nodes never appear in {kind:?} context"
            ))),
            _ => Ok(()),
        }
    }

    /// Short human-readable form used in failure messages.
    pub fn describe(&self) -> String {
        match self {
            Selector::Text(text) => format!("text {:?}", text.pattern),
            Selector::Node(node) => match (node.node_type, node.kind) {
                (Some(node_type), _) => format!("{node_type} nodes"),
                (None, Some(kind)) => format!("{kind:?} nodes"),
                (None, None) => "any node".to_string(),
            },
        }
    }
}
