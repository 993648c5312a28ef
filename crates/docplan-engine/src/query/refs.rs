//! Opaque refs handed out by discovery and accepted by mutation steps.
//!
//! - text matches: `text:<revision>:<json ranges>`, valid for one revision
//! - inline nodes: `inline:<revision>:<json address>`, valid for one revision
//! - blocks and entities: the id itself, valid until the node is deleted

use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::model::{NodeAddress, TextAddress};
use crate::revision::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefStability {
    Stable,
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    Text,
    Node,
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handle {
    #[serde(rename = "ref")]
    pub reference: String,
    pub ref_stability: RefStability,
    pub target_kind: TargetKind,
}

const TEXT_PREFIX: &str = "text:";
const INLINE_PREFIX: &str = "inline:";

impl Handle {
    pub fn text(revision: Revision, ranges: &[TextAddress]) -> Result<Self, DocError> {
        let payload = serde_json::to_string(ranges)
            .map_err(|err| DocError::internal(format!("cannot encode text ref: {err}")))?;
        Ok(Self {
            reference: format!("{TEXT_PREFIX}{revision}:{payload}"),
            ref_stability: RefStability::Ephemeral,
            target_kind: TargetKind::Text,
        })
    }

    pub fn inline(revision: Revision, address: &NodeAddress) -> Result<Self, DocError> {
        let payload = serde_json::to_string(address)
            .map_err(|err| DocError::internal(format!("cannot encode inline ref: {err}")))?;
        Ok(Self {
            reference: format!("{INLINE_PREFIX}{revision}:{payload}"),
            ref_stability: RefStability::Ephemeral,
            target_kind: TargetKind::Node,
        })
    }

    pub fn node(id: impl Into<String>) -> Self {
        Self {
            reference: id.into(),
            ref_stability: RefStability::Stable,
            target_kind: TargetKind::Node,
        }
    }

    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            reference: id.into(),
            ref_stability: RefStability::Stable,
            target_kind: TargetKind::Entity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRef {
    Text {
        revision: String,
        ranges: Vec<TextAddress>,
    },
    Inline {
        revision: String,
        address: NodeAddress,
    },
    Node {
        id: String,
    },
}

impl ParsedRef {
    /// The revision an ephemeral ref was issued at.
    pub fn revision(&self) -> Option<&str> {
        match self {
            ParsedRef::Text { revision, .. } | ParsedRef::Inline { revision, .. } => Some(revision),
            ParsedRef::Node { .. } => None,
        }
    }

    /// Fail with `TARGET_MOVED` when an ephemeral ref predates `current`.
    pub fn ensure_current(&self, current: Revision) -> Result<(), DocError> {
        match self.revision() {
            Some(revision) if revision != current.to_string() => Err(DocError::TargetMoved {
                ref_revision: revision.to_string(),
                current_revision: current.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

pub fn parse_ref(reference: &str) -> Result<ParsedRef, DocError> {
    if reference.is_empty() {
        return Err(DocError::invalid_input("ref must not be empty"));
    }
    if let Some(rest) = reference.strip_prefix(TEXT_PREFIX) {
        let (revision, payload) = split_revision(rest)?;
        let ranges: Vec<TextAddress> = serde_json::from_str(payload)
            .map_err(|err| DocError::invalid_input(format!("malformed text ref: {err}")))?;
        if ranges.is_empty() {
            return Err(DocError::invalid_input("text ref carries no ranges"));
        }
        return Ok(ParsedRef::Text { revision, ranges });
    }
    if let Some(rest) = reference.strip_prefix(INLINE_PREFIX) {
        let (revision, payload) = split_revision(rest)?;
        let address = serde_json::from_str(payload)
            .map_err(|err| DocError::invalid_input(format!("malformed inline ref: {err}")))?;
        return Ok(ParsedRef::Inline { revision, address });
    }
    Ok(ParsedRef::Node {
        id: reference.to_string(),
    })
}

fn split_revision(rest: &str) -> Result<(String, &str), DocError> {
    let (revision, payload) = rest
        .split_once(':')
        .ok_or_else(|| DocError::invalid_input("ref is missing its revision"))?;
    if revision.parse::<Revision>().is_err() {
        return Err(DocError::invalid_input(format!(
            "ref revision {revision:?} is not a number"
        )));
    }
    Ok((revision.to_string(), payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_ref_round_trip() {
        let ranges = vec![TextAddress::new("p:1", 6, 11)];
        let handle = Handle::text(Revision::new(4), &ranges).unwrap();

        assert_eq!(handle.ref_stability, RefStability::Ephemeral);
        assert!(handle.reference.starts_with("text:4:"));
        assert_eq!(
            parse_ref(&handle.reference).unwrap(),
            ParsedRef::Text {
                revision: "4".into(),
                ranges
            }
        );
    }

    #[test]
    fn test_plain_ids_are_node_refs() {
        assert_eq!(
            parse_ref("p12").unwrap(),
            ParsedRef::Node { id: "p12".into() }
        );
        assert_eq!(Handle::node("p12").ref_stability, RefStability::Stable);
    }

    #[test]
    fn test_stale_ephemeral_ref_has_moved() {
        let handle = Handle::text(Revision::new(0), &[TextAddress::new("p1", 0, 1)]).unwrap();
        let parsed = parse_ref(&handle.reference).unwrap();

        assert!(parsed.ensure_current(Revision::new(0)).is_ok());
        let err = parsed.ensure_current(Revision::new(1)).unwrap_err();
        assert_eq!(err.code(), FailureCode::TargetMoved);
    }

    #[test]
    fn test_malformed_refs_are_invalid_input() {
        for bad in ["", "text:abc:[]", "text:1:not-json", "text:1:[]", "inline:2"] {
            assert_eq!(
                parse_ref(bad).unwrap_err().code(),
                FailureCode::InvalidInput,
                "{bad}"
            );
        }
    }
}
