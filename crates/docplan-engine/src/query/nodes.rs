//! Read-only node descriptions for `getNode` and `getNodeById`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::index::{BlockEntry, IndexCache, InlineEntry};
use crate::model::{Inline, NodeAddress, NodeKind, NodeType, Snapshot, TextRange};
use crate::resolve::text_in_range;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub address: NodeAddress,
    pub node_type: NodeType,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    pub child_count: usize,
}

pub fn describe_block(snapshot: &Snapshot, entry: &BlockEntry) -> Result<NodeInfo, DocError> {
    let node = entry
        .node(snapshot)
        .ok_or_else(|| DocError::internal(format!("index entry {} has no node", entry.id)))?;
    Ok(NodeInfo {
        address: entry.address(),
        node_type: entry.node_type,
        kind: NodeKind::Block,
        id: Some(entry.id.clone()),
        text: node.flattened_text(),
        attrs: node.attrs.clone(),
        level: node.heading_level(),
        child_count: if node.is_textblock() {
            node.inlines().len()
        } else {
            node.children().len()
        },
    })
}

pub fn describe_inline(
    snapshot: &Snapshot,
    block: &BlockEntry,
    entry: &InlineEntry,
) -> Result<NodeInfo, DocError> {
    let node = block
        .node(snapshot)
        .ok_or_else(|| DocError::internal(format!("index entry {} has no node", block.id)))?;
    let text = text_in_range(node, TextRange::new(entry.start, entry.end)).unwrap_or_default();
    let inline = inline_at(node.inlines(), block.pos + 1, entry.pos);
    let (attrs, child_count) = match inline {
        Some(Inline::Atom(atom)) => (atom.attrs.clone(), 0),
        Some(Inline::Wrapper(wrapper)) => (wrapper.attrs.clone(), wrapper.children.len()),
        _ => (BTreeMap::new(), 0),
    };
    Ok(NodeInfo {
        address: entry.address(),
        node_type: entry.node_type,
        kind: NodeKind::Inline,
        id: entry.id.clone(),
        text,
        attrs,
        level: None,
        child_count,
    })
}

/// The inline node that opens at absolute position `target`.
fn inline_at(children: &[Inline], start: usize, target: usize) -> Option<&Inline> {
    let mut pos = start;
    for child in children {
        if pos == target && !matches!(child, Inline::Text(_)) {
            return Some(child);
        }
        let end = pos + child.node_size();
        if let Inline::Wrapper(wrapper) = child
            && target > pos
            && target < end
        {
            return inline_at(&wrapper.children, pos + 1, target);
        }
        pos = end;
    }
    None
}

pub fn get_node(
    snapshot: &Snapshot,
    cache: &mut IndexCache,
    address: &NodeAddress,
) -> Result<NodeInfo, DocError> {
    let blocks = cache.block_index(snapshot);
    match address {
        NodeAddress::Block { node_type, node_id } => {
            let entry = blocks
                .get(node_id)
                .filter(|entry| entry.node_type == *node_type)
                .ok_or_else(|| DocError::target_not_found(format!("{node_type} {node_id}")))?;
            describe_block(snapshot, entry)
        }
        NodeAddress::Inline { node_type, anchor } => {
            if anchor.start.block_id != anchor.end.block_id {
                return Err(DocError::invalid_target(
                    "inline anchor must start and end in the same block",
                ));
            }
            let block = blocks
                .get(&anchor.start.block_id)
                .ok_or_else(|| DocError::target_not_found(anchor.start.block_id.clone()))?;
            let inlines = cache.inline_index(snapshot);
            let entry = inlines.find(*node_type, anchor).ok_or_else(|| {
                DocError::target_not_found(format!(
                    "{node_type} at {}:{}..{}",
                    anchor.start.block_id, anchor.start.offset, anchor.end.offset
                ))
            })?;
            describe_inline(snapshot, block, entry)
        }
    }
}

/// Look a node up by id, blocks first, then identified inline nodes.
pub fn get_node_by_id(
    snapshot: &Snapshot,
    cache: &mut IndexCache,
    id: &str,
    node_type: Option<NodeType>,
) -> Result<NodeInfo, DocError> {
    let blocks = cache.block_index(snapshot);
    if let Some(entry) = blocks.get(id)
        && node_type.is_none_or(|wanted| wanted == entry.node_type)
    {
        return describe_block(snapshot, entry);
    }
    let inlines = cache.inline_index(snapshot);
    let entry = inlines
        .entries()
        .iter()
        .find(|entry| {
            entry.id.as_deref() == Some(id) && node_type.is_none_or(|wanted| wanted == entry.node_type)
        })
        .ok_or_else(|| DocError::target_not_found(id.to_string()))?;
    let block = blocks
        .get(&entry.block_id)
        .ok_or_else(|| DocError::internal(format!("inline {id} lost its block")))?;
    describe_inline(snapshot, block, entry)
}
