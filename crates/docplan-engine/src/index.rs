//! Per-snapshot lookup tables from node identity to tree position.
//!
//! `IndexCache` holds the indexes for the most recent snapshot generation it was
//! asked about. Asking again for the same generation returns the same `Rc`;
//! asking for a different one rebuilds. The inline index is only built the first
//! time it is needed for a generation.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::model::{
    BlockNode, Inline, InlineAnchor, NodeAddress, NodeKind, NodeType, Position, Snapshot,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub id: String,
    pub node_type: NodeType,
    pub pos: usize,
    pub path: Vec<usize>,
    pub parent: Option<String>,
    pub is_textblock: bool,
}

impl BlockEntry {
    pub fn address(&self) -> NodeAddress {
        NodeAddress::block(self.node_type, self.id.clone())
    }

    /// True when `other` sits strictly inside this block.
    pub fn contains(&self, other: &BlockEntry) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }

    pub fn node<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a BlockNode> {
        snapshot.block_at_path(&self.path)
    }
}

#[derive(Debug)]
pub struct BlockIndex {
    generation: u64,
    entries: Vec<BlockEntry>,
    by_id: HashMap<String, usize>,
}

impl BlockIndex {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut entries = Vec::new();
        let mut by_id = HashMap::new();
        let mut parents: Vec<String> = Vec::new();

        snapshot.walk_blocks(|block, pos, path| {
            parents.truncate(path.len() - 1);
            by_id.entry(block.id.clone()).or_insert(entries.len());
            entries.push(BlockEntry {
                id: block.id.clone(),
                node_type: block.node_type(),
                pos,
                path: path.to_vec(),
                parent: parents.last().cloned(),
                is_textblock: block.is_textblock(),
            });
            parents.push(block.id.clone());
        });

        Self {
            generation: snapshot.generation(),
            entries,
            by_id,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All blocks in document order.
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&BlockEntry> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    pub fn textblocks(&self) -> impl Iterator<Item = &BlockEntry> {
        self.entries.iter().filter(|entry| entry.is_textblock)
    }

    pub fn count(&self, node_type: NodeType) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.node_type == node_type)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineEntry {
    pub node_type: NodeType,
    pub id: Option<String>,
    pub block_id: String,
    pub pos: usize,
    pub start: usize,
    pub end: usize,
}

impl InlineEntry {
    pub fn address(&self) -> NodeAddress {
        NodeAddress::Inline {
            node_type: self.node_type,
            anchor: InlineAnchor {
                start: Position {
                    block_id: self.block_id.clone(),
                    offset: self.start,
                },
                end: Position {
                    block_id: self.block_id.clone(),
                    offset: self.end,
                },
            },
        }
    }
}

#[derive(Debug)]
pub struct InlineIndex {
    generation: u64,
    entries: Vec<InlineEntry>,
}

impl InlineIndex {
    pub fn build(snapshot: &Snapshot, blocks: &BlockIndex) -> Self {
        let mut entries = Vec::new();
        for entry in blocks.textblocks() {
            if let Some(node) = entry.node(snapshot) {
                let mut offset = 0;
                collect_inlines(node.inlines(), entry.pos + 1, &mut offset, &entry.id, &mut entries);
            }
        }
        Self {
            generation: snapshot.generation(),
            entries,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[InlineEntry] {
        &self.entries
    }

    /// The inline node carrying `id`, such as an inline image.
    pub fn by_id(&self, id: &str) -> Option<&InlineEntry> {
        self.entries.iter().find(|entry| entry.id.as_deref() == Some(id))
    }

    /// Find the inline node a caller addressed by type and anchor.
    pub fn find(&self, node_type: NodeType, anchor: &InlineAnchor) -> Option<&InlineEntry> {
        self.entries.iter().find(|entry| {
            entry.node_type == node_type
                && entry.block_id == anchor.start.block_id
                && entry.start == anchor.start.offset
                && entry.end == anchor.end.offset
        })
    }
}

fn collect_inlines(
    children: &[Inline],
    start: usize,
    offset: &mut usize,
    block_id: &str,
    out: &mut Vec<InlineEntry>,
) {
    let mut pos = start;
    for child in children {
        match child {
            Inline::Text(run) => *offset += run.len(),
            Inline::Atom(atom) => {
                out.push(InlineEntry {
                    node_type: atom.atom_type.node_type(),
                    id: atom.id.clone(),
                    block_id: block_id.to_string(),
                    pos,
                    start: *offset,
                    end: *offset + 1,
                });
                *offset += 1;
            }
            Inline::Wrapper(wrapper) => {
                let index = out.len();
                out.push(InlineEntry {
                    node_type: wrapper.wrapper_type.node_type(),
                    id: wrapper.id.clone(),
                    block_id: block_id.to_string(),
                    pos,
                    start: *offset,
                    end: *offset,
                });
                collect_inlines(&wrapper.children, pos + 1, offset, block_id, out);
                out[index].end = *offset;
            }
        }
        pos += child.node_size();
    }
}

/// Whether a node type can appear as a block, inline, or both.
pub fn contexts(node_type: NodeType) -> &'static [NodeKind] {
    match node_type {
        NodeType::Image | NodeType::Sdt => &[NodeKind::Block, NodeKind::Inline],
        NodeType::Link | NodeType::Bookmark | NodeType::Tab | NodeType::LineBreak => {
            &[NodeKind::Inline]
        }
        _ => &[NodeKind::Block],
    }
}

/// Session-owned cache slots for the block and inline indexes.
#[derive(Debug, Default)]
pub struct IndexCache {
    block: Option<Rc<BlockIndex>>,
    inline: Option<Rc<InlineIndex>>,
    builds: usize,
}

impl IndexCache {
    pub fn block_index(&mut self, snapshot: &Snapshot) -> Rc<BlockIndex> {
        if let Some(index) = &self.block
            && index.generation() == snapshot.generation()
        {
            return Rc::clone(index);
        }
        debug!("building block index for generation {}", snapshot.generation());
        let index = Rc::new(BlockIndex::build(snapshot));
        self.block = Some(Rc::clone(&index));
        self.inline = None;
        self.builds += 1;
        index
    }

    pub fn inline_index(&mut self, snapshot: &Snapshot) -> Rc<InlineIndex> {
        let blocks = self.block_index(snapshot);
        if let Some(index) = &self.inline
            && index.generation() == snapshot.generation()
        {
            return Rc::clone(index);
        }
        debug!("building inline index for generation {}", snapshot.generation());
        let index = Rc::new(InlineIndex::build(snapshot, &blocks));
        self.inline = Some(Rc::clone(&index));
        self.builds += 1;
        index
    }

    pub fn invalidate(&mut self) {
        self.block = None;
        self.inline = None;
    }

    /// How many indexes have been built over this cache's lifetime.
    pub fn builds(&self) -> usize {
        self.builds
    }
}
