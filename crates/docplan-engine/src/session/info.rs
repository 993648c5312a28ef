//! Document summary for `info`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::host::{Author, CapabilityContext, Host, TrackCommand, TrackMarkType};
use crate::index::{BlockIndex, InlineIndex};
use crate::model::{NodeType, OBJECT_REPLACEMENT, Snapshot};
use crate::plan::ChangeMode;
use crate::resolve::{Unit, segments};
use crate::revision::Revision;
use crate::session::DocumentSession;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCounts {
    pub words: usize,
    /// Characters of flattened text, not counting image placeholders.
    pub characters: usize,
    pub paragraphs: usize,
    pub headings: usize,
    pub tables: usize,
    /// Block and inline images.
    pub images: usize,
    pub list_items: usize,
    /// Distinct comment ids.
    pub comments: usize,
    pub tracked_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
    pub node_id: String,
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    /// Tracked edits can be recorded: every command, mark type and an author.
    pub tracked_mode: bool,
    pub can_accept_reject: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub revision: Revision,
    pub change_mode: ChangeMode,
    pub counts: DocumentCounts,
    pub outline: Vec<OutlineEntry>,
    pub capabilities: CapabilitySummary,
}

pub(crate) fn count(snapshot: &Snapshot, blocks: &BlockIndex, inlines: &InlineIndex) -> DocumentCounts {
    let mut counts = DocumentCounts {
        paragraphs: blocks.count(NodeType::Paragraph),
        headings: blocks.count(NodeType::Heading),
        tables: blocks.count(NodeType::Table),
        list_items: blocks.count(NodeType::ListItem),
        images: blocks.count(NodeType::Image)
            + inlines
                .entries()
                .iter()
                .filter(|entry| entry.node_type == NodeType::Image)
                .count(),
        ..DocumentCounts::default()
    };

    let mut comments = BTreeSet::new();
    for entry in blocks.textblocks() {
        let Some(node) = entry.node(snapshot) else {
            continue;
        };
        let text = node.flattened_text();
        counts.characters += text.chars().filter(|c| *c != OBJECT_REPLACEMENT).count();
        counts.words += text
            .split(|c: char| c.is_whitespace() || c == OBJECT_REPLACEMENT)
            .filter(|word| !word.is_empty())
            .count();
        for seg in segments(node, entry.pos) {
            if let Unit::Text(run) = seg.unit {
                comments.extend(run.marks.comments.iter().cloned());
            }
        }
    }
    counts.comments = comments.len();
    counts
}

pub(crate) fn outline(snapshot: &Snapshot, blocks: &BlockIndex) -> Vec<OutlineEntry> {
    blocks
        .entries()
        .iter()
        .filter(|entry| entry.node_type == NodeType::Heading)
        .filter_map(|entry| {
            let node = entry.node(snapshot)?;
            Some(OutlineEntry {
                node_id: entry.id.clone(),
                level: node.heading_level().unwrap_or(1),
                text: node.flattened_text(),
            })
        })
        .collect()
}

fn capabilities(host: &dyn CapabilityContext, author: Option<Author>) -> CapabilitySummary {
    let commands = [
        TrackCommand::InsertTracked,
        TrackCommand::DeleteTracked,
        TrackCommand::FormatTracked,
    ];
    let mark_types = [
        TrackMarkType::TrackInsert,
        TrackMarkType::TrackDelete,
        TrackMarkType::TrackFormat,
    ];
    CapabilitySummary {
        tracked_mode: commands.iter().all(|c| host.has_command(*c))
            && mark_types.iter().all(|m| host.has_mark_type(*m))
            && author.is_some(),
        can_accept_reject: host.has_command(TrackCommand::AcceptChange)
            && host.has_command(TrackCommand::RejectChange),
        author,
    }
}

impl<H: Host> DocumentSession<H> {
    /// Counts, heading outline, revision and capabilities.
    pub fn info(&mut self) -> DocumentInfo {
        let revision = self.revision();
        let snapshot = self.host.snapshot();
        let blocks = self.index.block_index(&snapshot);
        let inlines = self.index.inline_index(&snapshot);

        let mut counts = count(&snapshot, &blocks, &inlines);
        counts.tracked_changes = self.tracked.get(&snapshot, &blocks).len();

        DocumentInfo {
            revision,
            change_mode: self.options.change_mode,
            counts,
            outline: outline(&snapshot, &blocks),
            capabilities: capabilities(&self.host, self.author()),
        }
    }
}
