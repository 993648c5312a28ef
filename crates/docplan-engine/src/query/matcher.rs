//! Selector evaluation over one snapshot.
//!
//! Text selectors run against a corpus made of every in-scope textblock's
//! flattened text joined by `\n`, so a pattern may run across a block boundary.
//! Such a match is reported with one text range per block it touches.
//! Node selectors filter the block and inline indexes.

use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::index::{BlockEntry, IndexCache, contexts};
use crate::model::{
    BLOCK_SEPARATOR, NodeAddress, NodeKind, NodeType, Snapshot, TextAddress, TextRange,
};
use crate::query::nodes::{NodeInfo, describe_block, describe_inline};
use crate::query::selector::{NodeSelector, Selector, TextMode, TextSelector};

/// Defaults applied when a selector leaves them open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    pub case_sensitive: bool,
    pub regex_size_limit: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            regex_size_limit: 1 << 20,
        }
    }
}

impl From<&docplan_config::MatchingConfig> for MatchSettings {
    fn from(config: &docplan_config::MatchingConfig) -> Self {
        Self {
            case_sensitive: config.case_sensitive,
            regex_size_limit: config.regex_size_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    /// The containing block for text matches, the node itself for node matches.
    pub address: NodeAddress,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_ranges: Vec<TextAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeInfo>,
}

impl MatchCandidate {
    pub fn is_text(&self) -> bool {
        !self.text_ranges.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    pub select: Option<Selector>,
    pub within: Option<NodeAddress>,
    pub include_nodes: bool,
}

impl MatchQuery {
    pub fn new(select: Selector) -> Self {
        Self {
            select: Some(select),
            ..Self::default()
        }
    }

    pub fn within(mut self, address: NodeAddress) -> Self {
        self.within = Some(address);
        self
    }

    pub fn include_nodes(mut self, include: bool) -> Self {
        self.include_nodes = include;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet {
    /// Every match in document order.
    pub matches: Vec<MatchCandidate>,
    pub diagnostics: Vec<String>,
}

impl MatchSet {
    pub fn total(&self) -> usize {
        self.matches.len()
    }
}

/// The blocks a query may look at.
struct Scope<'a> {
    blocks: Vec<&'a BlockEntry>,
    /// Set when scoping to an inline node: its block and anchor range.
    anchor: Option<(String, TextRange)>,
}

impl Scope<'_> {
    fn admits(&self, block_id: &str, range: TextRange) -> bool {
        match &self.anchor {
            Some((anchor_block, anchor)) => {
                anchor_block == block_id && anchor.start <= range.start && range.end <= anchor.end
            }
            None => self.blocks.iter().any(|entry| entry.id == block_id),
        }
    }
}

pub fn find_matches(
    snapshot: &Snapshot,
    cache: &mut IndexCache,
    query: &MatchQuery,
    settings: &MatchSettings,
) -> Result<MatchSet, DocError> {
    let select = query
        .select
        .as_ref()
        .ok_or_else(|| DocError::invalid_input("a selector is required"))?;
    select.validate()?;

    let blocks = cache.block_index(snapshot);
    let scope = match &query.within {
        None => Scope {
            blocks: blocks.entries().iter().collect(),
            anchor: None,
        },
        Some(NodeAddress::Block { node_id, .. }) => {
            let root = blocks
                .get(node_id)
                .ok_or_else(|| DocError::target_not_found(node_id.clone()))?;
            Scope {
                blocks: blocks
                    .entries()
                    .iter()
                    .filter(|entry| entry.id == root.id || root.contains(entry))
                    .collect(),
                anchor: None,
            }
        }
        Some(NodeAddress::Inline { anchor, .. }) => {
            let root = blocks
                .get(&anchor.start.block_id)
                .ok_or_else(|| DocError::target_not_found(anchor.start.block_id.clone()))?;
            Scope {
                blocks: vec![root],
                anchor: Some((
                    root.id.clone(),
                    TextRange::new(anchor.start.offset, anchor.end.offset),
                )),
            }
        }
    };

    let mut set = match select {
        Selector::Text(text) => match_text(snapshot, &scope, text, settings)?,
        Selector::Node(node) => match_nodes(snapshot, cache, &scope, node)?,
    };

    if query.include_nodes {
        for candidate in &mut set.matches {
            if candidate.node.is_none() {
                let entry = blocks.get(candidate.address.block_id());
                if let Some(entry) = entry {
                    candidate.node = Some(describe_block(snapshot, entry)?);
                }
            }
        }
    }

    debug!(
        "{} matched {} times in generation {}",
        select.describe(),
        set.total(),
        snapshot.generation()
    );
    Ok(set)
}

pub(crate) fn compile_pattern(
    selector: &TextSelector,
    settings: &MatchSettings,
) -> Result<Regex, DocError> {
    let source = match selector.mode {
        TextMode::Contains => regex::escape(&selector.pattern),
        TextMode::Regex => selector.pattern.clone(),
    };
    let case_sensitive = selector.case_sensitive.unwrap_or(settings.case_sensitive);
    // blocks are joined with newlines, so anchors must bind per block
    RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .multi_line(true)
        .size_limit(settings.regex_size_limit)
        .build()
        .map_err(|err| DocError::invalid_input(format!("invalid pattern: {err}")))
}

struct CorpusBlock<'a> {
    entry: &'a BlockEntry,
    start: usize,
    len: usize,
}

fn match_text(
    snapshot: &Snapshot,
    scope: &Scope<'_>,
    selector: &TextSelector,
    settings: &MatchSettings,
) -> Result<MatchSet, DocError> {
    let pattern = compile_pattern(selector, settings)?;

    let mut corpus = String::new();
    let mut layout = Vec::new();
    let mut chars = 0;
    for entry in scope.blocks.iter().filter(|entry| entry.is_textblock) {
        let Some(node) = entry.node(snapshot) else {
            continue;
        };
        if !layout.is_empty() {
            corpus.push(BLOCK_SEPARATOR);
            chars += 1;
        }
        let text = node.flattened_text();
        let len = text.chars().count();
        corpus.push_str(&text);
        layout.push(CorpusBlock {
            entry,
            start: chars,
            len,
        });
        chars += len;
    }

    // byte offset of every char, for converting regex byte spans
    let char_starts: Vec<usize> = corpus.char_indices().map(|(byte, _)| byte).collect();
    let to_char = |byte: usize| char_starts.partition_point(|&start| start < byte);

    let mut set = MatchSet::default();
    for found in pattern.find_iter(&corpus) {
        if found.start() == found.end() {
            continue;
        }
        let start = to_char(found.start());
        let end = to_char(found.end());

        let mut ranges = Vec::new();
        let mut owner = None;
        for block in &layout {
            let block_end = block.start + block.len;
            let overlap_start = start.max(block.start);
            let overlap_end = end.min(block_end);
            if overlap_start < overlap_end {
                owner.get_or_insert(block.entry);
                ranges.push(TextAddress {
                    block_id: block.entry.id.clone(),
                    range: TextRange::new(overlap_start - block.start, overlap_end - block.start),
                });
            }
        }
        let Some(owner) = owner else {
            // only separators matched
            continue;
        };
        if !ranges
            .iter()
            .all(|address| scope.admits(&address.block_id, address.range))
        {
            continue;
        }
        if ranges.len() > 1 {
            set.diagnostics.push(format!(
                "match at {}:{} spans {} blocks",
                owner.id,
                ranges[0].range.start,
                ranges.len()
            ));
        }
        set.matches.push(MatchCandidate {
            address: owner.address(),
            text_ranges: ranges,
            snippet: Some(found.as_str().to_string()),
            node: None,
        });
    }
    Ok(set)
}

fn match_nodes(
    snapshot: &Snapshot,
    cache: &mut IndexCache,
    scope: &Scope<'_>,
    selector: &NodeSelector,
) -> Result<MatchSet, DocError> {
    let wants = |node_type: NodeType, kind: NodeKind| {
        selector.node_type.is_none_or(|wanted| wanted == node_type)
            && selector.kind.is_none_or(|wanted| wanted == kind)
    };
    let inline_possible = selector.kind != Some(NodeKind::Block)
        && selector
            .node_type
            .is_none_or(|node_type| contexts(node_type).contains(&NodeKind::Inline));

    // (absolute position, candidate) so block and inline hits interleave in document order
    let mut found: Vec<(usize, MatchCandidate)> = Vec::new();

    if scope.anchor.is_none() {
        for entry in &scope.blocks {
            if wants(entry.node_type, NodeKind::Block) {
                found.push((
                    entry.pos,
                    MatchCandidate {
                        address: entry.address(),
                        text_ranges: Vec::new(),
                        snippet: None,
                        node: Some(describe_block(snapshot, entry)?),
                    },
                ));
            }
        }
    }

    if inline_possible {
        let inlines = cache.inline_index(snapshot);
        for entry in inlines.entries() {
            if !wants(entry.node_type, NodeKind::Inline)
                || !scope.admits(&entry.block_id, TextRange::new(entry.start, entry.end))
            {
                continue;
            }
            let Some(block) = scope.blocks.iter().find(|block| block.id == entry.block_id) else {
                continue;
            };
            found.push((
                entry.pos,
                MatchCandidate {
                    address: entry.address(),
                    text_ranges: Vec::new(),
                    snippet: None,
                    node: Some(describe_inline(snapshot, block, entry)?),
                },
            ));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    Ok(MatchSet {
        matches: found.into_iter().map(|(_, candidate)| candidate).collect(),
        diagnostics: Vec::new(),
    })
}
