/*!
 * # Tracked Changes
 *
 * Raw tracked marks live on text runs. Every run carrying a mark with the same
 * raw id belongs to one logical change, so the resolver groups them:
 *
 * - the covered range is `[min(from), max(to)]` over all contributing runs
 * - `hasInsert`, `hasDelete` and `hasFormat` are OR-ed across the group
 * - the type is `format` if any format mark is present, else `delete` when there
 *   is a delete and no insert, else `insert`
 *
 * Each group gets a derived id hashed from its type, range, author, date and text
 * excerpt. Derived ids are discovery handles for one snapshot: any edit that moves
 * the group produces a different id.
 */

pub mod cache;

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

use crate::host::Author;
use crate::index::BlockIndex;
use crate::model::{EntityAddress, Snapshot, TextAddress, TextRange, TrackedKind, TrackedMark};
use crate::resolve::{Unit, segments};

pub use cache::TrackedChangeCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackedChangeType {
    Insert,
    Delete,
    Format,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedTrackedChange {
    pub address: EntityAddress,
    pub raw_id: String,
    pub derived_id: String,
    #[serde(rename = "type")]
    pub change_type: TrackedChangeType,
    pub from: usize,
    pub to: usize,
    pub has_insert: bool,
    pub has_delete: bool,
    pub has_format: bool,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub date: String,
    pub excerpt: String,
    /// Block-relative spans the change covers, merged per block.
    pub ranges: Vec<TextAddress>,
}

struct Accumulator {
    raw_id: String,
    from: usize,
    to: usize,
    has_insert: bool,
    has_delete: bool,
    has_format: bool,
    author: String,
    author_email: Option<String>,
    date: String,
    excerpt: String,
    ranges: Vec<TextAddress>,
}

impl Accumulator {
    fn new(mark: &TrackedMark, from: usize, to: usize) -> Self {
        Self {
            raw_id: mark.id.clone(),
            from,
            to,
            has_insert: false,
            has_delete: false,
            has_format: false,
            author: mark.author.clone(),
            author_email: mark.author_email.clone(),
            date: mark.date.clone(),
            excerpt: String::new(),
            ranges: Vec::new(),
        }
    }

    fn add_span(&mut self, block_id: &str, range: TextRange, text: &str) {
        self.excerpt.push_str(text);
        if let Some(last) = self.ranges.last_mut()
            && last.block_id == block_id
            && last.range.end == range.start
        {
            last.range.end = range.end;
            return;
        }
        self.ranges.push(TextAddress {
            block_id: block_id.to_string(),
            range,
        });
    }

    fn finish(self) -> GroupedTrackedChange {
        let change_type = if self.has_format {
            TrackedChangeType::Format
        } else if self.has_delete && !self.has_insert {
            TrackedChangeType::Delete
        } else {
            TrackedChangeType::Insert
        };
        let derived_id = derive_id(
            &self.raw_id,
            change_type,
            self.from,
            self.to,
            &self.author,
            self.author_email.as_deref(),
            &self.date,
            &self.excerpt,
        );
        GroupedTrackedChange {
            address: EntityAddress::tracked_change(derived_id.clone()),
            raw_id: self.raw_id,
            derived_id,
            change_type,
            from: self.from,
            to: self.to,
            has_insert: self.has_insert,
            has_delete: self.has_delete,
            has_format: self.has_format,
            author: self.author,
            author_email: self.author_email,
            date: self.date,
            excerpt: self.excerpt,
            ranges: self.ranges,
        }
    }
}

/// Top 96 bits of XXH3-128 over the unit-separated fields, as 24 hex digits.
/// The raw id is hashed too, so identical edits from separate groups stay distinct.
#[allow(clippy::too_many_arguments)]
pub fn derive_id(
    raw_id: &str,
    change_type: TrackedChangeType,
    from: usize,
    to: usize,
    author: &str,
    author_email: Option<&str>,
    date: &str,
    excerpt: &str,
) -> String {
    let kind = match change_type {
        TrackedChangeType::Insert => "insert",
        TrackedChangeType::Delete => "delete",
        TrackedChangeType::Format => "format",
    };
    let from = from.to_string();
    let to = to.to_string();
    let payload = [
        raw_id,
        kind,
        from.as_str(),
        to.as_str(),
        author,
        author_email.unwrap_or(""),
        date,
        excerpt,
    ]
    .join("\u{1f}");
    format!("{:024x}", xxh3_128(payload.as_bytes()) >> 32)
}

/// Group every raw tracked mark in the snapshot, ordered by start position.
pub fn group_tracked_changes(snapshot: &Snapshot, blocks: &BlockIndex) -> Vec<GroupedTrackedChange> {
    let mut order: Vec<Accumulator> = Vec::new();
    let mut by_raw_id: HashMap<String, usize> = HashMap::new();

    for entry in blocks.textblocks() {
        let Some(node) = entry.node(snapshot) else {
            continue;
        };
        for seg in segments(node, entry.pos) {
            let Unit::Text(run) = seg.unit else {
                continue;
            };
            for mark in &run.marks.tracked {
                let slot = *by_raw_id.entry(mark.id.clone()).or_insert_with(|| {
                    order.push(Accumulator::new(mark, seg.from, seg.to));
                    order.len() - 1
                });
                let group = &mut order[slot];
                group.from = group.from.min(seg.from);
                group.to = group.to.max(seg.to);
                match mark.kind {
                    TrackedKind::Insert => group.has_insert = true,
                    TrackedKind::Delete => group.has_delete = true,
                    TrackedKind::Format => group.has_format = true,
                }
                // one run may carry two marks with the same id
                let already_counted = group
                    .ranges
                    .last()
                    .is_some_and(|last| last.block_id == entry.id && last.range.end > seg.start);
                if !already_counted {
                    group.add_span(&entry.id, TextRange::new(seg.start, seg.end), &run.text);
                }
            }
        }
    }

    let mut grouped: Vec<_> = order.into_iter().map(Accumulator::finish).collect();
    grouped.sort_by_key(|change| change.from);
    grouped
}

/// Find a group by derived id, falling back to its raw id.
pub fn resolve<'a>(changes: &'a [GroupedTrackedChange], id: &str) -> Option<&'a GroupedTrackedChange> {
    changes
        .iter()
        .find(|change| change.derived_id == id)
        .or_else(|| changes.iter().find(|change| change.raw_id == id))
}

/// A fresh raw mark attributed to `author`, dated now.
pub fn new_mark(kind: TrackedKind, raw_id: impl Into<String>, author: &Author) -> TrackedMark {
    TrackedMark {
        kind,
        id: raw_id.into(),
        author: author.name.clone(),
        author_email: author.email.clone(),
        date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        before: None,
    }
}
