//! Conversion between block-relative flattened-text offsets and absolute positions.
//!
//! A block's content is walked depth-first and cut into segments. Each segment
//! knows its span in flattened-text offsets and in absolute positions:
//!
//! - text runs map one character to one position
//! - inline atoms and leaf child blocks take one offset and one position
//! - the separator between sibling child blocks takes one offset and spans the
//!   close and open tokens between their contents
//!
//! Inline wrappers are walked in place. Their open and close tokens occupy
//! positions but no offsets, so they appear as gaps between segments.

use serde::{Deserialize, Serialize};

use crate::model::{BlockContent, BlockNode, Inline, TextRange, TextRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteRange {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unit<'a> {
    Text(&'a TextRun),
    Atom,
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment<'a> {
    pub start: usize,
    pub end: usize,
    pub from: usize,
    pub to: usize,
    pub unit: Unit<'a>,
}

impl Segment<'_> {
    fn width(&self) -> usize {
        self.end - self.start
    }
}

/// Cut `block`, positioned at `block_pos`, into offset segments in document order.
pub fn segments(block: &BlockNode, block_pos: usize) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut offset = 0;
    walk_block(block, block_pos, &mut out, &mut offset);
    out
}

fn walk_block<'a>(block: &'a BlockNode, pos: usize, out: &mut Vec<Segment<'a>>, offset: &mut usize) {
    match &block.content {
        BlockContent::Inline(children) => walk_inlines(children, pos + 1, out, offset),
        BlockContent::Blocks(children) => {
            let mut child_pos = pos + 1;
            let mut previous_end = None;
            for child in children {
                let (inner_start, inner_end) = inner_bounds(child, child_pos);
                if let Some(previous_end) = previous_end {
                    out.push(Segment {
                        start: *offset,
                        end: *offset + 1,
                        from: previous_end,
                        to: inner_start,
                        unit: Unit::Separator,
                    });
                    *offset += 1;
                }
                if child.is_leaf() {
                    out.push(Segment {
                        start: *offset,
                        end: *offset + 1,
                        from: child_pos,
                        to: child_pos + 1,
                        unit: Unit::Atom,
                    });
                    *offset += 1;
                } else {
                    walk_block(child, child_pos, out, offset);
                }
                previous_end = Some(inner_end);
                child_pos += child.node_size();
            }
        }
        BlockContent::Leaf => {}
    }
}

/// Where a child's text begins and ends. A leaf child is a unit in its own right.
fn inner_bounds(child: &BlockNode, pos: usize) -> (usize, usize) {
    if child.is_leaf() {
        (pos, pos + 1)
    } else {
        (pos + 1, pos + child.node_size() - 1)
    }
}

fn walk_inlines<'a>(children: &'a [Inline], start: usize, out: &mut Vec<Segment<'a>>, offset: &mut usize) {
    let mut pos = start;
    for child in children {
        match child {
            Inline::Text(run) => {
                let len = run.len();
                if len > 0 {
                    out.push(Segment {
                        start: *offset,
                        end: *offset + len,
                        from: pos,
                        to: pos + len,
                        unit: Unit::Text(run),
                    });
                    *offset += len;
                }
            }
            Inline::Atom(_) => {
                out.push(Segment {
                    start: *offset,
                    end: *offset + 1,
                    from: pos,
                    to: pos + 1,
                    unit: Unit::Atom,
                });
                *offset += 1;
            }
            Inline::Wrapper(wrapper) => walk_inlines(&wrapper.children, pos + 1, out, offset),
        }
        pos += child.node_size();
    }
}

/// Resolve a block-relative range to absolute positions.
///
/// Returns `None` for reversed ranges and offsets beyond the block's flattened
/// length. An empty textblock resolves `(0, 0)` to its interior.
pub fn resolve_range(block: &BlockNode, block_pos: usize, range: TextRange) -> Option<AbsoluteRange> {
    if !range.is_valid() {
        return None;
    }
    let segs = segments(block, block_pos);
    if segs.is_empty() {
        let empty_interior = range.start == 0 && range.end == 0 && !block.is_leaf();
        return empty_interior.then_some(AbsoluteRange {
            from: block_pos + 1,
            to: block_pos + 1,
        });
    }
    let from = locate(&segs, range.start)?;
    let to = locate(&segs, range.end)?;
    Some(AbsoluteRange { from, to })
}

fn locate(segs: &[Segment<'_>], target: usize) -> Option<usize> {
    let seg = segs
        .iter()
        .find(|seg| seg.start <= target && target <= seg.end)?;
    if seg.width() <= 1 {
        // one-wide units: a boundary request means the leading side
        Some(if target <= seg.start { seg.from } else { seg.to })
    } else {
        Some(seg.from + (target - seg.start))
    }
}

/// Map an absolute position inside `block` back to a flattened-text offset.
///
/// Positions that fall between units of zero flattened width (inside a
/// separator's token gap, on a wrapper token) resolve to `None`.
pub fn offset_at(block: &BlockNode, block_pos: usize, pos: usize) -> Option<usize> {
    let segs = segments(block, block_pos);
    if segs.is_empty() {
        return (pos == block_pos + 1 && !block.is_leaf()).then_some(0);
    }
    segs.iter().find_map(|seg| {
        if pos < seg.from || pos > seg.to {
            return None;
        }
        match seg.unit {
            Unit::Text(_) => Some(seg.start + (pos - seg.from)),
            Unit::Atom | Unit::Separator if pos == seg.from => Some(seg.start),
            Unit::Atom | Unit::Separator if pos == seg.to => Some(seg.end),
            _ => None,
        }
    })
}

/// Map an absolute range back to block-relative offsets.
pub fn range_at(block: &BlockNode, block_pos: usize, range: AbsoluteRange) -> Option<TextRange> {
    let start = offset_at(block, block_pos, range.from)?;
    let end = offset_at(block, block_pos, range.to)?;
    Some(TextRange::new(start, end))
}

/// Text runs overlapping `range`, with the number of covered characters in each.
pub fn runs_in_range<'a>(block: &'a BlockNode, range: TextRange) -> Vec<(&'a TextRun, usize)> {
    segments(block, 0)
        .into_iter()
        .filter_map(|seg| match seg.unit {
            Unit::Text(run) => {
                let start = seg.start.max(range.start);
                let end = seg.end.min(range.end);
                (start < end).then_some((run, end - start))
            }
            _ => None,
        })
        .collect()
}

/// The flattened text in `range`, or `None` when the range is out of bounds.
pub fn text_in_range(block: &BlockNode, range: TextRange) -> Option<String> {
    let text = block.flattened_text();
    let len = text.chars().count();
    if !range.is_valid() || range.end > len {
        return None;
    }
    Some(text.chars().skip(range.start).take(range.len()).collect())
}
