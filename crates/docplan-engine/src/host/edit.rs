//! Primitive edits over a block tree, addressed by absolute position.
//!
//! Every edit is confined to one textblock. Inline wrappers are entered when the
//! range sits inside their content and left intact when the range covers them
//! whole; any other partial overlap is a fragmented span.

use crate::host::{HostError, PrimitiveEdit};
use crate::model::{
    BlockContent, BlockNode, Inline, MarkSet, TrackedKind, TrackedMark, TextRun,
};

pub(crate) fn apply_primitive(
    blocks: &mut [BlockNode],
    edit: &PrimitiveEdit,
) -> Result<bool, HostError> {
    match edit {
        PrimitiveEdit::ReplaceText {
            from,
            to,
            text,
            marks,
        } => replace_text(blocks, *from, *to, text, marks),
        PrimitiveEdit::SetMarks {
            from,
            to,
            patch,
            track,
        } => update_marks(blocks, *from, *to, &mut |marks: &mut MarkSet| {
            let next = patch.apply(&marks.formatting);
            if next == marks.formatting {
                return;
            }
            if let Some(track) = track {
                let already_tracked = marks.has_tracked(TrackedKind::Format);
                if !already_tracked {
                    marks.tracked.push(TrackedMark {
                        kind: TrackedKind::Format,
                        before: Some(marks.formatting.clone()),
                        ..track.clone()
                    });
                }
            }
            marks.formatting = next;
        }),
        PrimitiveEdit::AddTrackedMark { from, to, mark } => {
            update_marks(blocks, *from, *to, &mut |marks: &mut MarkSet| {
                let present = marks
                    .tracked
                    .iter()
                    .any(|existing| existing.id == mark.id && existing.kind == mark.kind);
                if !present {
                    marks.tracked.push(mark.clone());
                }
            })
        }
    }
}

pub(crate) fn replace_text(
    blocks: &mut [BlockNode],
    from: usize,
    to: usize,
    text: &str,
    marks: &MarkSet,
) -> Result<bool, HostError> {
    let (children, content_start) = textblock_for_range(blocks, from, to)?;
    let before = children.clone();
    replace_in(children, content_start, from, to, text, marks)?;
    Ok(*children != before)
}

pub(crate) fn update_marks(
    blocks: &mut [BlockNode],
    from: usize,
    to: usize,
    apply: &mut dyn FnMut(&mut MarkSet),
) -> Result<bool, HostError> {
    let (children, content_start) = textblock_for_range(blocks, from, to)?;
    let before = children.clone();
    update_marks_in(children, content_start, from, to, apply);
    Ok(*children != before)
}

/// Keep or drop every text run in the document. `keep` may also rewrite the run.
pub(crate) fn retain_runs(blocks: &mut [BlockNode], keep: &mut dyn FnMut(&mut TextRun) -> bool) {
    for block in blocks.iter_mut() {
        match &mut block.content {
            BlockContent::Inline(children) => retain_in(children, keep),
            BlockContent::Blocks(children) => retain_runs(children, keep),
            BlockContent::Leaf => {}
        }
    }
}

/// Accept or reject tracked marks whose raw id satisfies `selected`.
pub(crate) fn resolve_tracked(
    blocks: &mut [BlockNode],
    selected: &dyn Fn(&str) -> bool,
    accept: bool,
) {
    retain_runs(blocks, &mut |run: &mut TextRun| {
        let mut keep = true;
        let mut restore = None;
        for mark in run.marks.tracked.iter().filter(|mark| selected(&mark.id)) {
            match (mark.kind, accept) {
                (TrackedKind::Insert, false) | (TrackedKind::Delete, true) => keep = false,
                (TrackedKind::Format, false) => restore = mark.before.clone(),
                _ => {}
            }
        }
        if let Some(formatting) = restore {
            run.marks.formatting = formatting;
        }
        run.marks.tracked.retain(|mark| !selected(&mark.id));
        keep
    });
}

fn textblock_for_range(
    blocks: &mut [BlockNode],
    from: usize,
    to: usize,
) -> Result<(&mut Vec<Inline>, usize), HostError> {
    let size: usize = blocks.iter().map(BlockNode::node_size).sum();
    if from > to || to > size {
        return Err(HostError::OutOfBounds { from, to });
    }

    let mut path = Vec::new();
    let content_start = locate_textblock(blocks, 0, from, to, &mut path)
        .ok_or(HostError::NotInTextblock { from, to })?;
    let children =
        inlines_at_path(blocks, &path).ok_or(HostError::NotInTextblock { from, to })?;
    Ok((children, content_start))
}

fn locate_textblock(
    blocks: &[BlockNode],
    start: usize,
    from: usize,
    to: usize,
    path: &mut Vec<usize>,
) -> Option<usize> {
    let mut pos = start;
    for (index, block) in blocks.iter().enumerate() {
        let end = pos + block.node_size();
        match &block.content {
            BlockContent::Inline(_) if pos < from && to < end => {
                path.push(index);
                return Some(pos + 1);
            }
            BlockContent::Blocks(children) if pos < from && to < end => {
                path.push(index);
                let found = locate_textblock(children, pos + 1, from, to, path);
                if found.is_none() {
                    path.pop();
                }
                return found;
            }
            _ => {}
        }
        pos = end;
    }
    None
}

fn inlines_at_path<'a>(blocks: &'a mut [BlockNode], path: &[usize]) -> Option<&'a mut Vec<Inline>> {
    let (first, rest) = path.split_first()?;
    let mut node = blocks.get_mut(*first)?;
    for index in rest {
        node = match &mut node.content {
            BlockContent::Blocks(children) => children.get_mut(*index)?,
            _ => return None,
        };
    }
    match &mut node.content {
        BlockContent::Inline(children) => Some(children),
        _ => None,
    }
}

fn replace_in(
    children: &mut Vec<Inline>,
    base: usize,
    from: usize,
    to: usize,
    text: &str,
    marks: &MarkSet,
) -> Result<(), HostError> {
    let (from, to) = settle_endpoints(children, base, from, to);

    let mut pos = base;
    for child in children.iter_mut() {
        let size = child.node_size();
        if let Inline::Wrapper(wrapper) = child
            && pos + 1 <= from
            && to < pos + size
        {
            return replace_in(&mut wrapper.children, pos + 1, from, to, text, marks);
        }
        pos += size;
    }

    check_not_fragmented(children, base, from, to)?;

    let (mut next, rest) = split_inlines(children.clone(), base, from)?;
    let (_, after) = split_inlines(rest, from, to)?;
    if !text.is_empty() {
        next.push(Inline::Text(TextRun {
            text: text.to_string(),
            marks: marks.clone(),
        }));
    }
    next.extend(after);
    *children = merge_runs(next);
    Ok(())
}

/// Move endpoints that sit on a wrapper's inner edge to the side that keeps the
/// range whole: inside the wrapper when the range stays in its content, outside
/// when the range leaves it.
fn settle_endpoints(children: &[Inline], base: usize, mut from: usize, mut to: usize) -> (usize, usize) {
    let mut pos = base;
    for child in children {
        let (start, end) = (pos, pos + child.node_size());
        pos = end;
        if !matches!(child, Inline::Wrapper(_)) {
            continue;
        }
        let (inner_start, inner_end) = (start + 1, end - 1);

        if from == start && to > start && to <= inner_end {
            from = inner_start;
        }
        if to == end && from >= inner_start && from < end {
            to = inner_end;
        }
        if from == inner_start && to >= end {
            from = start;
        }
        if to == inner_end && from <= start {
            to = end;
        }
        if from < start && to == inner_start {
            to = start;
        }
        if from == inner_end && to > end {
            from = end;
        }
    }
    (from, to)
}

fn check_not_fragmented(children: &[Inline], base: usize, from: usize, to: usize) -> Result<(), HostError> {
    let mut pos = base;
    for child in children {
        let (start, end) = (pos, pos + child.node_size());
        pos = end;
        if matches!(child, Inline::Text(_)) {
            continue;
        }
        let overlaps = from < end && start < to;
        let covered = from <= start && end <= to;
        let inside = start < from && from < end && from == to;
        if (overlaps && !covered) || inside {
            return Err(HostError::SpanFragmented { from, to });
        }
    }
    Ok(())
}

fn split_inlines(
    children: Vec<Inline>,
    base: usize,
    at: usize,
) -> Result<(Vec<Inline>, Vec<Inline>), HostError> {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut pos = base;
    for child in children {
        let (start, end) = (pos, pos + child.node_size());
        pos = end;
        if end <= at {
            before.push(child);
        } else if start >= at {
            after.push(child);
        } else {
            match child {
                Inline::Text(run) => {
                    let (head, tail) = split_run(run, at - start);
                    before.push(Inline::Text(head));
                    after.push(Inline::Text(tail));
                }
                _ => return Err(HostError::SpanFragmented { from: at, to: at }),
            }
        }
    }
    Ok((before, after))
}

fn split_run(run: TextRun, at_char: usize) -> (TextRun, TextRun) {
    let byte = run
        .text
        .char_indices()
        .nth(at_char)
        .map(|(index, _)| index)
        .unwrap_or(run.text.len());
    let tail = TextRun {
        text: run.text[byte..].to_string(),
        marks: run.marks.clone(),
    };
    let head = TextRun {
        text: run.text[..byte].to_string(),
        marks: run.marks,
    };
    (head, tail)
}

fn update_marks_in(
    children: &mut Vec<Inline>,
    base: usize,
    from: usize,
    to: usize,
    apply: &mut dyn FnMut(&mut MarkSet),
) {
    let mut out = Vec::with_capacity(children.len());
    let mut pos = base;
    for child in std::mem::take(children) {
        let (start, end) = (pos, pos + child.node_size());
        pos = end;
        if end <= from || start >= to {
            out.push(child);
            continue;
        }
        match child {
            Inline::Text(run) => {
                let local_start = from.max(start) - start;
                let local_end = to.min(end) - start;
                let (head, rest) = split_run(run, local_start);
                let (mut middle, tail) = split_run(rest, local_end - local_start);
                apply(&mut middle.marks);
                out.extend([head, middle, tail].map(Inline::Text));
            }
            Inline::Wrapper(mut wrapper) => {
                update_marks_in(&mut wrapper.children, start + 1, from, to, apply);
                out.push(Inline::Wrapper(wrapper));
            }
            atom => out.push(atom),
        }
    }
    *children = merge_runs(out);
}

fn retain_in(children: &mut Vec<Inline>, keep: &mut dyn FnMut(&mut TextRun) -> bool) {
    let mut out = Vec::with_capacity(children.len());
    for child in std::mem::take(children) {
        match child {
            Inline::Text(mut run) => {
                if keep(&mut run) {
                    out.push(Inline::Text(run));
                }
            }
            Inline::Wrapper(mut wrapper) => {
                retain_in(&mut wrapper.children, keep);
                out.push(Inline::Wrapper(wrapper));
            }
            atom => out.push(atom),
        }
    }
    *children = merge_runs(out);
}

/// Drop empty runs and join neighbours that carry identical marks.
fn merge_runs(children: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(children.len());
    for child in children {
        if let Inline::Text(run) = &child {
            if run.is_empty() {
                continue;
            }
            if let Some(Inline::Text(previous)) = out.last_mut()
                && previous.marks == run.marks
            {
                previous.text.push_str(&run.text);
                continue;
            }
        }
        out.push(child);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formatting, InlinePatch};
    use pretty_assertions::assert_eq;

    fn bold() -> MarkSet {
        MarkSet::with_formatting(Formatting::bold())
    }

    fn doc() -> Vec<BlockNode> {
        // p1 at 0: "Hello " + link("big") + " world"
        vec![
            BlockNode::paragraph(
                "p1",
                vec![
                    Inline::text("Hello "),
                    Inline::link("#", vec![Inline::text("big")]),
                    Inline::text(" world"),
                ],
            ),
            BlockNode::paragraph("p2", vec![]),
        ]
    }

    fn tracked(kind: TrackedKind, id: &str) -> TrackedMark {
        TrackedMark {
            kind,
            id: id.to_string(),
            author: "Ada".to_string(),
            author_email: None,
            date: "2026-01-01T00:00:00Z".to_string(),
            before: None,
        }
    }

    #[test]
    fn test_replace_inside_plain_run() {
        let mut blocks = doc();
        // " world" starts at 1 + 6 + 5 = 12; "world" is 13..18
        let changed = replace_text(&mut blocks, 13, 18, "Earth", &MarkSet::default()).unwrap();

        assert!(changed);
        assert_eq!(blocks[0].flattened_text(), "Hello big Earth");
    }

    #[test]
    fn test_replace_wrapper_content_keeps_wrapper() {
        let mut blocks = doc();
        // the link opens at 7, its content is 8..11
        replace_text(&mut blocks, 7, 11, "small", &MarkSet::default()).unwrap();

        assert_eq!(blocks[0].flattened_text(), "Hello small world");
        assert!(matches!(&blocks[0].inlines()[1], Inline::Wrapper(w) if w.children.len() == 1));
    }

    #[test]
    fn test_partial_wrapper_overlap_is_fragmented() {
        let mut blocks = doc();
        let result = replace_text(&mut blocks, 5, 9, "", &MarkSet::default());

        assert_eq!(result, Err(HostError::SpanFragmented { from: 5, to: 9 }));
        assert_eq!(blocks, doc());
    }

    #[test]
    fn test_insert_into_empty_block() {
        let mut blocks = doc();
        let p2_content = blocks[0].node_size() + 1;
        replace_text(&mut blocks, p2_content, p2_content, "new", &bold()).unwrap();

        assert_eq!(blocks[1].flattened_text(), "new");
    }

    #[test]
    fn test_range_outside_textblocks_is_rejected() {
        let mut blocks = doc();
        let size: usize = blocks.iter().map(BlockNode::node_size).sum();

        assert_eq!(
            replace_text(&mut blocks, 0, 2, "", &MarkSet::default()),
            Err(HostError::NotInTextblock { from: 0, to: 2 })
        );
        assert_eq!(
            replace_text(&mut blocks, size, size + 1, "", &MarkSet::default()),
            Err(HostError::OutOfBounds {
                from: size,
                to: size + 1
            })
        );
    }

    #[test]
    fn test_set_marks_splits_and_merges_runs() {
        let mut blocks = vec![BlockNode::paragraph("p1", vec![Inline::text("abcdef")])];
        let patch = PrimitiveEdit::SetMarks {
            from: 3,
            to: 5,
            patch: InlinePatch {
                bold: Some(true),
                ..InlinePatch::default()
            },
            track: None,
        };

        assert!(apply_primitive(&mut blocks, &patch).unwrap());
        assert_eq!(
            blocks[0].inlines(),
            &[
                Inline::text("ab"),
                Inline::styled("cd", bold()),
                Inline::text("ef")
            ]
        );

        // applying again is a no-op
        assert!(!apply_primitive(&mut blocks, &patch).unwrap());
    }

    #[test]
    fn test_tracked_format_remembers_previous_formatting() {
        let mut blocks = vec![BlockNode::paragraph("p1", vec![Inline::text("abc")])];
        let edit = PrimitiveEdit::SetMarks {
            from: 1,
            to: 4,
            patch: InlinePatch {
                italic: Some(true),
                ..InlinePatch::default()
            },
            track: Some(tracked(TrackedKind::Format, "f1")),
        };
        apply_primitive(&mut blocks, &edit).unwrap();

        resolve_tracked(&mut blocks, &|id| id == "f1", false);

        assert_eq!(blocks[0].inlines(), &[Inline::text("abc")]);
    }

    #[test]
    fn test_accept_and_reject_tracked_runs() {
        let insert = MarkSet {
            tracked: vec![tracked(TrackedKind::Insert, "c1")],
            ..MarkSet::default()
        };
        let delete = MarkSet {
            tracked: vec![tracked(TrackedKind::Delete, "c1")],
            ..MarkSet::default()
        };
        let original = vec![BlockNode::paragraph(
            "p1",
            vec![
                Inline::text("Hello "),
                Inline::styled("world", delete),
                Inline::styled("Earth", insert),
            ],
        )];

        let mut accepted = original.clone();
        resolve_tracked(&mut accepted, &|id| id == "c1", true);
        assert_eq!(accepted[0].inlines(), &[Inline::text("Hello Earth")]);

        let mut rejected = original.clone();
        resolve_tracked(&mut rejected, &|id| id == "c1", false);
        assert_eq!(rejected[0].inlines(), &[Inline::text("Hello world")]);

        let mut untouched = original.clone();
        resolve_tracked(&mut untouched, &|id| id == "other", true);
        assert_eq!(untouched, original);
    }
}
