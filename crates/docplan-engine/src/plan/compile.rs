//! Resolving steps against the pre-plan snapshot, before anything is mutated.

use serde_json::Value;

use crate::error::{CapabilityReason, DocError};
use crate::host::{Author, CapabilityContext, TrackCommand, TrackMarkType};
use crate::index::{BlockIndex, IndexCache};
use crate::model::{Formatting, InlinePatch, NodeAddress, Snapshot, TextAddress, TextRange};
use crate::plan::ChangeMode;
use crate::plan::step::{InsertPosition, MutationStep, StepOp, StepWhere};
use crate::query::{
    Cardinality, MatchCandidate, MatchQuery, MatchSettings, ParsedRef, StyleTally, find_matches,
    parse_ref,
};
use crate::resolve::{runs_in_range, text_in_range};
use crate::revision::Revision;

/// Everything compilation reads. Nothing here is mutated except the index cache.
pub struct CompileEnv<'a> {
    pub snapshot: &'a Snapshot,
    pub cache: &'a mut IndexCache,
    pub settings: &'a MatchSettings,
    pub revision: Revision,
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Block-relative target in the pre-plan document. Collapsed for inserts.
    pub address: TextAddress,
    /// Text formerly occupying the target.
    pub text: String,
    pub tally: StyleTally,
    /// Formatting for new text: the rewrite policy's result, or the formatting
    /// inherited at an insertion point.
    pub formatting: Formatting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledOp {
    Rewrite { text: String },
    Insert { text: String },
    Delete,
    Style { patch: InlinePatch },
    Assert {
        at: StepWhere,
        expect_count: usize,
        actual_count: usize,
    },
    Domain { name: String, args: Value },
}

impl CompiledOp {
    fn changes_text(&self) -> bool {
        matches!(
            self,
            CompiledOp::Rewrite { .. } | CompiledOp::Insert { .. } | CompiledOp::Delete
        )
    }
}

#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub id: String,
    pub op_name: String,
    pub op: CompiledOp,
    pub targets: Vec<ResolvedTarget>,
}

/// Compile one step. `check_domain` validates domain op names and args.
pub fn compile_step(
    env: &mut CompileEnv<'_>,
    step: &MutationStep,
    check_domain: &dyn Fn(&str, &Value) -> Result<(), DocError>,
) -> Result<CompiledStep, DocError> {
    compile_inner(env, step, check_domain).map_err(|err| err.in_step(&step.id))
}

fn compile_inner(
    env: &mut CompileEnv<'_>,
    step: &MutationStep,
    check_domain: &dyn Fn(&str, &Value) -> Result<(), DocError>,
) -> Result<CompiledStep, DocError> {
    let blocks = env.cache.block_index(env.snapshot);

    let (op, targets) = match &step.op {
        StepOp::TextRewrite(args) => {
            if args.replacement.text.is_empty() {
                return Err(DocError::invalid_input(
                    "replacement text must not be empty; use text.delete",
                ));
            }
            let policy = args.style.clone().unwrap_or_default();
            policy.validate()?;
            let mut targets = Vec::new();
            for address in resolve_where(env, &step.at, Cardinality::ExactlyOne)? {
                if address.range.is_empty() {
                    return Err(DocError::invalid_target(
                        "text.rewrite needs a non-empty target; use text.insert",
                    ));
                }
                let mut target = describe_target(env.snapshot, &blocks, address)?;
                target.formatting = policy.resolve(&target.tally)?;
                targets.push(target);
            }
            (
                CompiledOp::Rewrite {
                    text: args.replacement.text.clone(),
                },
                targets,
            )
        }
        StepOp::TextInsert(args) => {
            if args.text.is_empty() {
                return Err(DocError::invalid_input("insert text must not be empty"));
            }
            let mut targets = Vec::new();
            for address in resolve_where(env, &step.at, Cardinality::ExactlyOne)? {
                let at = match args.position {
                    InsertPosition::Before => address.range.start,
                    InsertPosition::After => address.range.end,
                };
                let point = TextAddress {
                    block_id: address.block_id,
                    range: TextRange::collapsed(at),
                };
                let mut target = describe_target(env.snapshot, &blocks, point)?;
                target.formatting = inherited_formatting(env.snapshot, &blocks, &target.address);
                targets.push(target);
            }
            (
                CompiledOp::Insert {
                    text: args.text.clone(),
                },
                targets,
            )
        }
        StepOp::TextDelete => (
            CompiledOp::Delete,
            describe_all(env, &blocks, &step.at, Cardinality::ExactlyOne)?,
        ),
        StepOp::StyleApply(args) => {
            if args.inline.is_empty() {
                return Err(DocError::invalid_input("style.apply needs at least one attribute"));
            }
            (
                CompiledOp::Style {
                    patch: args.inline.clone(),
                },
                describe_all(env, &blocks, &step.at, Cardinality::ExactlyOne)?,
            )
        }
        StepOp::Assert(args) => {
            let actual_count = count_where(env, &step.at)?;
            (
                CompiledOp::Assert {
                    at: step.at.clone(),
                    expect_count: args.expect_count,
                    actual_count,
                },
                Vec::new(),
            )
        }
        StepOp::Domain { name, args } => {
            check_domain(name, args)?;
            (
                CompiledOp::Domain {
                    name: name.clone(),
                    args: args.clone(),
                },
                describe_all(env, &blocks, &step.at, Cardinality::ExactlyOne)?,
            )
        }
    };

    Ok(CompiledStep {
        id: step.id.clone(),
        op_name: step.op.name().to_string(),
        op,
        targets,
    })
}

fn describe_all(
    env: &mut CompileEnv<'_>,
    blocks: &BlockIndex,
    at: &StepWhere,
    default: Cardinality,
) -> Result<Vec<ResolvedTarget>, DocError> {
    resolve_where(env, at, default)?
        .into_iter()
        .map(|address| describe_target(env.snapshot, blocks, address))
        .collect()
}

fn describe_target(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    address: TextAddress,
) -> Result<ResolvedTarget, DocError> {
    let node = blocks
        .get(&address.block_id)
        .and_then(|entry| entry.node(snapshot))
        .ok_or_else(|| DocError::target_not_found(address.block_id.clone()))?;
    let text = text_in_range(node, address.range).ok_or_else(|| {
        DocError::invalid_target(format!(
            "range {}..{} is outside block {}",
            address.range.start, address.range.end, address.block_id
        ))
    })?;
    let tally = StyleTally::over_ranges(snapshot, blocks, std::slice::from_ref(&address));
    Ok(ResolvedTarget {
        address,
        text,
        tally,
        formatting: Formatting::default(),
    })
}

/// Formatting of the character before `point`, else the one after it.
fn inherited_formatting(snapshot: &Snapshot, blocks: &BlockIndex, point: &TextAddress) -> Formatting {
    let Some(node) = blocks.get(&point.block_id).and_then(|entry| entry.node(snapshot)) else {
        return Formatting::default();
    };
    let at = point.range.start;
    let before = at
        .checked_sub(1)
        .and_then(|start| runs_in_range(node, TextRange::new(start, at)).into_iter().next());
    let after = || runs_in_range(node, TextRange::new(at, at + 1)).into_iter().next();
    before
        .or_else(after)
        .map(|(run, _)| run.marks.formatting.clone())
        .unwrap_or_default()
}

/// Resolve a step locator to block-relative targets in document order.
pub fn resolve_where(
    env: &mut CompileEnv<'_>,
    at: &StepWhere,
    default: Cardinality,
) -> Result<Vec<TextAddress>, DocError> {
    let blocks = env.cache.block_index(env.snapshot);
    match at {
        StepWhere::Select {
            select,
            within,
            require,
        } => {
            let require = require.unwrap_or(default);
            let query = MatchQuery {
                select: Some(select.clone()),
                within: within.clone(),
                include_nodes: false,
            };
            let set = find_matches(env.snapshot, env.cache, &query, env.settings)?;
            let matches = require.enforce(set.matches, &select.describe())?;
            matches
                .iter()
                .map(|candidate| candidate_range(env.snapshot, &blocks, candidate))
                .collect()
        }
        StepWhere::Ref { reference } => {
            // a node that really has this id wins over the ephemeral ref prefixes
            let names_node = blocks.get(reference).is_some()
                || env.cache.inline_index(env.snapshot).by_id(reference).is_some();
            let parsed = if names_node {
                ParsedRef::Node {
                    id: reference.clone(),
                }
            } else {
                parse_ref(reference)?
            };
            parsed.ensure_current(env.revision)?;
            match parsed {
                ParsedRef::Text { ranges, .. } => {
                    if ranges.len() > 1 {
                        return Err(DocError::CrossBlockMatch {
                            block_count: ranges.len(),
                        });
                    }
                    ranges
                        .into_iter()
                        .map(|address| checked(env.snapshot, &blocks, address))
                        .collect()
                }
                ParsedRef::Inline { address, .. } => {
                    let NodeAddress::Inline { node_type, anchor } = &address else {
                        return Err(DocError::invalid_input("inline ref holds a block address"));
                    };
                    let inlines = env.cache.inline_index(env.snapshot);
                    let entry = inlines
                        .find(*node_type, anchor)
                        .ok_or_else(|| DocError::target_not_found(reference.clone()))?;
                    Ok(vec![TextAddress::new(
                        entry.block_id.clone(),
                        entry.start,
                        entry.end,
                    )])
                }
                ParsedRef::Node { id } if blocks.get(&id).is_none() => {
                    let inlines = env.cache.inline_index(env.snapshot);
                    let entry = inlines
                        .by_id(&id)
                        .ok_or_else(|| DocError::target_not_found(id.clone()))?;
                    Ok(vec![TextAddress::new(
                        entry.block_id.clone(),
                        entry.start,
                        entry.end,
                    )])
                }
                ParsedRef::Node { id } => Ok(vec![whole_block(env.snapshot, &blocks, &id)?]),
            }
        }
        StepWhere::Target { target } => Ok(vec![checked(env.snapshot, &blocks, target.clone())?]),
    }
}

/// Count what a locator matches, without a cardinality requirement.
pub fn count_where(env: &mut CompileEnv<'_>, at: &StepWhere) -> Result<usize, DocError> {
    match at {
        StepWhere::Select { select, within, .. } => {
            let query = MatchQuery {
                select: Some(select.clone()),
                within: within.clone(),
                include_nodes: false,
            };
            Ok(find_matches(env.snapshot, env.cache, &query, env.settings)?.total())
        }
        other => resolve_where(env, other, Cardinality::Any).map(|targets| targets.len()),
    }
}

fn candidate_range(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    candidate: &MatchCandidate,
) -> Result<TextAddress, DocError> {
    match candidate.text_ranges.as_slice() {
        [single] => Ok(single.clone()),
        [] => match &candidate.address {
            NodeAddress::Block { node_id, .. } => whole_block(snapshot, blocks, node_id),
            NodeAddress::Inline { anchor, .. } => Ok(TextAddress::new(
                anchor.start.block_id.clone(),
                anchor.start.offset,
                anchor.end.offset,
            )),
        },
        several => Err(DocError::CrossBlockMatch {
            block_count: several.len(),
        }),
    }
}

fn whole_block(snapshot: &Snapshot, blocks: &BlockIndex, id: &str) -> Result<TextAddress, DocError> {
    let entry = blocks
        .get(id)
        .ok_or_else(|| DocError::target_not_found(id.to_string()))?;
    if !entry.is_textblock {
        return Err(DocError::invalid_target(format!(
            "{} {} has no text of its own",
            entry.node_type, entry.id
        )));
    }
    let len = entry.node(snapshot).map_or(0, |node| node.flattened_len());
    Ok(TextAddress::new(id, 0, len))
}

fn checked(snapshot: &Snapshot, blocks: &BlockIndex, address: TextAddress) -> Result<TextAddress, DocError> {
    let entry = blocks
        .get(&address.block_id)
        .ok_or_else(|| DocError::target_not_found(address.block_id.clone()))?;
    if !entry.is_textblock {
        return Err(DocError::invalid_target(format!(
            "{} {} is not a textblock",
            entry.node_type, entry.id
        )));
    }
    let len = entry.node(snapshot).map_or(0, |node| node.flattened_len());
    if !address.range.is_valid() || address.range.end > len {
        return Err(DocError::invalid_target(format!(
            "range {}..{} is outside block {} of length {len}",
            address.range.start, address.range.end, address.block_id
        )));
    }
    Ok(address)
}

/// Reject steps whose targets collide. Runs before any mutation.
pub fn check_overlaps(steps: &[CompiledStep]) -> Result<(), DocError> {
    for (later_index, later) in steps.iter().enumerate() {
        for earlier in &steps[..later_index] {
            for a in &earlier.targets {
                for b in &later.targets {
                    if a.address.block_id == b.address.block_id {
                        check_pair(earlier, &a.address.range, later, &b.address.range)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_pair(
    earlier: &CompiledStep,
    a: &TextRange,
    later: &CompiledStep,
    b: &TextRange,
) -> Result<(), DocError> {
    let combination = |message: String| DocError::InvalidStepCombination {
        step_id: later.id.clone(),
        other_step_id: earlier.id.clone(),
        message,
    };

    let either_domain = matches!(earlier.op, CompiledOp::Domain { .. })
        || matches!(later.op, CompiledOp::Domain { .. });
    if either_domain {
        return Err(combination(
            "a domain op must be the only step editing its block".to_string(),
        ));
    }

    match (&earlier.op, &later.op) {
        (CompiledOp::Insert { .. }, CompiledOp::Insert { .. }) if a.start == b.start => {
            Err(combination(format!("both steps insert at offset {}", a.start)))
        }
        (CompiledOp::Insert { .. }, CompiledOp::Rewrite { .. } | CompiledOp::Delete)
            if b.strictly_contains(a.start) =>
        {
            Err(combination(format!(
                "insert at {} falls inside a range the other step replaces",
                a.start
            )))
        }
        (CompiledOp::Rewrite { .. } | CompiledOp::Delete, CompiledOp::Insert { .. })
            if a.strictly_contains(b.start) =>
        {
            Err(combination(format!(
                "insert at {} falls inside a range the other step replaces",
                b.start
            )))
        }
        (first, second)
            if (first.changes_text() || second.changes_text()) && a.overlaps(b) =>
        {
            Err(DocError::PlanConflictOverlap {
                step_id: later.id.clone(),
                other_step_id: earlier.id.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// Fail with `CAPABILITY_UNAVAILABLE` when tracked mode cannot record `ops`.
pub fn check_capabilities<'a>(
    caps: &dyn CapabilityContext,
    mode: ChangeMode,
    ops: impl IntoIterator<Item = &'a StepOp>,
    author: Option<&Author>,
) -> Result<(), DocError> {
    if mode == ChangeMode::Direct {
        return Ok(());
    }
    let mut required = Vec::new();
    for op in ops {
        match op {
            StepOp::TextRewrite(_) => {
                required.push((TrackCommand::InsertTracked, TrackMarkType::TrackInsert));
                required.push((TrackCommand::DeleteTracked, TrackMarkType::TrackDelete));
            }
            StepOp::TextInsert(_) => {
                required.push((TrackCommand::InsertTracked, TrackMarkType::TrackInsert))
            }
            StepOp::TextDelete => {
                required.push((TrackCommand::DeleteTracked, TrackMarkType::TrackDelete))
            }
            StepOp::StyleApply(_) => {
                required.push((TrackCommand::FormatTracked, TrackMarkType::TrackFormat))
            }
            StepOp::Assert(_) | StepOp::Domain { .. } => {}
        }
    }
    if required.is_empty() {
        return Ok(());
    }
    if let Some((command, _)) = required.iter().find(|(command, _)| !caps.has_command(*command)) {
        return Err(DocError::CapabilityUnavailable {
            reason: CapabilityReason::MissingCommand,
            message: format!("host does not register the {command:?} command"),
        });
    }
    if let Some((_, mark_type)) = required
        .iter()
        .find(|(_, mark_type)| !caps.has_mark_type(*mark_type))
    {
        return Err(DocError::CapabilityUnavailable {
            reason: CapabilityReason::MissingMarkType,
            message: format!("host does not register the {mark_type:?} mark type"),
        });
    }
    if author.is_none() {
        return Err(DocError::CapabilityUnavailable {
            reason: CapabilityReason::MissingAuthor,
            message: "tracked changes need an author identity".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use crate::host::MemoryDocument;
    use crate::model::{BlockNode, Inline, MarkSet};
    use crate::plan::step::{AssertArgs, InsertArgs, Replacement, RewriteArgs, StyleApplyArgs};
    use crate::query::{Handle, Selector};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            1,
            Arc::new(vec![
                BlockNode::paragraph(
                    "p1",
                    vec![
                        Inline::text("Hello "),
                        Inline::styled("bold", MarkSet::with_formatting(Formatting::bold())),
                        Inline::text(" world"),
                    ],
                ),
                BlockNode::paragraph("p2", vec![Inline::text("world again")]),
                BlockNode::table("t1", vec![]),
            ]),
        )
    }

    fn no_domain(name: &str, _args: &Value) -> Result<(), DocError> {
        Err(DocError::invalid_input(format!("unknown op {name}")))
    }

    fn compile(step: MutationStep) -> Result<CompiledStep, DocError> {
        let snap = snapshot();
        let mut cache = IndexCache::default();
        let settings = MatchSettings::default();
        let mut env = CompileEnv {
            snapshot: &snap,
            cache: &mut cache,
            settings: &settings,
            revision: Revision::new(3),
        };
        compile_step(&mut env, &step, &no_domain)
    }

    fn rewrite(at: StepWhere, text: &str) -> MutationStep {
        MutationStep::new(
            "s1",
            at,
            StepOp::TextRewrite(RewriteArgs {
                replacement: Replacement { text: text.into() },
                style: None,
            }),
        )
    }

    #[test]
    fn test_rewrite_defaults_to_exactly_one() {
        let at = StepWhere::Select {
            select: Selector::text("world"),
            within: None,
            require: None,
        };
        let err = compile(rewrite(at, "Earth")).unwrap_err();
        assert_eq!(err.code(), FailureCode::AmbiguousMatch);
        assert!(matches!(err, DocError::Step { ref step_id, .. } if step_id == "s1"));
    }

    #[test]
    fn test_rewrite_resolves_text_and_majority_formatting() {
        let at = StepWhere::select(Selector::text("lo bold"), Cardinality::ExactlyOne);
        let compiled = compile(rewrite(at, "X")).unwrap();

        let target = &compiled.targets[0];
        assert_eq!(target.address, TextAddress::new("p1", 3, 10));
        assert_eq!(target.text, "lo bold");
        // 4 bold chars of 7
        assert_eq!(target.formatting, Formatting::bold());
    }

    #[test]
    fn test_insert_inherits_formatting_before_the_point() {
        let step = MutationStep::new(
            "i1",
            StepWhere::select(Selector::text("bold"), Cardinality::ExactlyOne),
            StepOp::TextInsert(InsertArgs {
                text: "!".into(),
                position: InsertPosition::After,
            }),
        );
        let compiled = compile(step).unwrap();
        assert_eq!(compiled.targets[0].address, TextAddress::new("p1", 10, 10));
        assert_eq!(compiled.targets[0].formatting, Formatting::bold());
    }

    #[test]
    fn test_node_ref_targets_whole_block() {
        let step = MutationStep::new("d1", StepWhere::reference("p2"), StepOp::TextDelete);
        let compiled = compile(step).unwrap();
        assert_eq!(compiled.targets[0].address, TextAddress::new("p2", 0, 11));
        assert_eq!(compiled.targets[0].text, "world again");
    }

    #[test]
    fn test_block_id_with_ref_prefix_is_a_node_ref() {
        let snap = Snapshot::new(
            0,
            Arc::new(vec![BlockNode::paragraph(
                "text:intro",
                vec![Inline::text("Opening lines")],
            )]),
        );
        let mut cache = IndexCache::default();
        let settings = MatchSettings::default();
        let mut env = CompileEnv {
            snapshot: &snap,
            cache: &mut cache,
            settings: &settings,
            revision: Revision::new(0),
        };
        let step = MutationStep::new("d1", StepWhere::reference("text:intro"), StepOp::TextDelete);

        let compiled = compile_step(&mut env, &step, &no_domain).unwrap();

        assert_eq!(compiled.targets[0].address, TextAddress::new("text:intro", 0, 13));
        assert_eq!(compiled.targets[0].text, "Opening lines");
    }

    #[test]
    fn test_stale_text_ref_has_moved() {
        let handle = Handle::text(Revision::new(2), &[TextAddress::new("p2", 0, 5)]).unwrap();
        let step = MutationStep::new("d1", StepWhere::reference(handle.reference), StepOp::TextDelete);
        assert_eq!(compile(step).unwrap_err().code(), FailureCode::TargetMoved);
    }

    #[rstest]
    #[case(StepWhere::reference("t1"), FailureCode::InvalidTarget)]
    #[case(StepWhere::reference("nope"), FailureCode::TargetNotFound)]
    #[case(StepWhere::Target { target: TextAddress::new("p2", 5, 40) }, FailureCode::InvalidTarget)]
    #[case(StepWhere::select(Selector::regex(r"world\nworld"), Cardinality::Any), FailureCode::CrossBlockMatch)]
    #[case(StepWhere::select(Selector::text("absent"), Cardinality::First), FailureCode::MatchNotFound)]
    fn test_unresolvable_targets(#[case] at: StepWhere, #[case] code: FailureCode) {
        let step = MutationStep::new("d1", at, StepOp::TextDelete);
        assert_eq!(compile(step).unwrap_err().code(), code);
    }

    #[test]
    fn test_assert_counts_without_cardinality() {
        let step = MutationStep::new(
            "a1",
            StepWhere::select(Selector::text("world"), Cardinality::ExactlyOne),
            StepOp::Assert(AssertArgs { expect_count: 2 }),
        );
        let compiled = compile(step).unwrap();
        assert!(matches!(compiled.op, CompiledOp::Assert { actual_count: 2, .. }));
    }

    #[test]
    fn test_unregistered_domain_op_is_invalid_input() {
        let step = MutationStep::new(
            "x",
            StepWhere::reference("p1"),
            StepOp::Domain {
                name: "citations.renumber".into(),
                args: Value::Null,
            },
        );
        assert_eq!(compile(step).unwrap_err().code(), FailureCode::InvalidInput);
    }

    fn compiled(id: &str, op: CompiledOp, block: &str, start: usize, end: usize) -> CompiledStep {
        CompiledStep {
            id: id.to_string(),
            op_name: String::new(),
            op,
            targets: vec![ResolvedTarget {
                address: TextAddress::new(block, start, end),
                text: String::new(),
                tally: StyleTally::new(),
                formatting: Formatting::default(),
            }],
        }
    }

    fn insert() -> CompiledOp {
        CompiledOp::Insert { text: "x".into() }
    }

    fn style() -> CompiledOp {
        CompiledOp::Style {
            patch: InlinePatch {
                bold: Some(true),
                ..InlinePatch::default()
            },
        }
    }

    #[rstest]
    #[case(CompiledOp::Delete, (0, 5), CompiledOp::Delete, (5, 9), None)]
    #[case(CompiledOp::Delete, (0, 5), CompiledOp::Delete, (4, 9), Some(FailureCode::PlanConflictOverlap))]
    #[case(style(), (0, 5), style(), (2, 4), None)]
    #[case(style(), (0, 5), CompiledOp::Delete, (2, 4), Some(FailureCode::PlanConflictOverlap))]
    #[case(insert(), (3, 3), insert(), (3, 3), Some(FailureCode::InvalidStepCombination))]
    #[case(insert(), (3, 3), CompiledOp::Delete, (0, 5), Some(FailureCode::InvalidStepCombination))]
    #[case(CompiledOp::Delete, (0, 5), insert(), (5, 5), None)]
    #[case(insert(), (3, 3), style(), (0, 5), None)]
    fn test_overlap_rules(
        #[case] first: CompiledOp,
        #[case] a: (usize, usize),
        #[case] second: CompiledOp,
        #[case] b: (usize, usize),
        #[case] expected: Option<FailureCode>,
    ) {
        let steps = vec![
            compiled("s1", first, "p1", a.0, a.1),
            compiled("s2", second, "p1", b.0, b.1),
        ];
        assert_eq!(check_overlaps(&steps).err().map(|err| err.code()), expected);
    }

    #[test]
    fn test_different_blocks_never_conflict() {
        let steps = vec![
            compiled("s1", CompiledOp::Delete, "p1", 0, 5),
            compiled("s2", CompiledOp::Delete, "p2", 0, 5),
        ];
        assert!(check_overlaps(&steps).is_ok());
    }

    #[test]
    fn test_overlap_names_both_steps() {
        let steps = vec![
            compiled("first", CompiledOp::Delete, "p1", 0, 5),
            compiled("second", CompiledOp::Delete, "p1", 1, 2),
        ];
        assert_eq!(
            check_overlaps(&steps).unwrap_err(),
            DocError::PlanConflictOverlap {
                step_id: "second".into(),
                other_step_id: "first".into(),
            }
        );
    }

    #[rstest]
    #[case(MemoryDocument::new(vec![]).without_command(TrackCommand::DeleteTracked), CapabilityReason::MissingCommand)]
    #[case(MemoryDocument::new(vec![]).without_mark_type(TrackMarkType::TrackInsert), CapabilityReason::MissingMarkType)]
    #[case(MemoryDocument::new(vec![]), CapabilityReason::MissingAuthor)]
    fn test_tracked_capabilities(#[case] host: MemoryDocument, #[case] reason: CapabilityReason) {
        let op = StepOp::TextRewrite(RewriteArgs {
            replacement: Replacement { text: "x".into() },
            style: None,
        });
        let err = check_capabilities(&host, ChangeMode::Tracked, [&op], None).unwrap_err();
        assert!(matches!(err, DocError::CapabilityUnavailable { reason: r, .. } if r == reason));

        assert!(check_capabilities(&host, ChangeMode::Direct, [&op], None).is_ok());
    }

    #[test]
    fn test_style_apply_needs_format_tracking_only() {
        let host = MemoryDocument::new(vec![])
            .without_command(TrackCommand::InsertTracked)
            .with_author("Ada", None);
        let author = host.author();
        let op = StepOp::StyleApply(StyleApplyArgs {
            inline: InlinePatch {
                italic: Some(true),
                ..InlinePatch::default()
            },
        });
        assert!(check_capabilities(&host, ChangeMode::Tracked, [&op], author.as_ref()).is_ok());
    }
}
