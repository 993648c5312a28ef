//! Running compiled plans inside one host transaction, and predicting their effect.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{DocError, FailureCode};
use crate::host::{Author, Host, PrimitiveEdit};
use crate::index::{BlockIndex, IndexCache};
use crate::model::{MarkSet, Snapshot, TextAddress, TextRange, TrackedKind};
use crate::plan::compile::{
    CompileEnv, CompiledOp, CompiledStep, ResolvedTarget, check_capabilities, check_overlaps,
    compile_step, count_where,
};
use crate::plan::domain::{DomainContext, DomainRegistry, DomainTarget};
use crate::plan::receipt::{
    MutationsPreviewOutput, PreviewFailure, ReceiptFailure, StepEffect, StepOutcome,
    StepOutcomeData, TextResolution,
};
use crate::plan::step::StepWhere;
use crate::plan::{ChangeMode, Plan};
use crate::query::MatchSettings;
use crate::resolve::{AbsoluteRange, resolve_range, runs_in_range};
use crate::revision::Revision;
use crate::tracked::new_mark;

/// Everything a plan runs against, borrowed from the owning session.
pub struct PlanEnv<'a, H: Host> {
    pub host: &'a mut H,
    pub cache: &'a mut IndexCache,
    pub settings: &'a MatchSettings,
    pub domains: &'a DomainRegistry<H>,
    pub author: Option<Author>,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub steps: Vec<StepOutcome>,
    /// Set when an assert step failed and the plan was rolled back.
    pub failure: Option<ReceiptFailure>,
    pub changed: bool,
    /// Raw ids of tracked marks created by the plan.
    pub new_raw_ids: Vec<String>,
}

/// Per-block record of how earlier steps moved offsets, in pre-plan coordinates.
#[derive(Debug, Default)]
struct ShiftLog {
    blocks: HashMap<String, Vec<(usize, isize)>>,
}

impl ShiftLog {
    fn record(&mut self, block_id: &str, at: usize, delta: isize) {
        if delta != 0 {
            self.blocks
                .entry(block_id.to_string())
                .or_default()
                .push((at, delta));
        }
    }

    /// Where a pre-plan range sits now. A range starting where an earlier edit
    /// ended moves with it; a range ending there does not.
    fn map(&self, address: &TextAddress) -> TextAddress {
        let Some(shifts) = self.blocks.get(&address.block_id) else {
            return address.clone();
        };
        let moved = |offset: usize, applies: &dyn Fn(usize) -> bool| {
            let delta: isize = shifts
                .iter()
                .filter(|(at, _)| applies(*at))
                .map(|(_, delta)| delta)
                .sum();
            offset.saturating_add_signed(delta)
        };
        let range = address.range;
        let start = moved(range.start, &|at| at <= range.start);
        let end = if range.is_empty() {
            start
        } else {
            moved(range.end, &|at| at < range.end)
        };
        TextAddress {
            block_id: address.block_id.clone(),
            range: TextRange::new(start, end),
        }
    }
}

fn char_len(text: &str) -> isize {
    isize::try_from(text.chars().count()).unwrap_or(isize::MAX)
}

fn absolute(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    address: &TextAddress,
) -> Result<AbsoluteRange, DocError> {
    let entry = blocks
        .get(&address.block_id)
        .ok_or_else(|| DocError::target_not_found(address.block_id.clone()))?;
    let node = entry
        .node(snapshot)
        .ok_or_else(|| DocError::target_not_found(address.block_id.clone()))?;
    resolve_range(node, entry.pos, address.range).ok_or_else(|| {
        DocError::invalid_target(format!(
            "range {}..{} no longer resolves inside block {}",
            address.range.start, address.range.end, address.block_id
        ))
    })
}

fn compile_all<H: Host>(
    env: &mut PlanEnv<'_, H>,
    snapshot: &Snapshot,
    plan: &Plan,
    mut on_error: impl FnMut(&str, DocError) -> Result<(), DocError>,
) -> Result<Vec<CompiledStep>, DocError> {
    let domains = env.domains;
    let check_domain = |name: &str, args: &Value| match domains.get(name) {
        Some(op) => op.validate(args),
        None => Err(DocError::invalid_input(format!("unknown operation {name}"))),
    };
    let mut compile_env = CompileEnv {
        snapshot,
        cache: &mut *env.cache,
        settings: env.settings,
        revision: env.revision,
    };
    let mut compiled = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        match compile_step(&mut compile_env, step, &check_domain) {
            Ok(step) => compiled.push(step),
            Err(err) => on_error(&step.id, err)?,
        }
    }
    Ok(compiled)
}

/// Every check `apply_plan` makes before it opens a transaction.
fn prepare<H: Host>(
    env: &mut PlanEnv<'_, H>,
    plan: &Plan,
    mode: ChangeMode,
) -> Result<(Snapshot, Vec<CompiledStep>), DocError> {
    plan.validate()?;
    check_capabilities(
        &*env.host,
        mode,
        plan.steps.iter().map(|step| &step.op),
        env.author.as_ref(),
    )?;

    let snapshot = env.host.snapshot();
    let compiled = compile_all(env, &snapshot, plan, |_, err| Err(err))?;
    check_overlaps(&compiled)?;
    debug!(
        "compiled {} steps against generation {}",
        compiled.len(),
        snapshot.generation()
    );
    Ok((snapshot, compiled))
}

/// Run every pre-apply check and predict each step's outcome, raising the
/// first failure the way `apply_plan` would. Never mutates.
pub fn check_plan<H: Host>(
    mut env: PlanEnv<'_, H>,
    plan: &Plan,
    mode: ChangeMode,
) -> Result<Vec<StepOutcome>, DocError> {
    let (snapshot, compiled) = prepare(&mut env, plan, mode)?;
    let blocks = env.cache.block_index(&snapshot);
    compiled
        .iter()
        .map(|step| predict(&snapshot, &blocks, step, mode).map_err(|err| err.in_step(&step.id)))
        .collect()
}

/// Apply `plan` atomically. Any error leaves the document exactly as it was.
///
/// A failed assert is not an error: the plan is rolled back and the outcome
/// carries a `PRECONDITION_FAILED` failure.
pub fn apply_plan<H: Host>(
    mut env: PlanEnv<'_, H>,
    plan: &Plan,
    mode: ChangeMode,
) -> Result<ExecutionOutcome, DocError> {
    let (_, compiled) = prepare(&mut env, plan, mode)?;

    env.host.begin_transaction()?;
    let mut execution = Execution {
        env: &mut env,
        mode,
        shifts: ShiftLog::default(),
        outcomes: Vec::with_capacity(compiled.len()),
        new_raw_ids: Vec::new(),
    };
    let result = execution.run(&compiled);
    let Execution {
        outcomes,
        new_raw_ids,
        ..
    } = execution;

    match result {
        Ok(None) => {
            let changed = env.host.commit()?;
            info!(
                "applied {} step plan in {mode:?} mode, changed: {changed}",
                outcomes.len()
            );
            Ok(ExecutionOutcome {
                steps: outcomes,
                failure: None,
                changed,
                new_raw_ids,
            })
        }
        Ok(Some(failure)) => {
            env.host.rollback()?;
            warn!("plan rolled back: {}", failure.message);
            Ok(ExecutionOutcome {
                steps: outcomes,
                failure: Some(failure),
                changed: false,
                new_raw_ids: Vec::new(),
            })
        }
        Err(err) => {
            env.host.rollback()?;
            warn!("plan rolled back: {err}");
            Err(err)
        }
    }
}

struct Execution<'e, 'a, H: Host> {
    env: &'e mut PlanEnv<'a, H>,
    mode: ChangeMode,
    shifts: ShiftLog,
    outcomes: Vec<StepOutcome>,
    new_raw_ids: Vec<String>,
}

impl<H: Host> Execution<'_, '_, H> {
    /// Returns the failure of the first assert that did not hold.
    fn run(&mut self, steps: &[CompiledStep]) -> Result<Option<ReceiptFailure>, DocError> {
        for step in steps {
            if let Some(failure) = self.step(step).map_err(|err| err.in_step(&step.id))? {
                return Ok(Some(failure));
            }
        }
        Ok(None)
    }

    fn step(&mut self, step: &CompiledStep) -> Result<Option<ReceiptFailure>, DocError> {
        let (effect, data) = match &step.op {
            CompiledOp::Assert {
                at, expect_count, ..
            } => {
                let actual_count = self.count_now(at)?;
                let held = actual_count == *expect_count;
                self.outcomes.push(StepOutcome {
                    step_id: step.id.clone(),
                    op: step.op_name.clone(),
                    effect: if held {
                        StepEffect::AssertPassed
                    } else {
                        StepEffect::AssertFailed
                    },
                    data: StepOutcomeData::Assert {
                        expected_count: *expect_count,
                        actual_count,
                    },
                });
                if held {
                    return Ok(None);
                }
                return Ok(Some(ReceiptFailure {
                    code: FailureCode::PreconditionFailed,
                    message: format!(
                        "step {} expected {expect_count} matches, found {actual_count}",
                        step.id
                    ),
                    details: Some(json!({
                        "stepId": step.id,
                        "expectedCount": expect_count,
                        "actualCount": actual_count,
                    })),
                }));
            }
            CompiledOp::Domain { name, args } => self.domain(step, name, args)?,
            _ => self.text(step)?,
        };
        self.outcomes.push(StepOutcome {
            step_id: step.id.clone(),
            op: step.op_name.clone(),
            effect,
            data,
        });
        Ok(None)
    }

    fn count_now(&mut self, at: &StepWhere) -> Result<usize, DocError> {
        let snapshot = self.env.host.snapshot();
        let mut compile_env = CompileEnv {
            snapshot: &snapshot,
            cache: &mut *self.env.cache,
            settings: self.env.settings,
            revision: self.env.revision,
        };
        count_where(&mut compile_env, at)
    }

    fn current_range(&mut self, address: &TextAddress) -> Result<AbsoluteRange, DocError> {
        let snapshot = self.env.host.snapshot();
        let blocks = self.env.cache.block_index(&snapshot);
        absolute(&snapshot, &blocks, address)
    }

    fn text(&mut self, step: &CompiledStep) -> Result<(StepEffect, StepOutcomeData), DocError> {
        let mut changed = false;
        let mut resolutions = Vec::with_capacity(step.targets.len());
        for target in &step.targets {
            let current = self.shifts.map(&target.address);
            let range = self.current_range(&current)?;
            changed |= self.edit(&step.op, target, range)?;
            resolutions.push(TextResolution {
                target: target.address.clone(),
                range,
                text: target.text.clone(),
            });
        }
        let effect = if changed {
            StepEffect::Changed
        } else {
            StepEffect::Noop
        };
        let data = match step.op {
            CompiledOp::Style { .. } => StepOutcomeData::Style { resolutions },
            _ => StepOutcomeData::Text { resolutions },
        };
        Ok((effect, data))
    }

    fn edit(
        &mut self,
        op: &CompiledOp,
        target: &ResolvedTarget,
        range: AbsoluteRange,
    ) -> Result<bool, DocError> {
        let block_id = target.address.block_id.as_str();
        let old = target.address.range;
        let old_len = char_len(&target.text);
        let formatted = || MarkSet::with_formatting(target.formatting.clone());

        let (edits, raw_id) = match self.mode {
            ChangeMode::Direct => {
                let edits = match op {
                    CompiledOp::Rewrite { text } => {
                        self.shifts.record(block_id, old.end, char_len(text) - old_len);
                        vec![PrimitiveEdit::ReplaceText {
                            from: range.from,
                            to: range.to,
                            text: text.clone(),
                            marks: formatted(),
                        }]
                    }
                    CompiledOp::Insert { text } => {
                        self.shifts.record(block_id, old.start, char_len(text));
                        vec![PrimitiveEdit::ReplaceText {
                            from: range.from,
                            to: range.from,
                            text: text.clone(),
                            marks: formatted(),
                        }]
                    }
                    CompiledOp::Delete => {
                        self.shifts.record(block_id, old.end, -old_len);
                        vec![PrimitiveEdit::ReplaceText {
                            from: range.from,
                            to: range.to,
                            text: String::new(),
                            marks: MarkSet::default(),
                        }]
                    }
                    CompiledOp::Style { patch } => vec![PrimitiveEdit::SetMarks {
                        from: range.from,
                        to: range.to,
                        patch: patch.clone(),
                        track: None,
                    }],
                    CompiledOp::Assert { .. } | CompiledOp::Domain { .. } => {
                        return Err(DocError::internal("not a text edit"));
                    }
                };
                (edits, None)
            }
            ChangeMode::Tracked => {
                let author = self
                    .env
                    .author
                    .as_ref()
                    .ok_or_else(|| DocError::internal("tracked edit without an author"))?;
                let raw_id = Uuid::new_v4().to_string();
                let inserted = |text: &str| PrimitiveEdit::ReplaceText {
                    from: range.to,
                    to: range.to,
                    text: text.to_string(),
                    marks: MarkSet {
                        tracked: vec![new_mark(TrackedKind::Insert, raw_id.as_str(), author)],
                        ..formatted()
                    },
                };
                let deleted = || PrimitiveEdit::AddTrackedMark {
                    from: range.from,
                    to: range.to,
                    mark: new_mark(TrackedKind::Delete, raw_id.as_str(), author),
                };
                let edits = match op {
                    // new text goes after the old, which stays in place marked deleted
                    CompiledOp::Rewrite { text } => {
                        self.shifts.record(block_id, old.end, char_len(text));
                        vec![inserted(text), deleted()]
                    }
                    CompiledOp::Insert { text } => {
                        self.shifts.record(block_id, old.start, char_len(text));
                        vec![inserted(text)]
                    }
                    CompiledOp::Delete => vec![deleted()],
                    CompiledOp::Style { patch } => vec![PrimitiveEdit::SetMarks {
                        from: range.from,
                        to: range.to,
                        patch: patch.clone(),
                        track: Some(new_mark(TrackedKind::Format, raw_id.as_str(), author)),
                    }],
                    CompiledOp::Assert { .. } | CompiledOp::Domain { .. } => {
                        return Err(DocError::internal("not a text edit"));
                    }
                };
                (edits, Some(raw_id))
            }
        };

        let mut changed = false;
        for edit in &edits {
            changed |= self.env.host.apply_edit(edit)?;
        }
        if changed && let Some(raw_id) = raw_id {
            self.new_raw_ids.push(raw_id);
        }
        Ok(changed)
    }

    fn domain(
        &mut self,
        step: &CompiledStep,
        name: &str,
        args: &Value,
    ) -> Result<(StepEffect, StepOutcomeData), DocError> {
        let domains = self.env.domains;
        let op = domains
            .get(name)
            .ok_or_else(|| DocError::invalid_input(format!("unknown operation {name}")))?;
        let mut targets = Vec::with_capacity(step.targets.len());
        for target in &step.targets {
            let address = self.shifts.map(&target.address);
            targets.push(DomainTarget {
                range: self.current_range(&address)?,
                address,
                text: target.text.clone(),
            });
        }
        let ctx = DomainContext {
            host: &mut *self.env.host,
            targets: &targets,
            change_mode: self.mode,
            author: self.env.author.as_ref(),
        };
        let effect = op.execute(ctx, args)?;
        debug!("domain op {name} changed: {}", effect.changed);
        let outcome = if effect.changed {
            StepEffect::Changed
        } else {
            StepEffect::Noop
        };
        Ok((
            outcome,
            StepOutcomeData::Domain {
                result: effect.result,
            },
        ))
    }
}

/// Validate and compile `plan` and predict each step's effect. Never mutates.
pub fn preview_plan<H: Host>(
    mut env: PlanEnv<'_, H>,
    plan: &Plan,
    mode: ChangeMode,
) -> MutationsPreviewOutput {
    let evaluated_revision = env.revision;
    let mut failures = Vec::new();

    if let Err(err) = plan.validate() {
        failures.push(PreviewFailure::from_error(None, &err));
        return MutationsPreviewOutput {
            evaluated_revision,
            valid: false,
            change_mode: mode,
            steps: Vec::new(),
            failures,
        };
    }
    if let Err(err) = check_capabilities(
        &*env.host,
        mode,
        plan.steps.iter().map(|step| &step.op),
        env.author.as_ref(),
    ) {
        failures.push(PreviewFailure::from_error(None, &err));
    }

    let snapshot = env.host.snapshot();
    let compiled = compile_all(&mut env, &snapshot, plan, |step_id, err| {
        failures.push(PreviewFailure::from_error(Some(step_id), &err));
        Ok(())
    })
    .unwrap_or_default();
    if let Err(err) = check_overlaps(&compiled) {
        let step_id = match &err {
            DocError::PlanConflictOverlap { step_id, .. }
            | DocError::InvalidStepCombination { step_id, .. } => Some(step_id.as_str()),
            _ => None,
        };
        failures.push(PreviewFailure::from_error(step_id, &err));
    }

    let blocks = env.cache.block_index(&snapshot);
    let mut steps = Vec::with_capacity(compiled.len());
    for step in &compiled {
        match predict(&snapshot, &blocks, step, mode) {
            Ok(outcome) => steps.push(outcome),
            Err(err) => failures.push(PreviewFailure::from_error(Some(&step.id), &err)),
        }
    }

    let assert_failed = steps
        .iter()
        .any(|step| step.effect == StepEffect::AssertFailed);
    debug!(
        "previewed {} steps at revision {evaluated_revision}: {} failures",
        steps.len(),
        failures.len()
    );
    MutationsPreviewOutput {
        evaluated_revision,
        valid: failures.is_empty() && !assert_failed,
        change_mode: mode,
        steps,
        failures,
    }
}

fn predict(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    step: &CompiledStep,
    mode: ChangeMode,
) -> Result<StepOutcome, DocError> {
    let effect_of = |changes: bool| {
        if changes {
            StepEffect::Changed
        } else {
            StepEffect::Noop
        }
    };
    let (effect, data) = match &step.op {
        CompiledOp::Assert {
            expect_count,
            actual_count,
            ..
        } => (
            if expect_count == actual_count {
                StepEffect::AssertPassed
            } else {
                StepEffect::AssertFailed
            },
            StepOutcomeData::Assert {
                expected_count: *expect_count,
                actual_count: *actual_count,
            },
        ),
        CompiledOp::Domain { .. } => (
            StepEffect::Changed,
            StepOutcomeData::Domain {
                result: Value::Null,
            },
        ),
        CompiledOp::Style { patch } => {
            let satisfied = step.targets.iter().all(|target| {
                blocks
                    .get(&target.address.block_id)
                    .and_then(|entry| entry.node(snapshot))
                    .is_some_and(|node| {
                        runs_in_range(node, target.address.range)
                            .iter()
                            .all(|(run, _)| patch.is_satisfied_by(&run.marks.formatting))
                    })
            });
            (
                effect_of(!satisfied),
                StepOutcomeData::Style {
                    resolutions: resolutions(snapshot, blocks, step)?,
                },
            )
        }
        CompiledOp::Rewrite { text } => {
            let unchanged = mode == ChangeMode::Direct
                && step.targets.iter().all(|target| {
                    target.text == *text
                        && target.tally.is_uniform()
                        && target.tally.first() == target.formatting
                });
            (effect_of(!unchanged), text_data(snapshot, blocks, step)?)
        }
        CompiledOp::Insert { .. } => (effect_of(true), text_data(snapshot, blocks, step)?),
        CompiledOp::Delete => {
            let any = step.targets.iter().any(|t| !t.address.range.is_empty());
            (effect_of(any), text_data(snapshot, blocks, step)?)
        }
    };
    Ok(StepOutcome {
        step_id: step.id.clone(),
        op: step.op_name.clone(),
        effect,
        data,
    })
}

fn resolutions(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    step: &CompiledStep,
) -> Result<Vec<TextResolution>, DocError> {
    step.targets
        .iter()
        .map(|target| {
            Ok(TextResolution {
                target: target.address.clone(),
                range: absolute(snapshot, blocks, &target.address)?,
                text: target.text.clone(),
            })
        })
        .collect()
}

fn text_data(
    snapshot: &Snapshot,
    blocks: &BlockIndex,
    step: &CompiledStep,
) -> Result<StepOutcomeData, DocError> {
    Ok(StepOutcomeData::Text {
        resolutions: resolutions(snapshot, blocks, step)?,
    })
}
