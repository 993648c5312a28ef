/*!
 * # Document Sessions
 *
 * `DocumentSession` is the public surface of the engine for one document. It owns
 * the host, the revision guard and the per-snapshot caches, and exposes:
 *
 * - **Discovery**: `find`, `query_match`, `get_node`, `get_node_by_id`, `info`
 * - **Mutation**: `write`, `format_apply`, `mutations_apply`, `mutations_preview`
 * - **Tracked changes**: `track_changes_list`, `track_changes_get` and the
 *   accept/reject family
 *
 * Every operation first drains the host's change notifications, so edits made
 * behind the session's back (typing, collaborator merges) advance the revision
 * before anything is checked against it.
 */

pub mod info;
pub mod inputs;
mod track_changes;

use std::rc::Rc;

use log::debug;

use crate::discovery::{DiscoveryItem, DiscoveryResult, PageInfo, PageLimits, paginate};
use crate::error::{CapabilityReason, DocError};
use crate::host::{Author, Host, TrackCommand};
use crate::index::IndexCache;
use crate::model::{EntityAddress, NodeAddress, NodeType};
use crate::plan::step::{InsertArgs, Replacement, RewriteArgs, StyleApplyArgs};
use crate::plan::{
    ChangeMode, DomainOp, DomainRegistry, MutationStep, MutationsPreviewOutput, Plan, PlanEnv,
    PlanReceipt, ReceiptFailure, RevisionSpan, StepEffect, StepOp, StepOutcomeData, StepWhere,
    TextMutationReceipt, apply_plan, check_plan, preview_plan,
};
use crate::query::{
    Handle, MatchCandidate, MatchQuery, MatchSettings, NodeInfo, StyleTally, find_matches,
};
use crate::revision::{Revision, RevisionGuard};
use crate::tracked::{GroupedTrackedChange, TrackedChangeCache};

pub use info::{CapabilitySummary, DocumentCounts, DocumentInfo, OutlineEntry};
pub use inputs::{
    FindInput, FormatRequest, QueryMatchInput, QueryMatchItem, QueryMatchOutput,
    TrackChangesListInput, WriteOp, WriteRequest,
};

/// Step id used for the single-step plans behind `write` and `format_apply`.
const SINGLE_STEP_ID: &str = "write";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Used when a request does not name a change mode.
    pub change_mode: ChangeMode,
    /// Overrides the host's author for tracked edits.
    pub author: Option<Author>,
    pub matching: MatchSettings,
    pub pages: PageLimits,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            change_mode: ChangeMode::Direct,
            author: None,
            matching: MatchSettings::default(),
            pages: PageLimits::default(),
        }
    }
}

impl From<&docplan_config::Config> for SessionOptions {
    fn from(config: &docplan_config::Config) -> Self {
        Self {
            change_mode: config.change_mode.into(),
            author: config.author.clone().map(Author::from),
            matching: MatchSettings::from(&config.matching),
            pages: PageLimits::from(&config.discovery),
        }
    }
}

pub struct DocumentSession<H: Host> {
    host: H,
    guard: RevisionGuard,
    index: IndexCache,
    tracked: TrackedChangeCache,
    options: SessionOptions,
    domains: DomainRegistry<H>,
}

impl<H: Host> DocumentSession<H> {
    pub fn new(host: H) -> Self {
        Self::with_options(host, SessionOptions::default())
    }

    /// Start a session at revision 0. Notifications the host queued before the
    /// session existed are discarded.
    pub fn with_options(mut host: H, options: SessionOptions) -> Self {
        let mut guard = RevisionGuard::new();
        guard.init();
        guard.track();
        let pending = host.take_events();
        if !pending.is_empty() {
            debug!("discarding {} notifications from before the session", pending.len());
        }
        Self {
            host,
            guard,
            index: IndexCache::default(),
            tracked: TrackedChangeCache::default(),
            options,
            domains: DomainRegistry::default(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Direct access to the host. Edits made through it are picked up by the
    /// next session call.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn revision(&mut self) -> Revision {
        self.sync();
        self.guard.current()
    }

    pub fn register_domain_op(&mut self, name: &str, op: Box<dyn DomainOp<H>>) -> Result<(), DocError> {
        self.domains.register(name, op)
    }

    /// The identity tracked edits are attributed to.
    pub fn author(&self) -> Option<Author> {
        self.options.author.clone().or_else(|| self.host.author())
    }

    /// Index builds so far, for observing cache behaviour.
    pub fn index_builds(&self) -> usize {
        self.index.builds()
    }

    /// Tracked-change groupings built so far.
    pub fn tracked_builds(&self) -> usize {
        self.tracked.builds()
    }

    fn sync(&mut self) {
        let events = self.host.take_events();
        if self.guard.observe(&events) > 0 {
            self.index.invalidate();
            self.tracked.invalidate();
        }
    }

    fn plan_env(&mut self) -> PlanEnv<'_, H> {
        let author = self.author();
        PlanEnv {
            host: &mut self.host,
            cache: &mut self.index,
            settings: &self.options.matching,
            domains: &self.domains,
            author,
            revision: self.guard.current(),
        }
    }

    fn tracked_changes(&mut self) -> Rc<Vec<GroupedTrackedChange>> {
        let snapshot = self.host.snapshot();
        let blocks = self.index.block_index(&snapshot);
        self.tracked.get(&snapshot, &blocks)
    }

    fn require_command(&self, command: TrackCommand) -> Result<(), DocError> {
        if self.host.has_command(command) {
            return Ok(());
        }
        Err(DocError::CapabilityUnavailable {
            reason: CapabilityReason::MissingCommand,
            message: format!("host does not register the {command:?} command"),
        })
    }

    fn run_query(
        &mut self,
        select: &crate::query::Selector,
        within: Option<&NodeAddress>,
        include_nodes: bool,
    ) -> Result<crate::query::MatchSet, DocError> {
        let snapshot = self.host.snapshot();
        let query = MatchQuery {
            select: Some(select.clone()),
            within: within.cloned(),
            include_nodes,
        };
        find_matches(&snapshot, &mut self.index, &query, &self.options.matching)
    }

    /// Every match for a selector, paginated.
    pub fn find(&mut self, input: &FindInput) -> Result<DiscoveryResult<MatchCandidate>, DocError> {
        let limit = self.options.pages.resolve(input.limit)?;
        let revision = self.revision();
        let set = self.run_query(&input.select, input.within.as_ref(), input.include_nodes)?;
        let items = set
            .matches
            .into_iter()
            .map(|candidate| {
                let (id, handle) = handle_for(revision, &candidate)?;
                Ok(DiscoveryItem {
                    id,
                    handle,
                    domain: candidate,
                })
            })
            .collect::<Result<Vec<_>, DocError>>()?;
        Ok(paginate(revision, items, limit, input.offset.unwrap_or(0)))
    }

    /// Match a selector and enforce a cardinality requirement on the full,
    /// unpaginated result.
    pub fn query_match(&mut self, input: &QueryMatchInput) -> Result<QueryMatchOutput, DocError> {
        input.require.check_pagination(input.limit, input.offset)?;
        let limit = self.options.pages.resolve(input.limit)?;
        let offset = input.offset.unwrap_or(0);
        let revision = self.revision();

        let set = self.run_query(&input.select, input.within.as_ref(), input.include_nodes)?;
        let total = set.total();
        let matches = input.require.enforce(set.matches, &input.select.describe())?;

        let snapshot = self.host.snapshot();
        let blocks = self.index.block_index(&snapshot);
        let items = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|candidate| {
                let (id, handle) = handle_for(revision, &candidate)?;
                let style = (input.include_style && candidate.is_text()).then(|| {
                    StyleTally::over_ranges(&snapshot, &blocks, &candidate.text_ranges).summary()
                });
                Ok(QueryMatchItem {
                    id,
                    handle,
                    candidate,
                    style,
                })
            })
            .collect::<Result<Vec<_>, DocError>>()?;

        Ok(QueryMatchOutput {
            evaluated_revision: revision,
            total,
            page: PageInfo {
                limit,
                offset,
                returned: items.len(),
            },
            matches: items,
            diagnostics: set.diagnostics,
        })
    }

    pub fn get_node(&mut self, address: &NodeAddress) -> Result<NodeInfo, DocError> {
        self.sync();
        let snapshot = self.host.snapshot();
        crate::query::get_node(&snapshot, &mut self.index, address)
    }

    pub fn get_node_by_id(&mut self, id: &str, node_type: Option<NodeType>) -> Result<NodeInfo, DocError> {
        if id.is_empty() {
            return Err(DocError::invalid_input("node id must not be empty"));
        }
        self.sync();
        let snapshot = self.host.snapshot();
        crate::query::get_node_by_id(&snapshot, &mut self.index, id, node_type)
    }

    pub fn mutations_apply(&mut self, plan: &Plan) -> Result<PlanReceipt, DocError> {
        self.sync();
        self.guard.check(plan.expected_revision.as_deref())?;
        let before = self.guard.current();
        let mode = plan.change_mode.unwrap_or(self.options.change_mode);

        let outcome = apply_plan(self.plan_env(), plan, mode)?;

        self.sync();
        let inserted = if outcome.new_raw_ids.is_empty() {
            Vec::new()
        } else {
            self.tracked_addresses(&outcome.new_raw_ids)
        };
        Ok(PlanReceipt {
            success: outcome.failure.is_none(),
            change_mode: mode,
            revision: RevisionSpan {
                before,
                after: self.guard.current(),
            },
            steps: outcome.steps,
            inserted,
            failure: outcome.failure,
        })
    }

    /// Report what `mutations_apply` would do. Only a stale `expected_revision`
    /// is raised; every other problem is listed in the output.
    pub fn mutations_preview(&mut self, plan: &Plan) -> Result<MutationsPreviewOutput, DocError> {
        self.sync();
        self.guard.check(plan.expected_revision.as_deref())?;
        let mode = plan.change_mode.unwrap_or(self.options.change_mode);
        Ok(preview_plan(self.plan_env(), plan, mode))
    }

    /// Insert, replace or delete text at one target.
    pub fn write(&mut self, request: &WriteRequest) -> Result<TextMutationReceipt, DocError> {
        let op = match (request.op, &request.text) {
            (WriteOp::Delete, Some(_)) => {
                return Err(DocError::invalid_input("delete does not take text"));
            }
            (WriteOp::Delete, None) => StepOp::TextDelete,
            (WriteOp::Insert, Some(text)) => StepOp::TextInsert(InsertArgs {
                text: text.clone(),
                position: request.position,
            }),
            (WriteOp::Replace, Some(text)) => StepOp::TextRewrite(RewriteArgs {
                replacement: Replacement { text: text.clone() },
                style: None,
            }),
            (op, None) => {
                return Err(DocError::invalid_input(format!("{op:?} needs text")));
            }
        };
        self.single_step(
            request.target.clone(),
            op,
            request.change_mode,
            request.dry_run,
            request.expected_revision.as_deref(),
        )
    }

    /// Apply inline formatting to one target.
    pub fn format_apply(&mut self, request: &FormatRequest) -> Result<TextMutationReceipt, DocError> {
        self.single_step(
            request.target.clone(),
            StepOp::StyleApply(StyleApplyArgs {
                inline: request.inline.clone(),
            }),
            request.change_mode,
            request.dry_run,
            request.expected_revision.as_deref(),
        )
    }

    fn single_step(
        &mut self,
        at: StepWhere,
        op: StepOp,
        change_mode: Option<ChangeMode>,
        dry_run: bool,
        expected_revision: Option<&str>,
    ) -> Result<TextMutationReceipt, DocError> {
        self.sync();
        self.guard.check(expected_revision)?;
        let before = self.guard.current();
        let mode = change_mode.unwrap_or(self.options.change_mode);
        let plan = Plan::new(vec![MutationStep::new(SINGLE_STEP_ID, at, op)]).with_change_mode(mode);

        let (steps, new_raw_ids) = if dry_run {
            let steps = check_plan(self.plan_env(), &plan, mode).map_err(without_step)?;
            (steps, Vec::new())
        } else {
            let outcome = apply_plan(self.plan_env(), &plan, mode).map_err(without_step)?;
            (outcome.steps, outcome.new_raw_ids)
        };
        self.sync();

        let step = steps
            .into_iter()
            .next()
            .ok_or_else(|| DocError::internal("single-step plan produced no outcome"))?;
        let failure = (step.effect == StepEffect::Noop)
            .then(|| ReceiptFailure::no_op("target already holds the requested content"));
        let resolution = match step.data {
            StepOutcomeData::Text { resolutions } | StepOutcomeData::Style { resolutions } => {
                resolutions.into_iter().next()
            }
            _ => None,
        };
        let inserted = if new_raw_ids.is_empty() {
            Vec::new()
        } else {
            self.tracked_addresses(&new_raw_ids)
        };

        Ok(TextMutationReceipt {
            success: failure.is_none(),
            dry_run,
            revision: RevisionSpan {
                before,
                after: self.guard.current(),
            },
            resolution,
            inserted,
            failure,
        })
    }

    fn tracked_addresses(&mut self, raw_ids: &[String]) -> Vec<EntityAddress> {
        self.tracked_changes()
            .iter()
            .filter(|change| raw_ids.contains(&change.raw_id))
            .map(|change| change.address.clone())
            .collect()
    }
}

/// Single-step operations report errors as their own, not as a plan step's.
fn without_step(err: DocError) -> DocError {
    match err {
        DocError::Step { source, .. } => *source,
        other => other,
    }
}

/// Discovery id and handle for one match.
fn handle_for(revision: Revision, candidate: &MatchCandidate) -> Result<(String, Handle), DocError> {
    if let Some(first) = candidate.text_ranges.first() {
        let id = format!("{}:{}-{}", first.block_id, first.range.start, first.range.end);
        return Ok((id, Handle::text(revision, &candidate.text_ranges)?));
    }
    // identified inline nodes, such as images, keep their id across revisions
    if let Some(id) = candidate.node.as_ref().and_then(|node| node.id.clone()) {
        return Ok((id.clone(), Handle::node(id)));
    }
    match &candidate.address {
        NodeAddress::Block { node_id, .. } => Ok((node_id.clone(), Handle::node(node_id.clone()))),
        NodeAddress::Inline { node_type, anchor } => {
            let id = format!(
                "{node_type}@{}:{}-{}",
                anchor.start.block_id, anchor.start.offset, anchor.end.offset
            );
            Ok((id, Handle::inline(revision, &candidate.address)?))
        }
    }
}
