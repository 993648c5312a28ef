use log::info;

use crate::discovery::{DiscoveryItem, DiscoveryResult, paginate};
use crate::error::DocError;
use crate::host::{Host, TrackCommand};
use crate::plan::{Receipt, ReceiptFailure};
use crate::query::Handle;
use crate::session::DocumentSession;
use crate::session::inputs::TrackChangesListInput;
use crate::tracked::{GroupedTrackedChange, resolve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn command(self) -> TrackCommand {
        match self {
            Decision::Accept => TrackCommand::AcceptChange,
            Decision::Reject => TrackCommand::RejectChange,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }
}

impl<H: Host> DocumentSession<H> {
    /// Grouped tracked changes in document order, optionally filtered by type.
    pub fn track_changes_list(
        &mut self,
        input: &TrackChangesListInput,
    ) -> Result<DiscoveryResult<GroupedTrackedChange>, DocError> {
        let limit = self.options.pages.resolve(input.limit)?;
        let revision = self.revision();
        let items = self
            .tracked_changes()
            .iter()
            .filter(|change| input.change_type.is_none_or(|wanted| wanted == change.change_type))
            .map(|change| DiscoveryItem {
                id: change.derived_id.clone(),
                handle: Handle::entity(change.derived_id.clone()),
                domain: change.clone(),
            })
            .collect();
        Ok(paginate(revision, items, limit, input.offset.unwrap_or(0)))
    }

    /// Look a change up by derived id or raw id.
    pub fn track_changes_get(&mut self, id: &str) -> Result<GroupedTrackedChange, DocError> {
        if id.is_empty() {
            return Err(DocError::invalid_input("tracked change id must not be empty"));
        }
        self.sync();
        let changes = self.tracked_changes();
        resolve(&changes, id)
            .cloned()
            .ok_or_else(|| DocError::target_not_found(format!("tracked change {id}")))
    }

    pub fn track_changes_accept(&mut self, id: &str) -> Result<Receipt, DocError> {
        self.decide(id, Decision::Accept)
    }

    pub fn track_changes_reject(&mut self, id: &str) -> Result<Receipt, DocError> {
        self.decide(id, Decision::Reject)
    }

    pub fn track_changes_accept_all(&mut self) -> Result<Receipt, DocError> {
        self.decide_all(Decision::Accept)
    }

    pub fn track_changes_reject_all(&mut self) -> Result<Receipt, DocError> {
        self.decide_all(Decision::Reject)
    }

    fn decide(&mut self, id: &str, decision: Decision) -> Result<Receipt, DocError> {
        let change = self.track_changes_get(id)?;
        self.require_command(decision.command())?;

        let raw_ids = [change.raw_id.clone()];
        let changed = match decision {
            Decision::Accept => self.host.accept(&raw_ids)?,
            Decision::Reject => self.host.reject(&raw_ids)?,
        };
        self.sync();

        if !changed {
            return Ok(Receipt::failed(ReceiptFailure::no_op(format!(
                "{} of tracked change {id} had no effect",
                decision.verb()
            ))));
        }
        info!("{}ed tracked change {}", decision.verb(), change.derived_id);
        Ok(Receipt::removed(vec![change.address]))
    }

    fn decide_all(&mut self, decision: Decision) -> Result<Receipt, DocError> {
        self.require_command(decision.command())?;
        self.sync();
        let changes = self.tracked_changes();
        if changes.is_empty() {
            return Ok(Receipt::failed(ReceiptFailure::no_op(
                "document has no tracked changes",
            )));
        }

        let changed = match decision {
            Decision::Accept => self.host.accept_all()?,
            Decision::Reject => self.host.reject_all()?,
        };
        self.sync();

        if !changed {
            return Ok(Receipt::failed(ReceiptFailure::no_op(format!(
                "{} all had no effect",
                decision.verb()
            ))));
        }
        info!("{}ed {} tracked changes", decision.verb(), changes.len());
        Ok(Receipt::removed(
            changes.iter().map(|change| change.address.clone()).collect(),
        ))
    }
}
