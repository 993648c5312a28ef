use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use crate::host::edit::{apply_primitive, replace_text, resolve_tracked};
use crate::host::markdown::MarkdownImporter;
use crate::host::{
    Author, CapabilityContext, ChangeTracking, DocumentTree, EditOrigin, EventKind, HostError,
    PrimitiveEdit, TrackCommand, TrackMarkType, TransactionId, TreeEvent,
};
use crate::model::{BlockNode, MarkSet, Snapshot};

struct OpenTransaction {
    id: TransactionId,
    base_blocks: Arc<Vec<BlockNode>>,
    base_generation: u64,
}

/// In-memory document tree with copy-on-write snapshots.
///
/// Every content change produces a new generation. Generations are never handed
/// out twice, so a snapshot's generation identifies its content exactly. Rolling
/// back a transaction restores the pre-transaction blocks and generation.
///
/// ```rust
/// # use docplan_engine::host::{DocumentTree, MemoryDocument, PrimitiveEdit};
/// # use docplan_engine::model::MarkSet;
/// let mut doc = MemoryDocument::from_markdown("Hello world");
/// let before = doc.snapshot();
///
/// doc.begin_transaction().unwrap();
/// doc.apply_edit(&PrimitiveEdit::ReplaceText {
///     from: 7,
///     to: 12,
///     text: "Earth".to_string(),
///     marks: MarkSet::default(),
/// })
/// .unwrap();
/// doc.rollback().unwrap();
///
/// assert_eq!(doc.snapshot().generation(), before.generation());
/// assert_eq!(doc.snapshot().blocks()[0].flattened_text(), "Hello world");
/// ```
pub struct MemoryDocument {
    blocks: Arc<Vec<BlockNode>>,
    generation: u64,
    next_generation: u64,
    next_transaction: TransactionId,
    open: Option<OpenTransaction>,
    selection: (usize, usize),
    events: Vec<TreeEvent>,
    commands: BTreeSet<TrackCommand>,
    mark_types: BTreeSet<TrackMarkType>,
    author: Option<Author>,
}

impl MemoryDocument {
    /// A document with every tracked-mode command and mark type registered and no author.
    pub fn new(blocks: Vec<BlockNode>) -> Self {
        Self {
            blocks: Arc::new(blocks),
            generation: 0,
            next_generation: 1,
            next_transaction: 1,
            open: None,
            selection: (0, 0),
            events: Vec::new(),
            commands: [
                TrackCommand::InsertTracked,
                TrackCommand::DeleteTracked,
                TrackCommand::FormatTracked,
                TrackCommand::AcceptChange,
                TrackCommand::RejectChange,
            ]
            .into_iter()
            .collect(),
            mark_types: [
                TrackMarkType::TrackInsert,
                TrackMarkType::TrackDelete,
                TrackMarkType::TrackFormat,
            ]
            .into_iter()
            .collect(),
            author: None,
        }
    }

    pub fn from_markdown(markdown: &str) -> Self {
        Self::new(MarkdownImporter::import(markdown))
    }

    pub fn from_markdown_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::from_markdown(text))
    }

    pub fn with_author(mut self, name: impl Into<String>, email: Option<&str>) -> Self {
        self.author = Some(Author {
            name: name.into(),
            email: email.map(str::to_string),
        });
        self
    }

    pub fn without_command(mut self, command: TrackCommand) -> Self {
        self.commands.remove(&command);
        self
    }

    pub fn without_mark_type(mut self, mark_type: TrackMarkType) -> Self {
        self.mark_types.remove(&mark_type);
        self
    }

    pub fn selection(&self) -> (usize, usize) {
        self.selection
    }

    /// Merge a collaborator's edits. The merge is reported through both the
    /// transaction and the sync notification paths.
    pub fn apply_remote(&mut self, edits: &[PrimitiveEdit]) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Remote, 2, |blocks| {
            for edit in edits {
                apply_primitive(blocks, edit)?;
            }
            Ok(())
        })
    }

    /// Simulate a user typing `text` at absolute position `at`.
    pub fn type_text(&mut self, at: usize, text: &str) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Local, 1, |blocks| {
            replace_text(blocks, at, at, text, &MarkSet::default()).map(|_| ())
        })
    }

    fn allocate_transaction(&mut self) -> TransactionId {
        let id = self.next_transaction;
        self.next_transaction += 1;
        id
    }

    fn bump_generation(&mut self) {
        self.generation = self.next_generation;
        self.next_generation += 1;
    }

    fn emit(&mut self, transaction: TransactionId, kind: EventKind, origin: EditOrigin) {
        self.events.push(TreeEvent {
            transaction,
            kind,
            origin,
        });
    }

    fn run_standalone(
        &mut self,
        origin: EditOrigin,
        notifications: usize,
        change: impl FnOnce(&mut Vec<BlockNode>) -> Result<(), HostError>,
    ) -> Result<bool, HostError> {
        if let Some(open) = &self.open {
            return Err(HostError::TransactionOpen(open.id));
        }

        let mut next = self.blocks.as_ref().clone();
        change(&mut next)?;
        if next == *self.blocks {
            return Ok(false);
        }

        let transaction = self.allocate_transaction();
        self.blocks = Arc::new(next);
        self.bump_generation();
        for _ in 0..notifications {
            self.emit(transaction, EventKind::ContentChanged, origin);
        }
        debug!(
            "{origin:?} transaction {transaction} produced generation {}",
            self.generation
        );
        Ok(true)
    }
}

impl DocumentTree for MemoryDocument {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.generation, Arc::clone(&self.blocks))
    }

    fn begin_transaction(&mut self) -> Result<TransactionId, HostError> {
        if let Some(open) = &self.open {
            return Err(HostError::TransactionOpen(open.id));
        }
        let id = self.allocate_transaction();
        self.open = Some(OpenTransaction {
            id,
            base_blocks: Arc::clone(&self.blocks),
            base_generation: self.generation,
        });
        Ok(id)
    }

    fn apply_edit(&mut self, edit: &PrimitiveEdit) -> Result<bool, HostError> {
        if self.open.is_none() {
            return Err(HostError::NoTransaction);
        }
        let blocks: &mut Vec<BlockNode> = Arc::make_mut(&mut self.blocks);
        let changed = apply_primitive(blocks, edit)?;
        if changed {
            self.bump_generation();
        }
        Ok(changed)
    }

    fn commit(&mut self) -> Result<bool, HostError> {
        let open = self.open.take().ok_or(HostError::NoTransaction)?;
        let changed = self.generation != open.base_generation;
        if changed {
            self.emit(open.id, EventKind::ContentChanged, EditOrigin::Programmatic);
        } else {
            // no edit changed anything; drop the copy made by make_mut
            self.blocks = open.base_blocks;
        }
        Ok(changed)
    }

    fn rollback(&mut self) -> Result<(), HostError> {
        let open = self.open.take().ok_or(HostError::NoTransaction)?;
        self.blocks = open.base_blocks;
        self.generation = open.base_generation;
        Ok(())
    }

    fn set_selection(&mut self, from: usize, to: usize) {
        self.selection = (from, to);
        let transaction = self.allocate_transaction();
        self.emit(transaction, EventKind::SelectionChanged, EditOrigin::Local);
    }

    fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ChangeTracking for MemoryDocument {
    fn accept(&mut self, raw_ids: &[String]) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Programmatic, 1, |blocks| {
            resolve_tracked(blocks, &|id| raw_ids.iter().any(|raw| raw == id), true);
            Ok(())
        })
    }

    fn reject(&mut self, raw_ids: &[String]) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Programmatic, 1, |blocks| {
            resolve_tracked(blocks, &|id| raw_ids.iter().any(|raw| raw == id), false);
            Ok(())
        })
    }

    fn accept_all(&mut self) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Programmatic, 1, |blocks| {
            resolve_tracked(blocks, &|_| true, true);
            Ok(())
        })
    }

    fn reject_all(&mut self) -> Result<bool, HostError> {
        self.run_standalone(EditOrigin::Programmatic, 1, |blocks| {
            resolve_tracked(blocks, &|_| true, false);
            Ok(())
        })
    }
}

impl CapabilityContext for MemoryDocument {
    fn has_command(&self, command: TrackCommand) -> bool {
        self.commands.contains(&command)
    }

    fn has_mark_type(&self, mark_type: TrackMarkType) -> bool {
        self.mark_types.contains(&mark_type)
    }

    fn author(&self) -> Option<Author> {
        self.author.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Inline;
    use pretty_assertions::assert_eq;

    fn hello() -> MemoryDocument {
        MemoryDocument::new(vec![BlockNode::paragraph(
            "p1",
            vec![Inline::text("Hello world")],
        )])
    }

    fn rewrite(from: usize, to: usize, text: &str) -> PrimitiveEdit {
        PrimitiveEdit::ReplaceText {
            from,
            to,
            text: text.to_string(),
            marks: MarkSet::default(),
        }
    }

    #[test]
    fn test_edits_require_a_transaction() {
        let mut doc = hello();
        assert_eq!(doc.apply_edit(&rewrite(1, 6, "Hi")), Err(HostError::NoTransaction));
    }

    #[test]
    fn test_commit_reports_one_content_event() {
        let mut doc = hello();
        let txn = doc.begin_transaction().unwrap();
        assert!(doc.apply_edit(&rewrite(1, 6, "Howdy")).unwrap());
        assert!(doc.apply_edit(&rewrite(7, 12, "Earth")).unwrap());
        assert!(doc.commit().unwrap());

        assert_eq!(doc.snapshot().blocks()[0].flattened_text(), "Howdy Earth");
        assert_eq!(
            doc.take_events(),
            vec![TreeEvent {
                transaction: txn,
                kind: EventKind::ContentChanged,
                origin: EditOrigin::Programmatic,
            }]
        );
        assert!(doc.take_events().is_empty());
    }

    #[test]
    fn test_rollback_restores_the_exact_snapshot() {
        let mut doc = hello();
        let before = doc.snapshot();

        doc.begin_transaction().unwrap();
        doc.apply_edit(&rewrite(1, 6, "Bye")).unwrap();
        doc.rollback().unwrap();

        let after = doc.snapshot();
        assert_eq!(after.generation(), before.generation());
        assert!(after.shares_content_with(&before));
        assert!(doc.take_events().is_empty());
    }

    #[test]
    fn test_generations_are_not_reused_after_rollback() {
        let mut doc = hello();
        doc.begin_transaction().unwrap();
        doc.apply_edit(&rewrite(1, 6, "Bye")).unwrap();
        let abandoned = doc.snapshot().generation();
        doc.rollback().unwrap();

        doc.begin_transaction().unwrap();
        doc.apply_edit(&rewrite(1, 6, "Hey")).unwrap();
        doc.commit().unwrap();

        assert_ne!(doc.snapshot().generation(), abandoned);
    }

    #[test]
    fn test_unchanged_commit_keeps_generation() {
        let mut doc = hello();
        let before = doc.snapshot();
        doc.begin_transaction().unwrap();
        assert!(!doc.apply_edit(&rewrite(1, 6, "Hello")).unwrap());
        assert!(!doc.commit().unwrap());

        assert_eq!(doc.snapshot().generation(), before.generation());
        assert!(doc.take_events().is_empty());
    }

    #[test]
    fn test_remote_merge_is_reported_twice_with_one_transaction() {
        let mut doc = hello();
        assert!(doc.apply_remote(&[rewrite(12, 12, "!")]).unwrap());

        let events = doc.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
        assert_eq!(events[0].origin, EditOrigin::Remote);
    }

    #[test]
    fn test_selection_changes_do_not_touch_content() {
        let mut doc = hello();
        let generation = doc.snapshot().generation();
        doc.set_selection(1, 3);

        assert_eq!(doc.selection(), (1, 3));
        assert_eq!(doc.snapshot().generation(), generation);
        assert_eq!(doc.take_events()[0].kind, EventKind::SelectionChanged);
    }

    #[test]
    fn test_standalone_changes_refuse_open_transactions() {
        let mut doc = hello();
        let txn = doc.begin_transaction().unwrap();
        assert_eq!(doc.type_text(1, "x"), Err(HostError::TransactionOpen(txn)));
        assert_eq!(doc.accept_all(), Err(HostError::TransactionOpen(txn)));
    }

    #[test]
    fn test_capabilities_can_be_withdrawn() {
        let doc = hello()
            .without_command(TrackCommand::InsertTracked)
            .without_mark_type(TrackMarkType::TrackDelete)
            .with_author("Ada", Some("ada@example.com"));

        assert!(!doc.has_command(TrackCommand::InsertTracked));
        assert!(doc.has_command(TrackCommand::AcceptChange));
        assert!(!doc.has_mark_type(TrackMarkType::TrackDelete));
        assert_eq!(doc.author().unwrap().email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_from_markdown_bytes_rejects_invalid_utf8() {
        assert!(MemoryDocument::from_markdown_bytes(&[0xff, 0xfe]).is_err());
        assert!(MemoryDocument::from_markdown_bytes(b"# Title").is_ok());
    }
}
