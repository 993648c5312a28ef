/*!
 * # Host Document Interfaces
 *
 * The engine never owns a document tree. It reads snapshots and issues primitive
 * edits through three traits that a host document representation implements:
 *
 * - **`DocumentTree`**: snapshots, reversible transactions, primitive edits and
 *   change notifications
 * - **`ChangeTracking`**: accept or reject tracked marks by raw id
 * - **`CapabilityContext`**: which tracked-mode commands and mark types are
 *   registered, and who the active author is
 *
 * `MemoryDocument` is the in-process implementation used by the session tests and
 * by callers that do not bring their own tree.
 */

pub mod edit;
pub mod markdown;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{InlinePatch, MarkSet, Snapshot, TrackedMark};

pub use memory::MemoryDocument;

pub type TransactionId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("No transaction is open")]
    NoTransaction,

    #[error("Transaction {0} is still open")]
    TransactionOpen(TransactionId),

    #[error("Range {from}..{to} is outside the document")]
    OutOfBounds { from: usize, to: usize },

    #[error("Range {from}..{to} does not lie within a single textblock")]
    NotInTextblock { from: usize, to: usize },

    #[error("Range {from}..{to} partially covers an inline wrapper")]
    SpanFragmented { from: usize, to: usize },
}

/// The smallest edits the engine asks a host to perform. Positions are absolute.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveEdit {
    /// Replace `[from, to)` with `text` carrying `marks`. An empty range inserts.
    ReplaceText {
        from: usize,
        to: usize,
        text: String,
        marks: MarkSet,
    },
    /// Apply a formatting patch to every run in `[from, to)`. With `track` set the
    /// change is recorded as a tracked format mark remembering the old formatting.
    SetMarks {
        from: usize,
        to: usize,
        patch: InlinePatch,
        track: Option<TrackedMark>,
    },
    /// Attach a tracked mark to every run in `[from, to)`.
    AddTrackedMark {
        from: usize,
        to: usize,
        mark: TrackedMark,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    ContentChanged,
    SelectionChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditOrigin {
    /// Typing in an attached editor.
    Local,
    /// Edits issued through the engine.
    Programmatic,
    /// Changes merged in from a collaborator.
    Remote,
}

/// Change notification. A single transaction may be reported more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeEvent {
    pub transaction: TransactionId,
    pub kind: EventKind,
    pub origin: EditOrigin,
}

pub trait DocumentTree {
    fn snapshot(&self) -> Snapshot;

    /// Open a reversible transaction. Edits are only accepted inside one.
    fn begin_transaction(&mut self) -> Result<TransactionId, HostError>;

    /// Returns whether the edit changed the document.
    fn apply_edit(&mut self, edit: &PrimitiveEdit) -> Result<bool, HostError>;

    /// Returns whether the transaction changed the document.
    fn commit(&mut self) -> Result<bool, HostError>;

    /// Restore the document exactly as it was when the transaction began.
    fn rollback(&mut self) -> Result<(), HostError>;

    fn set_selection(&mut self, from: usize, to: usize);

    /// Drain pending notifications.
    fn take_events(&mut self) -> Vec<TreeEvent>;
}

pub trait ChangeTracking {
    fn accept(&mut self, raw_ids: &[String]) -> Result<bool, HostError>;
    fn reject(&mut self, raw_ids: &[String]) -> Result<bool, HostError>;
    fn accept_all(&mut self) -> Result<bool, HostError>;
    fn reject_all(&mut self) -> Result<bool, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackCommand {
    InsertTracked,
    DeleteTracked,
    FormatTracked,
    AcceptChange,
    RejectChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackMarkType {
    TrackInsert,
    TrackDelete,
    TrackFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<docplan_config::AuthorConfig> for Author {
    fn from(config: docplan_config::AuthorConfig) -> Self {
        Self {
            name: config.name,
            email: config.email,
        }
    }
}

pub trait CapabilityContext {
    fn has_command(&self, command: TrackCommand) -> bool;
    fn has_mark_type(&self, mark_type: TrackMarkType) -> bool;
    fn author(&self) -> Option<Author>;
}

/// Everything a session needs from its document.
pub trait Host: DocumentTree + ChangeTracking + CapabilityContext {}

impl<T: DocumentTree + ChangeTracking + CapabilityContext> Host for T {}
