//! Query and atomic mutation-plan core for structured documents.
//!
//! Start from [`DocumentSession`] wrapping a [`host::Host`] implementation, such as
//! the in-memory [`MemoryDocument`].

pub mod discovery;
pub mod error;
pub mod host;
pub mod index;
pub mod model;
pub mod plan;
pub mod query;
pub mod resolve;
pub mod revision;
pub mod session;
pub mod tracked;

// Re-export key types for easier usage
pub use discovery::{DiscoveryItem, DiscoveryResult, PageInfo, PageLimits};
pub use error::{CapabilityReason, DocError, FailureCode};
pub use host::{Author, MemoryDocument};
pub use model::{EntityAddress, NodeAddress, NodeType, Position, TextAddress, TextRange};
pub use plan::{ChangeMode, MutationStep, Plan, PlanReceipt, Receipt, StepOp, StepWhere};
pub use query::{Cardinality, Handle, Selector};
pub use revision::{Revision, RevisionGuard};
pub use session::{DocumentSession, SessionOptions};
