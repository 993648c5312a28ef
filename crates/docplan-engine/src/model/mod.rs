//! Document tree, addressing and mark types shared by every engine component.

pub mod address;
pub mod marks;
pub mod node;

pub use address::{
    EntityAddress, InlineAnchor, NodeAddress, NodeKind, NodeType, Position, TextAddress,
    TextRange,
};
pub use marks::{CoreAttribute, Formatting, InlinePatch, MarkSet, TrackedKind, TrackedMark};
pub use node::{
    AtomType, BLOCK_SEPARATOR, BlockContent, BlockNode, BlockType, Inline, InlineAtom,
    InlineWrapper, OBJECT_REPLACEMENT, Snapshot, TextRun, WrapperType,
};
