//! Locating content: selectors, matching, cardinality, style summaries and refs.

pub mod cardinality;
pub mod matcher;
pub mod nodes;
pub mod refs;
pub mod selector;
pub mod style;

pub use cardinality::Cardinality;
pub use matcher::{MatchCandidate, MatchQuery, MatchSet, MatchSettings, find_matches};
pub use nodes::{NodeInfo, get_node, get_node_by_id};
pub use refs::{Handle, ParsedRef, RefStability, TargetKind, parse_ref};
pub use selector::{NodeSelector, Selector, TextMode, TextSelector};
pub use style::{MatchStyleSummary, StyleTally};
