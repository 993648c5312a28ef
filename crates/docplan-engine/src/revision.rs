//! Optimistic-concurrency revision counter.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DocError;
use crate::host::{EventKind, TransactionId, TreeEvent};

/// Per-document edit counter, carried on the wire as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Revision {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Revision)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Counts content-changing edits for one document.
///
/// Once `track` has been called, every content-changing transaction observed
/// through `observe` advances the revision exactly once, whatever its origin and
/// however many times it is reported. Selection changes never advance it.
#[derive(Debug, Default)]
pub struct RevisionGuard {
    current: Revision,
    tracking: bool,
    last_counted: Option<TransactionId>,
}

impl RevisionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to revision 0, forgetting any observed transactions.
    pub fn init(&mut self) {
        self.current = Revision::default();
        self.last_counted = None;
    }

    pub fn current(&self) -> Revision {
        self.current
    }

    pub fn advance(&mut self) -> Revision {
        self.current = Revision(self.current.0 + 1);
        debug!("revision advanced to {}", self.current);
        self.current
    }

    /// Fail with `REVISION_MISMATCH` unless `expected` names the current revision.
    pub fn check(&self, expected: Option<&str>) -> Result<(), DocError> {
        let Some(expected) = expected else {
            return Ok(());
        };
        let current = self.current.to_string();
        if expected == current {
            Ok(())
        } else {
            Err(DocError::RevisionMismatch {
                expected: expected.to_string(),
                current,
            })
        }
    }

    /// Start counting observed edits. Returns false when already tracking.
    pub fn track(&mut self) -> bool {
        if self.tracking {
            return false;
        }
        self.tracking = true;
        true
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Feed host notifications. Returns how many revisions were added.
    pub fn observe(&mut self, events: &[TreeEvent]) -> usize {
        if !self.tracking {
            return 0;
        }
        let mut advanced = 0;
        for event in events {
            if event.kind != EventKind::ContentChanged {
                continue;
            }
            if self
                .last_counted
                .is_some_and(|last| event.transaction <= last)
            {
                continue;
            }
            self.last_counted = Some(event.transaction);
            self.advance();
            advanced += 1;
        }
        advanced
    }
}
