//! Character-weighted formatting statistics over matched text.

use serde::{Deserialize, Serialize};

use crate::index::BlockIndex;
use crate::model::{CoreAttribute, Formatting, Snapshot, TextAddress};
use crate::resolve::runs_in_range;

/// Majority value of each core attribute across a match, reported only for
/// attributes active on at least one character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStyleSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    pub is_uniform: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StyleTally {
    total: usize,
    active: [usize; 4],
    first: Option<Formatting>,
    uniform: bool,
}

impl StyleTally {
    pub fn new() -> Self {
        Self {
            uniform: true,
            ..Self::default()
        }
    }

    /// Tally every text run covered by `ranges`.
    pub fn over_ranges(snapshot: &Snapshot, blocks: &BlockIndex, ranges: &[TextAddress]) -> Self {
        let mut tally = Self::new();
        for address in ranges {
            let Some(node) = blocks.get(&address.block_id).and_then(|entry| entry.node(snapshot))
            else {
                continue;
            };
            for (run, chars) in runs_in_range(node, address.range) {
                tally.add(&run.marks.formatting, chars);
            }
        }
        tally
    }

    pub fn add(&mut self, formatting: &Formatting, chars: usize) {
        if chars == 0 {
            return;
        }
        match &self.first {
            None => self.first = Some(formatting.clone()),
            Some(first) if first != formatting => self.uniform = false,
            Some(_) => {}
        }
        self.total += chars;
        for (slot, attribute) in CoreAttribute::ALL.iter().enumerate() {
            if attribute.get(formatting) {
                self.active[slot] += chars;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    /// Ties go to active.
    fn majority_of(&self, slot: usize) -> bool {
        self.active[slot] * 2 >= self.total && self.active[slot] > 0
    }

    pub fn summary(&self) -> MatchStyleSummary {
        let report = |slot: usize| (self.active[slot] > 0).then(|| self.majority_of(slot));
        MatchStyleSummary {
            bold: report(0),
            italic: report(1),
            underline: report(2),
            strike: report(3),
            is_uniform: self.uniform,
        }
    }

    /// The formatting of the first covered run.
    pub fn first(&self) -> Formatting {
        self.first.clone().unwrap_or_default()
    }

    /// Each core attribute active if any covered character has it.
    pub fn union(&self) -> Formatting {
        let mut formatting = Formatting {
            color: self.first.as_ref().and_then(|first| first.color.clone()),
            ..Formatting::default()
        };
        for (slot, attribute) in CoreAttribute::ALL.iter().enumerate() {
            attribute.set(&mut formatting, self.active[slot] > 0);
        }
        formatting
    }

    /// Each core attribute at its majority value; colour from the first run.
    pub fn majority(&self) -> Formatting {
        let mut formatting = Formatting {
            color: self.first.as_ref().and_then(|first| first.color.clone()),
            ..Formatting::default()
        };
        for (slot, attribute) in CoreAttribute::ALL.iter().enumerate() {
            attribute.set(&mut formatting, self.majority_of(slot));
        }
        formatting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_majority_is_character_weighted() {
        let mut tally = StyleTally::new();
        tally.add(&Formatting::bold(), 2);
        tally.add(&Formatting::default(), 5);
        tally.add(&Formatting::italic(), 5);

        assert_eq!(
            tally.summary(),
            MatchStyleSummary {
                bold: Some(false),
                italic: Some(false),
                is_uniform: false,
                ..MatchStyleSummary::default()
            }
        );
        assert_eq!(tally.majority(), Formatting::default());
        assert_eq!(
            tally.union(),
            Formatting {
                bold: true,
                italic: true,
                ..Formatting::default()
            }
        );
    }

    #[test]
    fn test_tie_resolves_to_active() {
        let mut tally = StyleTally::new();
        tally.add(&Formatting::bold(), 3);
        tally.add(&Formatting::default(), 3);

        assert_eq!(tally.summary().bold, Some(true));
        assert!(tally.majority().bold);
    }

    #[test]
    fn test_uniform_requires_identical_formatting() {
        let mut tally = StyleTally::new();
        tally.add(&Formatting::bold(), 3);
        tally.add(&Formatting::bold(), 1);
        assert!(tally.is_uniform());

        tally.add(
            &Formatting {
                bold: true,
                color: Some("FF0000".into()),
                ..Formatting::default()
            },
            1,
        );
        assert!(!tally.is_uniform());
        // still bold everywhere
        assert_eq!(tally.summary().bold, Some(true));
    }

    #[test]
    fn test_empty_tally() {
        let tally = StyleTally::new();
        assert!(tally.is_empty());
        assert_eq!(
            tally.summary(),
            MatchStyleSummary {
                is_uniform: true,
                ..MatchStyleSummary::default()
            }
        );
    }

    #[test]
    fn test_summary_serializes_only_present_attributes() {
        let mut tally = StyleTally::new();
        tally.add(&Formatting::italic(), 4);
        assert_eq!(
            serde_json::to_value(tally.summary()).unwrap(),
            serde_json::json!({ "italic": true, "isUniform": true })
        );
    }
}
