//! How `text.rewrite` decides the formatting of replacement text.

use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::model::{Formatting, InlinePatch};
use crate::query::StyleTally;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InlineMode {
    /// Keep the formatting of the replaced text.
    #[default]
    Preserve,
    /// Use exactly `setMarks`.
    Set,
    /// Drop all formatting.
    Clear,
    /// Preserve, then apply `setMarks` on top.
    Merge,
}

/// What to do when the replaced text is not uniformly formatted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NonUniformStrategy {
    Error,
    UseLeadingRun,
    #[default]
    Majority,
    Union,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InlineStylePolicy {
    #[serde(default)]
    pub mode: InlineMode,
    #[serde(default)]
    pub require_uniform: bool,
    #[serde(default)]
    pub on_non_uniform: NonUniformStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_marks: Option<InlinePatch>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParagraphMode {
    #[default]
    Preserve,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParagraphStylePolicy {
    #[serde(default)]
    pub mode: ParagraphMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StylePolicy {
    #[serde(default)]
    pub inline: InlineStylePolicy,
    #[serde(default)]
    pub paragraph: ParagraphStylePolicy,
}

impl StylePolicy {
    pub fn validate(&self) -> Result<(), DocError> {
        let needs_marks = matches!(self.inline.mode, InlineMode::Set | InlineMode::Merge);
        if needs_marks && self.inline.set_marks.is_none() {
            return Err(DocError::invalid_input(format!(
                "inline mode {:?} requires setMarks",
                self.inline.mode
            )));
        }
        if !needs_marks && self.inline.set_marks.is_some() {
            return Err(DocError::invalid_input(format!(
                "setMarks cannot be used with inline mode {:?}",
                self.inline.mode
            )));
        }
        Ok(())
    }

    /// Formatting for the replacement of text whose runs were tallied in `tally`.
    pub fn resolve(&self, tally: &StyleTally) -> Result<Formatting, DocError> {
        let set_marks = self.inline.set_marks.clone().unwrap_or_default();
        match self.inline.mode {
            InlineMode::Clear => Ok(Formatting::default()),
            InlineMode::Set => Ok(set_marks.apply(&Formatting::default())),
            InlineMode::Preserve => self.preserved(tally),
            InlineMode::Merge => Ok(set_marks.apply(&self.preserved(tally)?)),
        }
    }

    fn preserved(&self, tally: &StyleTally) -> Result<Formatting, DocError> {
        if tally.is_uniform() {
            return Ok(tally.first());
        }
        if self.inline.require_uniform {
            return Err(DocError::PreconditionFailed {
                message: "replaced text is not uniformly formatted".to_string(),
            });
        }
        match self.inline.on_non_uniform {
            NonUniformStrategy::Error => Err(DocError::StyleConflict {
                message: "replaced text mixes formatting and onNonUniform is error".to_string(),
            }),
            NonUniformStrategy::UseLeadingRun => Ok(tally.first()),
            NonUniformStrategy::Majority => Ok(tally.majority()),
            NonUniformStrategy::Union => Ok(tally.union()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn mixed() -> StyleTally {
        let mut tally = StyleTally::new();
        tally.add(&Formatting::italic(), 1);
        tally.add(&Formatting::bold(), 4);
        tally
    }

    #[test]
    fn test_default_policy_is_preserve_with_majority() {
        let policy = StylePolicy::default();
        assert_eq!(policy.resolve(&mixed()).unwrap(), Formatting::bold());
    }

    #[test]
    fn test_uniform_text_keeps_its_full_formatting() {
        let red = Formatting {
            color: Some("C00000".into()),
            ..Formatting::bold()
        };
        let mut tally = StyleTally::new();
        tally.add(&red, 5);
        assert_eq!(StylePolicy::default().resolve(&tally).unwrap(), red);
    }

    #[rstest]
    #[case(NonUniformStrategy::UseLeadingRun, Formatting::italic())]
    #[case(NonUniformStrategy::Union, Formatting { bold: true, italic: true, ..Formatting::default() })]
    fn test_non_uniform_strategies(#[case] strategy: NonUniformStrategy, #[case] expected: Formatting) {
        let policy = StylePolicy {
            inline: InlineStylePolicy {
                on_non_uniform: strategy,
                ..InlineStylePolicy::default()
            },
            ..StylePolicy::default()
        };
        assert_eq!(policy.resolve(&mixed()).unwrap(), expected);
    }

    #[test]
    fn test_error_strategy_is_a_style_conflict() {
        let policy: StylePolicy =
            serde_json::from_value(json!({ "inline": { "onNonUniform": "error" } })).unwrap();
        assert_eq!(
            policy.resolve(&mixed()).unwrap_err().code(),
            FailureCode::StyleConflict
        );
    }

    #[test]
    fn test_require_uniform_is_a_failed_precondition() {
        let policy: StylePolicy =
            serde_json::from_value(json!({ "inline": { "requireUniform": true } })).unwrap();
        assert_eq!(
            policy.resolve(&mixed()).unwrap_err().code(),
            FailureCode::PreconditionFailed
        );
    }

    #[test]
    fn test_set_and_merge() {
        let set: StylePolicy = serde_json::from_value(json!({
            "inline": { "mode": "set", "setMarks": { "underline": true } }
        }))
        .unwrap();
        assert!(set.validate().is_ok());
        assert_eq!(
            set.resolve(&mixed()).unwrap(),
            Formatting {
                underline: true,
                ..Formatting::default()
            }
        );

        let merge: StylePolicy = serde_json::from_value(json!({
            "inline": { "mode": "merge", "setMarks": { "italic": true } }
        }))
        .unwrap();
        assert_eq!(
            merge.resolve(&mixed()).unwrap(),
            Formatting {
                bold: true,
                italic: true,
                ..Formatting::default()
            }
        );
    }

    #[test]
    fn test_set_without_marks_is_invalid() {
        let policy: StylePolicy = serde_json::from_value(json!({ "inline": { "mode": "set" } })).unwrap();
        assert_eq!(policy.validate().unwrap_err().code(), FailureCode::InvalidInput);
    }
}
