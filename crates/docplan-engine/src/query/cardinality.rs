use serde::{Deserialize, Serialize};

use crate::error::DocError;

/// What a caller expects the number of matches to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    #[default]
    Any,
    First,
    ExactlyOne,
    All,
}

impl Cardinality {
    pub fn allows_pagination(self) -> bool {
        matches!(self, Cardinality::Any | Cardinality::All)
    }

    /// Reject pagination parameters the requirement contradicts.
    pub fn check_pagination(self, limit: Option<usize>, offset: Option<usize>) -> Result<(), DocError> {
        if !self.allows_pagination() && (limit.is_some() || offset.is_some()) {
            return Err(DocError::invalid_input(format!(
                "require {self:?} cannot be combined with limit or offset"
            )));
        }
        if limit == Some(0) {
            return Err(DocError::invalid_input("limit must be at least 1"));
        }
        Ok(())
    }

    /// Enforce the requirement on the full, unpaginated match list.
    pub fn enforce<T>(self, mut matches: Vec<T>, selector: &str) -> Result<Vec<T>, DocError> {
        let not_found = || DocError::MatchNotFound {
            selector: selector.to_string(),
        };
        match self {
            Cardinality::Any => Ok(matches),
            Cardinality::All if matches.is_empty() => Err(not_found()),
            Cardinality::All => Ok(matches),
            Cardinality::First if matches.is_empty() => Err(not_found()),
            Cardinality::First => {
                matches.truncate(1);
                Ok(matches)
            }
            Cardinality::ExactlyOne => match matches.len() {
                0 => Err(not_found()),
                1 => Ok(matches),
                match_count => Err(DocError::AmbiguousMatch { match_count }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(Cardinality::Any, true)]
    #[case(Cardinality::All, true)]
    #[case(Cardinality::First, false)]
    #[case(Cardinality::ExactlyOne, false)]
    fn test_pagination_rules(#[case] require: Cardinality, #[case] allowed: bool) {
        assert!(require.check_pagination(None, None).is_ok());
        assert_eq!(require.check_pagination(Some(5), None).is_ok(), allowed);
        assert_eq!(require.check_pagination(None, Some(2)).is_ok(), allowed);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let err = Cardinality::Any.check_pagination(Some(0), None).unwrap_err();
        assert_eq!(err.code(), FailureCode::InvalidInput);
    }

    #[test]
    fn test_any_accepts_zero_matches() {
        assert_eq!(Cardinality::Any.enforce(Vec::<u8>::new(), "x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_ambiguous_match_reports_count() {
        let err = Cardinality::ExactlyOne.enforce(vec![1, 2], "x").unwrap_err();
        assert_eq!(err.code(), FailureCode::AmbiguousMatch);
        assert_eq!(err.details().unwrap()["matchCount"], 2);
    }

    proptest! {
        #[test]
        fn test_cardinality_laws(n in 0usize..6) {
            let matches: Vec<usize> = (0..n).collect();

            let exactly_one = Cardinality::ExactlyOne.enforce(matches.clone(), "x");
            match n {
                0 => prop_assert_eq!(exactly_one.unwrap_err().code(), FailureCode::MatchNotFound),
                1 => prop_assert_eq!(exactly_one.unwrap(), vec![0]),
                _ => prop_assert_eq!(
                    exactly_one.unwrap_err(),
                    DocError::AmbiguousMatch { match_count: n }
                ),
            }

            let first = Cardinality::First.enforce(matches.clone(), "x");
            if n == 0 {
                prop_assert_eq!(first.unwrap_err().code(), FailureCode::MatchNotFound);
            } else {
                prop_assert_eq!(first.unwrap(), vec![0]);
            }

            let all = Cardinality::All.enforce(matches.clone(), "x");
            prop_assert_eq!(all.is_ok(), n > 0);
        }
    }
}
