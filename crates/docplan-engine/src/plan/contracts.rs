//! Static metadata describing what each session operation can fail with.

use serde::Serialize;

use crate::error::FailureCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContract {
    pub name: &'static str,
    pub mutates: bool,
    /// Codes that can be raised before the document is touched.
    pub pre_apply_errors: Vec<FailureCode>,
    /// Mutating operations never raise once mutation has begun.
    pub post_apply_errors: bool,
}

use FailureCode::*;

const TARGETING: [FailureCode; 7] = [
    InvalidInput,
    InvalidTarget,
    TargetNotFound,
    MatchNotFound,
    AmbiguousMatch,
    CrossBlockMatch,
    TargetMoved,
];

fn read(name: &'static str, codes: &[FailureCode]) -> OperationContract {
    OperationContract {
        name,
        mutates: false,
        pre_apply_errors: codes.to_vec(),
        post_apply_errors: false,
    }
}

fn write(name: &'static str, codes: &[FailureCode]) -> OperationContract {
    let mut pre_apply_errors = codes.to_vec();
    for code in [RevisionMismatch, CapabilityUnavailable] {
        if !pre_apply_errors.contains(&code) {
            pre_apply_errors.push(code);
        }
    }
    OperationContract {
        name,
        mutates: true,
        pre_apply_errors,
        post_apply_errors: false,
    }
}

/// Every public session operation with its failure contract.
pub fn operation_contracts() -> Vec<OperationContract> {
    let plan_codes: Vec<FailureCode> = TARGETING
        .iter()
        .copied()
        .chain([
            SpanFragmented,
            StyleConflict,
            PreconditionFailed,
            PlanConflictOverlap,
            InvalidStepCombination,
        ])
        .collect();

    vec![
        read("find", &[InvalidInput, InvalidTarget, TargetNotFound]),
        read("queryMatch", &TARGETING),
        read("getNode", &[InvalidInput, InvalidTarget, TargetNotFound]),
        read("getNodeById", &[InvalidInput, TargetNotFound]),
        read("info", &[]),
        write("write", &TARGETING),
        write("formatApply", &TARGETING),
        write("mutationsApply", &plan_codes),
        read("mutationsPreview", &[InvalidInput, RevisionMismatch]),
        read("trackChanges.list", &[InvalidInput]),
        read("trackChanges.get", &[InvalidInput, TargetNotFound]),
        write("trackChanges.accept", &[InvalidInput, TargetNotFound]),
        write("trackChanges.reject", &[InvalidInput, TargetNotFound]),
        write("trackChanges.acceptAll", &[]),
        write("trackChanges.rejectAll", &[]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mutating_operation_declares_capability_failures() {
        for contract in operation_contracts().iter().filter(|c| c.mutates) {
            assert!(
                contract.pre_apply_errors.contains(&CapabilityUnavailable),
                "{} does not declare CAPABILITY_UNAVAILABLE",
                contract.name
            );
            assert!(!contract.post_apply_errors);
        }
    }

    #[test]
    fn test_no_op_is_never_a_raised_error() {
        assert!(operation_contracts()
            .iter()
            .all(|contract| !contract.pre_apply_errors.contains(&NoOp)));
    }

    #[test]
    fn test_names_are_unique() {
        let contracts = operation_contracts();
        let mut names: Vec<_> = contracts.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), contracts.len());
    }
}
