//! Extension point for plan operations beyond the built-in text and style ops.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::DocError;
use crate::host::{Author, Host};
use crate::model::TextAddress;
use crate::plan::ChangeMode;
use crate::plan::step::BUILTIN_OPS;
use crate::resolve::AbsoluteRange;

/// A target handed to a domain op: where it was in the pre-plan document, and
/// where it is now inside the running transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainTarget {
    pub address: TextAddress,
    pub range: AbsoluteRange,
    pub text: String,
}

pub struct DomainContext<'a, H> {
    pub host: &'a mut H,
    pub targets: &'a [DomainTarget],
    pub change_mode: ChangeMode,
    pub author: Option<&'a Author>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainEffect {
    pub changed: bool,
    pub result: Value,
}

/// A named plan operation supplied by the application.
///
/// `execute` runs inside the plan's transaction and must only edit through
/// `ctx.host.apply_edit`. Any error rolls the whole plan back.
pub trait DomainOp<H: Host> {
    /// Check `args` before anything is mutated.
    fn validate(&self, _args: &Value) -> Result<(), DocError> {
        Ok(())
    }

    fn execute(&self, ctx: DomainContext<'_, H>, args: &Value) -> Result<DomainEffect, DocError>;
}

pub struct DomainRegistry<H: Host> {
    ops: HashMap<String, Box<dyn DomainOp<H>>>,
}

impl<H: Host> Default for DomainRegistry<H> {
    fn default() -> Self {
        Self {
            ops: HashMap::new(),
        }
    }
}

impl<H: Host> DomainRegistry<H> {
    pub fn register(&mut self, name: &str, op: Box<dyn DomainOp<H>>) -> Result<(), DocError> {
        if BUILTIN_OPS.contains(&name) {
            return Err(DocError::invalid_input(format!(
                "{name} is a built-in operation"
            )));
        }
        if !name.contains('.') {
            return Err(DocError::invalid_input(format!(
                "domain op {name:?} must be namespaced, e.g. \"citations.renumber\""
            )));
        }
        self.ops.insert(name.to_string(), op);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn DomainOp<H>> {
        self.ops.get(name).map(|op| op.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCode;
    use crate::host::MemoryDocument;

    struct Noop;

    impl DomainOp<MemoryDocument> for Noop {
        fn execute(
            &self,
            _ctx: DomainContext<'_, MemoryDocument>,
            _args: &Value,
        ) -> Result<DomainEffect, DocError> {
            Ok(DomainEffect {
                changed: false,
                result: Value::Null,
            })
        }
    }

    #[test]
    fn test_register_rejects_builtin_and_bare_names() {
        let mut registry = DomainRegistry::<MemoryDocument>::default();
        assert_eq!(
            registry.register("text.rewrite", Box::new(Noop)).unwrap_err().code(),
            FailureCode::InvalidInput
        );
        assert!(registry.register("renumber", Box::new(Noop)).is_err());

        registry.register("citations.renumber", Box::new(Noop)).unwrap();
        assert!(registry.get("citations.renumber").is_some());
        assert_eq!(registry.names(), vec!["citations.renumber"]);
    }
}
