//! # Target resolution.
//!
//! [`Resolve`] turns a callable reference (e.g. `"pkg.mod:handler"`) into a
//! [`TargetRef`]. [`TargetRegistry`] is the bundled implementation: targets are
//! registered up front under their [`Target::name`] and looked up by exact name.
//!
//! ## Example
//! ```rust
//! use launchvisor::{Resolve, TargetFn, TargetRegistry, TaskError};
//! use serde_json::Value;
//!
//! let registry = TargetRegistry::new();
//! registry.register(TargetFn::arc("jobs:noop", |_ctx: &launchvisor::CallContext| {
//!     Ok::<_, TaskError>(Value::Null)
//! }));
//!
//! assert!(registry.resolve("jobs:noop").is_ok());
//! assert!(registry.resolve("jobs:missing").is_err());
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::RunError;
use crate::targets::target::TargetRef;

/// Locates callable targets by reference.
pub trait Resolve: Send + Sync + 'static {
    /// Resolves `target` or fails with [`RunError::Resolution`].
    fn resolve(&self, target: &str) -> Result<TargetRef, RunError>;
}

/// Name-keyed table of targets.
#[derive(Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, TargetRef>>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target` under its name, replacing a previous entry.
    pub fn register(&self, target: TargetRef) -> &Self {
        let name = target.name().to_string();
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, target);
        self
    }

    /// Returns sorted list of registered names.
    pub fn list(&self) -> Vec<String> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = targets.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Resolve for TargetRegistry {
    fn resolve(&self, target: &str) -> Result<TargetRef, RunError> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .ok_or_else(|| RunError::resolution(target, "no such callable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::targets::{CallContext, TargetFn};
    use serde_json::json;

    #[test]
    fn test_register_replaces_and_lists_sorted() {
        let reg = TargetRegistry::new();
        reg.register(TargetFn::arc("b:one", |_: &CallContext| Ok::<_, TaskError>(json!(1))))
            .register(TargetFn::arc("a:two", |_: &CallContext| Ok::<_, TaskError>(json!(2))))
            .register(TargetFn::arc("b:one", |_: &CallContext| Ok::<_, TaskError>(json!(3))));

        assert_eq!(reg.list(), vec!["a:two".to_string(), "b:one".to_string()]);
        let t = reg.resolve("b:one").unwrap();
        assert_eq!(t.call(&CallContext::default()).unwrap(), json!(3));
    }

    #[test]
    fn test_missing_target_is_resolution_error() {
        let reg = TargetRegistry::new();
        let err = match reg.resolve("pkg.mod:nope") {
            Err(e) => e,
            Ok(_) => panic!("resolved a missing target"),
        };
        assert_eq!(err.as_label(), "run_resolution");
    }
}
