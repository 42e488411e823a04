//! # Targets: what an invocation runs.
//!
//! - [`Target`] / [`TargetFn`] / [`TargetRef`] - callable targets
//! - [`CallContext`] - arguments, namespace and the `rpc` binding
//! - [`Resolve`] / [`TargetRegistry`] - callable lookup by reference
//! - [`RunScript`] / [`CommandScript`] - path-like targets

mod registry;
mod script;
mod target;

pub use registry::{Resolve, TargetRegistry};
pub(crate) use script::looks_like_path;
pub use script::{CommandScript, RunScript};
pub use target::{CallContext, RPC_BINDING, Target, TargetFn, TargetRef};
