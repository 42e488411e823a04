//! # Execution engine.
//!
//! - [`ExecutionEngine`] - validates a descriptor and runs it locally or as a service
//! - [`EngineBuilder`] - wires collaborators and subscribers
//! - [`Outcome`] - what a run produced

mod builder;
mod executor;
mod local;
mod pump;

pub use builder::EngineBuilder;
pub use executor::{ExecutionEngine, Outcome};
