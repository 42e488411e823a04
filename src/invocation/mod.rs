//! # Invocation input.
//!
//! - [`InvocationDescriptor`] - what to run and how
//! - [`guess`] - best-effort typing for raw argument text

mod descriptor;
mod value;

pub use descriptor::{InvocationBuilder, InvocationDescriptor};
pub use value::{guess, guess_map};
