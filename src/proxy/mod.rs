//! # Service proxy.
//!
//! - [`ServiceProxy`] - name-based call surface handed to a transport, plus the
//!   readiness-driven main task
//! - [`Expose`] - explicit capability interface of a bound delegate
//! - [`CallArgs`] / [`Operation`] - arguments and shape of a named operation

mod operation;
mod service;

pub use operation::{CallArgs, Expose, Operation};
pub use service::{BUILTIN_OPERATIONS, ServiceProxy};
