//! # Background tasks.
//!
//! - [`BackgroundRunner`] - runs work after an optional delay on its own thread
//! - [`TaskHandle`] - future-like observer of one task
//! - [`TaskState`] - pending / running / succeeded / failed
//! - [`ThreadMode`] - daemon or joined-at-shutdown threads

mod handle;
mod runner;

pub use handle::{TaskHandle, TaskState};
pub(crate) use runner::panic_message;
pub use runner::{BackgroundRunner, ThreadMode};
