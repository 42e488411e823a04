//! # Process self-management.
//!
//! - [`ProcessController`] - delayed `stop` and `reload` of the current process
//! - [`ProcessOps`] / [`OsProcess`] - the OS side effects behind them
//! - [`wait_for_shutdown_signal`] - termination signal listener used by transports

mod controller;
mod ops;
mod signals;

pub use controller::ProcessController;
pub use ops::{OsProcess, ProcessOps};
pub use signals::wait_for_shutdown_signal;
