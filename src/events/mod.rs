//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the engine, the service proxy,
//! the background runner and the process controller.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ExecutionEngine`, `ServiceProxy`, `BackgroundRunner`,
//!   `ProcessController`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the engine's event listener (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
