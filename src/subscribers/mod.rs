//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and,
//! with the `logging` feature, the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Engine/Proxy/Runner ── publish(Event) ──► Bus ──► event_listener ──► SubscriberSet::emit
//!                                                                           │
//!                                                          ┌────────────────┼───────────┐
//!                                                          ▼                ▼           ▼
//!                                                      LogWriter         Metrics      Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
