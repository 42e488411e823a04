//! # Runtime events emitted by the engine, the proxy and background tasks.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Invocation events**: mode selection and target execution
//! - **Service events**: readiness and end of the transport loop
//! - **Background events**: deferred task scheduling and outcome
//! - **Process events**: stop/reload requests and reload fallback
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task name,
//! reasons, delays and the transport identity.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use launchvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("stop")
//!     .with_reason("boom")
//!     .with_delay(Duration::from_secs(1));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("stop"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! assert_eq!(ev.delay_ms, Some(1000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Invocation events ===
    /// Invocation selected local mode.
    ///
    /// Sets:
    /// - `task`: target reference
    LocalRunStarted,

    /// Invocation selected RPC mode and is handing off to the transport.
    ///
    /// Sets:
    /// - `task`: target reference
    /// - `ident`: configured transport identity
    /// - `reason`: transport mode
    RpcRunStarted,

    /// Target is about to run.
    ///
    /// Sets:
    /// - `task`: target reference
    TargetStarting,

    /// Target returned successfully.
    ///
    /// Sets:
    /// - `task`: target reference
    TargetFinished,

    /// Target returned an error or panicked.
    ///
    /// Sets:
    /// - `task`: target reference
    /// - `reason`: failure message
    TargetFailed,

    // === Service events ===
    /// Transport reported it is listening.
    ///
    /// Sets:
    /// - `ident`: identity reported by the transport
    ServiceReady,

    /// Transport loop returned.
    ///
    /// Sets:
    /// - `reason`: error message, if the loop failed
    ServiceStopped,

    // === Background task events ===
    /// Deferred task accepted.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `delay_ms`: delay before execution (ms)
    TaskScheduled,

    /// Deferred task finished successfully.
    ///
    /// Sets:
    /// - `task`: task name
    TaskSucceeded,

    /// Deferred task failed.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `reason`: failure message
    TaskFailed,

    // === Process events ===
    /// Self-termination scheduled.
    ///
    /// Sets:
    /// - `delay_ms`: delay before the signal (ms)
    StopRequested,

    /// Self-restart scheduled.
    ///
    /// Sets:
    /// - `delay_ms`: delay before the restart (ms)
    /// - `reason`: executable path
    ReloadRequested,

    /// In-place replacement failed; falling back to spawning a new process.
    ///
    /// Sets:
    /// - `reason`: replacement error
    ReplaceFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the target or task, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Delay before a deferred action in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Transport identity (port, socket path, ...) rendered as text.
    pub ident: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            delay_ms: None,
            ident: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches the transport identity.
    #[inline]
    pub fn with_ident(mut self, ident: impl Into<Arc<str>>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::ServiceReady);
        let b = Event::new(EventKind::ServiceReady);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_saturates_at_u32() {
        let ev = Event::new(EventKind::StopRequested).with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn test_subscriber_helpers() {
        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_subscriber_event());
        assert_eq!(ev.reason.as_deref(), Some("subscriber=log reason=full"));
        assert!(!Event::new(EventKind::TaskFailed).is_subscriber_event());
    }
}
