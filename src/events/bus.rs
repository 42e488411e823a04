//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from plain OS threads (the engine, background
//! tasks, the proxy's main task) as well as from async code.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Listener (one):
//!   Engine     ──┐
//!   Runner     ──┼──────► Bus ───────► event_listener ────► SubscriberSet
//!   Proxy      ──┤  (broadcast chan)    (in ExecutionEngine)
//!   Controller ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and needs no runtime.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_from_plain_thread() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        let b = bus.clone();
        std::thread::spawn(move || b.publish(Event::new(EventKind::ServiceReady)))
            .join()
            .unwrap();

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ServiceReady);
    }

    #[test]
    fn test_publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::StopRequested));
    }
}
