//! # Global engine configuration.
//!
//! Provides [`Config`] centralized settings for the execution engine and the
//! self-management primitives it hands out.
//!
//! Config is used in two ways:
//! 1. **Engine creation**: `ExecutionEngine::builder(config)`
//! 2. **Process control defaults**: the delay applied when an RPC caller invokes
//!    `stop`/`reload` without one, and the exit code of a respawned reload.
//!
//! ## Sentinel values
//! - `default_delay = 0s` → `stop`/`reload` run synchronously in the calling thread
//! - `event_workers = 0` → one worker thread for the event runtime

use std::time::Duration;

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `default_delay`: Delay used by process operations when the caller gives none
/// - `respawn_exit_code`: Exit code of the old process after a spawned reload
/// - `event_workers`: Worker threads of the runtime driving subscribers (`0` = 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow listeners that lag behind more than `bus_capacity` messages skip
    /// older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Delay applied by `stop`/`reload`/`background` when the caller passes none.
    pub default_delay: Duration,

    /// Exit code used when `reload` falls back to spawning a new process.
    pub respawn_exit_code: i32,

    /// Worker threads of the tokio runtime that drives subscribers.
    ///
    /// The runtime is only built when at least one subscriber is configured.
    pub event_workers: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the number of event runtime workers, treating `0` as `1`.
    #[inline]
    pub fn event_workers_clamped(&self) -> usize {
        self.event_workers.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `default_delay = 1s`
    /// - `respawn_exit_code = 0`
    /// - `event_workers = 1`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            default_delay: Duration::from_secs(1),
            respawn_exit_code: 0,
            event_workers: 1,
        }
    }
}
