//! # LogWriter: events rendered through `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into `tracing` records.
//! Install any `tracing` subscriber in the host binary to see them.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO launchvisor: local run target="pkg.mod:handler"
//! INFO launchvisor: rpc run target="pkg.mod:handler" mode="http" ident="8080"
//! INFO launchvisor: service ready ident="8080"
//! WARN launchvisor: target failed target="pkg.mod:handler" err="boom"
//! INFO launchvisor: stop requested delay_ms=1000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::LocalRunStarted => {
                tracing::info!(target: "launchvisor", target_ref = task, "local run");
            }
            EventKind::RpcRunStarted => {
                tracing::info!(
                    target: "launchvisor",
                    target_ref = task,
                    mode = reason,
                    ident = e.ident.as_deref().unwrap_or("-"),
                    "rpc run"
                );
            }
            EventKind::TargetStarting => {
                tracing::debug!(target: "launchvisor", target_ref = task, "target starting");
            }
            EventKind::TargetFinished => {
                tracing::debug!(target: "launchvisor", target_ref = task, "target finished");
            }
            EventKind::TargetFailed => {
                tracing::warn!(target: "launchvisor", target_ref = task, err = reason, "target failed");
            }
            EventKind::ServiceReady => {
                tracing::info!(
                    target: "launchvisor",
                    ident = e.ident.as_deref().unwrap_or("-"),
                    "service ready"
                );
            }
            EventKind::ServiceStopped => {
                tracing::info!(target: "launchvisor", err = reason, "service stopped");
            }
            EventKind::TaskScheduled => {
                tracing::debug!(target: "launchvisor", task, delay_ms = e.delay_ms, "task scheduled");
            }
            EventKind::TaskSucceeded => {
                tracing::debug!(target: "launchvisor", task, "task succeeded");
            }
            EventKind::TaskFailed => {
                tracing::error!(target: "launchvisor", task, err = reason, "task failed");
            }
            EventKind::StopRequested => {
                tracing::info!(target: "launchvisor", delay_ms = e.delay_ms, "stop requested");
            }
            EventKind::ReloadRequested => {
                tracing::info!(
                    target: "launchvisor",
                    delay_ms = e.delay_ms,
                    exec = reason,
                    "reload requested"
                );
            }
            EventKind::ReplaceFailed => {
                tracing::warn!(target: "launchvisor", err = reason, "exec failed, respawning");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "launchvisor", subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "launchvisor", subscriber = task, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
