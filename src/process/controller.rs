//! # Asynchronous self-stop and self-restart.
//!
//! [`ProcessController`] schedules process-wide actions on the
//! [`BackgroundRunner`] and returns a confirmation string immediately.
//!
//! ## Flow
//! ```text
//! stop(delay)
//!   └─► run_deferred(delay, Joined) ──► ops.terminate()            (SIGTERM to self)
//!
//! reload(exec, delay)
//!   └─► run_deferred(delay, Joined) ──► ops.replace(exec, argv)     (exec in place)
//!                                          └─ on error ──► publish ReplaceFailed
//!                                                      ──► ops.spawn_detached(exec, argv)
//!                                                      ──► ops.exit(respawn_exit_code)
//! ```
//!
//! ## Rules
//! - Both paths preserve the argument vector captured at construction verbatim.
//! - A failure of the scheduled action is recorded on its [`TaskHandle`] only;
//!   it never reaches the caller of `stop`/`reload`.
//! - Actions are not transactional with in-flight work, which may be abandoned.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::process::ops::ProcessOps;
use crate::tasks::{BackgroundRunner, TaskHandle, ThreadMode};

/// Schedules termination and restart of the current process.
pub struct ProcessController {
    runner: Arc<BackgroundRunner>,
    ops: Arc<dyn ProcessOps>,
    bus: Bus,
    argv: Arc<[OsString]>,
    respawn_exit_code: i32,
    default_delay: Duration,
}

impl ProcessController {
    /// Creates a controller capturing the current process arguments.
    pub fn new(runner: Arc<BackgroundRunner>, ops: Arc<dyn ProcessOps>, bus: Bus) -> Self {
        Self {
            runner,
            ops,
            bus,
            argv: std::env::args_os().collect(),
            respawn_exit_code: 0,
            default_delay: Duration::from_secs(1),
        }
    }

    /// Replaces the argument vector used by `reload` (`argv[0]` included).
    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the exit code used after a spawned reload.
    pub fn with_respawn_exit_code(mut self, code: i32) -> Self {
        self.respawn_exit_code = code;
        self
    }

    /// Sets the delay used when a remote caller gives none.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Delay used when a remote caller gives none.
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runner used for scheduling.
    pub fn runner(&self) -> &Arc<BackgroundRunner> {
        &self.runner
    }

    /// Argument vector preserved across `reload`.
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Schedules a graceful termination of the current process after `delay`.
    ///
    /// Returns a confirmation message without waiting for the delay.
    pub fn stop(&self, delay: Duration) -> String {
        self.bus
            .publish(Event::new(EventKind::StopRequested).with_delay(delay));

        let ops = Arc::clone(&self.ops);
        let task = self
            .runner
            .run_deferred("stop", delay, ThreadMode::Joined, move || {
                ops.terminate().map_err(TaskError::from)
            });
        confirmation("stopping", delay, &task)
    }

    /// Schedules a restart of the current process after `delay`.
    ///
    /// `exec_path` defaults to the current executable. The process image is replaced
    /// in place; when that fails a detached child is spawned with the same
    /// arguments and this process exits.
    pub fn reload(&self, exec_path: Option<PathBuf>, delay: Duration) -> String {
        let program = match exec_path.map(Ok).unwrap_or_else(std::env::current_exe) {
            Ok(p) => p,
            Err(e) => {
                let err = TaskError::from(e);
                let task = self
                    .runner
                    .run_deferred::<(), _>("reload", Duration::ZERO, ThreadMode::Joined, move || {
                        Err(err)
                    });
                return confirmation("reloading", delay, &task);
            }
        };

        self.bus.publish(
            Event::new(EventKind::ReloadRequested)
                .with_delay(delay)
                .with_reason(program.display().to_string()),
        );

        let ops = Arc::clone(&self.ops);
        let bus = self.bus.clone();
        let argv = Arc::clone(&self.argv);
        let exit_code = self.respawn_exit_code;
        let task = self
            .runner
            .run_deferred("reload", delay, ThreadMode::Joined, move || {
                respawn(&*ops, &bus, &program, &argv, exit_code)
            });
        confirmation("reloading", delay, &task)
    }
}

fn respawn(
    ops: &dyn ProcessOps,
    bus: &Bus,
    program: &Path,
    argv: &[OsString],
    exit_code: i32,
) -> Result<(), TaskError> {
    let err = ops.replace(program, argv);
    bus.publish(Event::new(EventKind::ReplaceFailed).with_reason(err.to_string()));

    ops.spawn_detached(program, argv)?;
    ops.exit(exit_code);
    Ok(())
}

fn confirmation(action: &str, delay: Duration, task: &TaskHandle<()>) -> String {
    format!("{action} process in {delay:?}, background task: {task}")
}
