//! # Deferred execution on OS threads.
//!
//! [`BackgroundRunner`] runs a closure after an optional delay and reports the
//! outcome through a [`TaskHandle`].
//!
//! ## Execution sites
//! ```text
//! run_deferred(delay = 0)  ──► caller's thread ──► handle already terminal
//! run_deferred(delay > 0)  ──► new thread: sleep(delay) ──► f() ──► resolve handle
//! spawn(..)                ──► new thread: f() ──► resolve handle
//! ```
//!
//! ## Rules
//! - The caller never observes a failure except through the handle.
//! - On a background thread a failure is **re-signalled** after being recorded:
//!   a panic is resumed on that thread, an error is returned from it and
//!   published as [`EventKind::TaskFailed`].
//! - [`ThreadMode::Daemon`] threads are detached. [`ThreadMode::Joined`] threads
//!   are tracked until [`BackgroundRunner::join_pending`] collects them, which is
//!   how the engine keeps shutdown waiting for them.
//! - No cancellation: once started, work runs to completion.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::handle::TaskHandle;

/// Whether process shutdown waits for a background thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThreadMode {
    /// Detached; never waited for.
    Daemon,
    /// Tracked; collected by [`BackgroundRunner::join_pending`].
    #[default]
    Joined,
}

/// Runs deferred work on dedicated threads and tracks non-daemon ones.
pub struct BackgroundRunner {
    bus: Bus,
    joined: Mutex<Vec<JoinHandle<Result<(), TaskError>>>>,
}

impl BackgroundRunner {
    /// Creates a runner publishing task events to `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            joined: Mutex::new(Vec::new()),
        }
    }

    /// Runs `f` after `delay`.
    ///
    /// With a zero delay `f` runs on the calling thread and the returned handle is
    /// already terminal. Otherwise a new thread sleeps for `delay` and then runs `f`;
    /// this call returns immediately.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use launchvisor::{BackgroundRunner, Bus, ThreadMode};
    ///
    /// let runner = BackgroundRunner::new(Bus::default());
    ///
    /// let now = runner.run_deferred("now", Duration::ZERO, ThreadMode::Joined, || Ok(1));
    /// assert_eq!(now.try_result(), Some(Ok(1)));
    ///
    /// let later = runner.run_deferred("later", Duration::from_millis(10), ThreadMode::Joined, || Ok(2));
    /// assert_eq!(later.wait_blocking(), Ok(2));
    /// ```
    pub fn run_deferred<T, F>(
        &self,
        name: &str,
        delay: Duration,
        mode: ThreadMode,
        f: F,
    ) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        if delay.is_zero() {
            return self.run_inline(name, f);
        }
        self.launch(name, delay, mode, |_| {}, f)
    }

    /// Runs `f` on a new thread right away.
    pub fn spawn<T, F>(&self, name: &str, mode: ThreadMode, f: F) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        self.launch(name, Duration::ZERO, mode, |_| {}, f)
    }

    /// Like [`BackgroundRunner::spawn`], but hands the handle to `observe` before
    /// the thread starts.
    pub(crate) fn spawn_observed<T, O, F>(
        &self,
        name: &str,
        mode: ThreadMode,
        observe: O,
        f: F,
    ) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        O: FnOnce(&TaskHandle<T>),
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        self.launch(name, Duration::ZERO, mode, observe, f)
    }

    /// Waits for every tracked (non-daemon) thread, including ones scheduled
    /// while waiting, and returns the failures they reported.
    pub fn join_pending(&self) -> Vec<TaskError> {
        let mut failures = Vec::new();
        loop {
            let batch: Vec<_> = self.lock_joined().drain(..).collect();
            if batch.is_empty() {
                return failures;
            }
            for h in batch {
                match h.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => failures.push(e),
                    Err(payload) => failures.push(TaskError::Panicked {
                        info: panic_message(&*payload),
                    }),
                }
            }
        }
    }

    /// Number of tracked threads not yet collected.
    pub fn pending(&self) -> usize {
        self.lock_joined().len()
    }

    fn lock_joined(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<Result<(), TaskError>>>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_inline<T, F>(&self, name: &str, f: F) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let (handle, done) = TaskHandle::pending(name);
        self.publish_scheduled(name, Duration::ZERO);

        done.running();
        let (outcome, _payload) = guarded(f);
        self.publish_outcome(name, &outcome);
        done.finish(outcome);
        handle
    }

    fn launch<T, O, F>(
        &self,
        name: &str,
        delay: Duration,
        mode: ThreadMode,
        observe: O,
        f: F,
    ) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        O: FnOnce(&TaskHandle<T>),
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let (handle, done) = TaskHandle::pending(name);
        let done = Arc::new(done);
        self.publish_scheduled(name, delay);
        observe(&handle);

        let worker_done = Arc::clone(&done);
        let bus = self.bus.clone();
        let task_name = name.to_string();
        let body = move || -> Result<(), TaskError> {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            worker_done.running();
            let (outcome, payload) = guarded(f);
            publish_outcome(&bus, &task_name, &outcome);
            let status = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
            worker_done.finish(outcome);
            if let Some(payload) = payload {
                panic::resume_unwind(payload);
            }
            status
        };

        let spawned = thread::Builder::new()
            .name(format!("bg-{name}#{}", handle.id()))
            .spawn(body);

        match spawned {
            Ok(join) => match mode {
                ThreadMode::Joined => self.lock_joined().push(join),
                ThreadMode::Daemon => drop(join),
            },
            Err(e) => {
                let err = TaskError::Spawn {
                    error: e.to_string(),
                };
                self.publish_outcome::<T>(name, &Err(err.clone()));
                done.finish(Err(err));
            }
        }
        handle
    }

    fn publish_scheduled(&self, name: &str, delay: Duration) {
        self.bus.publish(
            Event::new(EventKind::TaskScheduled)
                .with_task(name)
                .with_delay(delay),
        );
    }

    fn publish_outcome<T>(&self, name: &str, outcome: &Result<T, TaskError>) {
        publish_outcome(&self.bus, name, outcome);
    }
}

/// Runs `f`, turning a panic into [`TaskError::Panicked`] and handing back the payload.
fn guarded<T, F>(f: F) -> (Result<T, TaskError>, Option<Box<dyn Any + Send>>)
where
    F: FnOnce() -> Result<T, TaskError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => (outcome, None),
        Err(payload) => {
            let info = panic_message(&*payload);
            (Err(TaskError::Panicked { info }), Some(payload))
        }
    }
}

fn publish_outcome<T>(bus: &Bus, name: &str, outcome: &Result<T, TaskError>) {
    let ev = match outcome {
        Ok(_) => Event::new(EventKind::TaskSucceeded).with_task(name),
        Err(e) => Event::new(EventKind::TaskFailed)
            .with_task(name)
            .with_reason(e.to_string()),
    };
    bus.publish(ev);
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn runner() -> BackgroundRunner {
        BackgroundRunner::new(Bus::new(64))
    }

    #[test]
    fn test_zero_delay_runs_on_caller_thread() {
        let r = runner();
        let caller = thread::current().id();
        let h = r.run_deferred("inline", Duration::ZERO, ThreadMode::Joined, move || {
            Ok(thread::current().id() == caller)
        });
        assert_eq!(h.try_result(), Some(Ok(true)));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_zero_delay_failure_is_recorded_not_raised() {
        let r = runner();
        let h = r.run_deferred::<(), _>("inline", Duration::ZERO, ThreadMode::Joined, || {
            panic!("inline boom")
        });
        assert_eq!(
            h.try_result(),
            Some(Err(TaskError::Panicked {
                info: "inline boom".into()
            }))
        );
    }

    #[test]
    fn test_delay_returns_before_and_resolves_after() {
        let r = runner();
        let delay = Duration::from_millis(80);
        let started = Instant::now();
        let h = r.run_deferred("later", delay, ThreadMode::Joined, || Ok("done"));

        assert!(started.elapsed() < delay);
        assert!(!h.is_finished());

        assert_eq!(h.wait_blocking(), Ok("done"));
        assert!(started.elapsed() >= delay);
    }

    #[test]
    fn test_background_error_is_recorded_and_returned_from_thread() {
        let r = runner();
        let h = r.run_deferred::<(), _>("fail", Duration::from_millis(5), ThreadMode::Joined, || {
            Err(TaskError::failed("boom"))
        });
        assert_eq!(h.wait_blocking(), Err(TaskError::failed("boom")));
        assert_eq!(r.join_pending(), vec![TaskError::failed("boom")]);
    }

    #[test]
    fn test_background_panic_is_resumed_on_its_thread() {
        let r = runner();
        let h = r.spawn::<(), _>("explode", ThreadMode::Joined, || panic!("bg boom"));
        assert!(matches!(h.wait_blocking(), Err(TaskError::Panicked { .. })));

        let failures = r.join_pending();
        assert_eq!(
            failures,
            vec![TaskError::Panicked {
                info: "bg boom".into()
            }]
        );
    }

    #[test]
    fn test_daemon_threads_are_not_tracked() {
        let r = runner();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let h = r.spawn("daemon", ThreadMode::Daemon, move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(r.pending(), 0);
        assert_eq!(h.wait_blocking(), Ok(()));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_join_pending_waits_for_delayed_work() {
        let r = runner();
        let h = r.run_deferred("slow", Duration::from_millis(30), ThreadMode::Joined, || Ok(()));
        assert!(matches!(h.state(), TaskState::Pending | TaskState::Running));
        assert!(r.join_pending().is_empty());
        assert_eq!(h.state(), TaskState::Succeeded(()));
    }

    #[test]
    fn test_events_are_published() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let r = BackgroundRunner::new(bus);

        r.run_deferred::<(), _>("x", Duration::ZERO, ThreadMode::Joined, || {
            Err(TaskError::failed("nope"))
        });

        let scheduled = rx.try_recv().unwrap();
        assert_eq!(scheduled.kind, EventKind::TaskScheduled);
        assert_eq!(scheduled.delay_ms, Some(0));
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.kind, EventKind::TaskFailed);
        assert_eq!(failed.reason.as_deref(), Some("execution failed: nope"));
    }
}
