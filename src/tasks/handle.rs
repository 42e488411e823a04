//! # Future-like handle of a background task.
//!
//! A [`TaskHandle`] observes one deferred unit of work through its lifecycle:
//!
//! ```text
//! Pending ──► Running ──► Succeeded(value)
//!                    └──► Failed(TaskError)
//! ```
//!
//! ## Rules
//! - Exactly **one** terminal transition per task.
//! - Handles are cheap to clone; any number of observers may query concurrently.
//! - Observers choose between polling ([`TaskHandle::try_result`]), async waiting
//!   ([`TaskHandle::wait`]) and blocking ([`TaskHandle::wait_blocking`]).
//!
//! The state lives in a [`tokio::sync::watch`] channel; the writing side
//! ([`Completion`]) is owned by whichever thread runs the work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::watch;

use crate::error::TaskError;

/// Global task id counter.
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a background task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskState<T> {
    /// Accepted, waiting for its delay to elapse.
    Pending,
    /// The work is executing.
    Running,
    /// The work returned a value.
    Succeeded(T),
    /// The work failed or panicked.
    Failed(TaskError),
}

impl<T> TaskState<T> {
    /// True for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded(_) | TaskState::Failed(_))
    }

    /// Short label for display.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded(_) => "succeeded",
            TaskState::Failed(_) => "failed",
        }
    }
}

impl<T: Clone> TaskState<T> {
    fn to_result(&self) -> Option<Result<T, TaskError>> {
        match self {
            TaskState::Succeeded(v) => Some(Ok(v.clone())),
            TaskState::Failed(e) => Some(Err(e.clone())),
            TaskState::Pending | TaskState::Running => None,
        }
    }
}

/// Observer side of a background task.
pub struct TaskHandle<T> {
    id: u64,
    name: Arc<str>,
    rx: watch::Receiver<TaskState<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Creates a pending task and returns its observer and completion sides.
    pub(crate) fn pending(name: &str) -> (Self, Completion<T>) {
        let (tx, rx) = watch::channel(TaskState::Pending);
        let handle = Self {
            id: TASK_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            name: Arc::from(name),
            rx,
        };
        (handle, Completion { tx })
    }

    /// Process-unique task id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Task name given at scheduling time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TaskState<T> {
        self.rx.borrow().clone()
    }

    /// True once the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_terminal()
    }

    /// Returns the outcome if the task is finished, `None` otherwise.
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        self.rx.borrow().to_result()
    }

    /// Waits until the task is finished and returns its outcome.
    ///
    /// Returns [`TaskError::Lost`] if the worker vanished without recording a result.
    pub async fn wait(&self) -> Result<T, TaskError> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(TaskState::is_terminal).await {
            Ok(state) => state.to_result(),
            Err(_closed) => None,
        };
        outcome.unwrap_or(Err(TaskError::Lost))
    }

    /// Blocks the current thread until the task is finished.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait_blocking(&self) -> Result<T, TaskError> {
        futures::executor::block_on(self.wait())
    }
}

impl<T> fmt::Display for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.rx.borrow().as_label();
        write!(f, "{}#{}({})", self.name, self.id, label)
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.rx.borrow().as_label())
            .finish()
    }
}

/// Writer side of a background task.
pub(crate) struct Completion<T> {
    tx: watch::Sender<TaskState<T>>,
}

impl<T> Completion<T> {
    /// Marks the task as running.
    pub(crate) fn running(&self) {
        self.tx.send_if_modified(|state| {
            if matches!(state, TaskState::Pending) {
                *state = TaskState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Records the terminal outcome. Later calls are ignored.
    pub(crate) fn finish(&self, outcome: Result<T, TaskError>) {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = match outcome.take() {
                Some(Ok(v)) => TaskState::Succeeded(v),
                Some(Err(e)) => TaskState::Failed(e),
                None => return false,
            };
            true
        });
    }
}
