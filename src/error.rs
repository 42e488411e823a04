//! Error types used by the launchvisor engine, background tasks and the service proxy.
//!
//! This module defines four error enums:
//!
//! - [`RunError`]: errors surfaced by [`ExecutionEngine::run`](crate::ExecutionEngine::run).
//! - [`TaskError`]: failures of a single unit of work (a target call, an operation or a background task).
//! - [`ProxyError`]: failures of a name-based call through a [`ServiceProxy`](crate::ServiceProxy).
//! - [`TransportError`]: failures of a [`Transport`](crate::Transport) while serving.
//!
//! All of them provide `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use thiserror::Error;

/// # Errors produced by an invocation.
///
/// Everything before the RPC handoff is synchronous and surfaced here unchanged.
/// Failures after the handoff stay on the background thread that hit them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// The invocation descriptor is missing or carries an invalid field.
    #[error("invalid invocation: {reason}")]
    Configuration {
        /// What is wrong with the descriptor.
        reason: String,
    },

    /// The target (script path or callable reference) could not be located.
    #[error("cannot resolve target {target:?}: {reason}")]
    Resolution {
        /// The reference that failed to resolve.
        target: String,
        /// Why it failed.
        reason: String,
    },

    /// The resolved target itself failed while running locally.
    #[error("target {target:?} failed: {source}")]
    Execution {
        /// Name of the target that failed.
        target: String,
        /// The failure reported by the target.
        #[source]
        source: TaskError,
    },

    /// The transport failed before or while serving.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The event runtime could not be created.
    #[error("event runtime unavailable: {reason}")]
    Runtime {
        /// Underlying I/O error message.
        reason: String,
    },
}

impl RunError {
    /// Shorthand for [`RunError::Configuration`].
    pub fn configuration(reason: impl Into<String>) -> Self {
        RunError::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`RunError::Resolution`].
    pub fn resolution(target: impl Into<String>, reason: impl Into<String>) -> Self {
        RunError::Resolution {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use launchvisor::RunError;
    ///
    /// let err = RunError::configuration("empty target");
    /// assert_eq!(err.as_label(), "run_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Configuration { .. } => "run_configuration",
            RunError::Resolution { .. } => "run_resolution",
            RunError::Execution { .. } => "run_execution",
            RunError::Transport(_) => "run_transport",
            RunError::Runtime { .. } => "run_runtime",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunError::Configuration { reason } => format!("configuration: {reason}"),
            RunError::Resolution { target, reason } => format!("resolution of {target}: {reason}"),
            RunError::Execution { target, source } => {
                format!("execution of {target}: {}", source.as_message())
            }
            RunError::Transport(e) => format!("transport: {}", e.as_message()),
            RunError::Runtime { reason } => format!("runtime: {reason}"),
        }
    }
}

/// # Errors produced by a unit of work.
///
/// Returned by targets and operations, and recorded on a
/// [`TaskHandle`](crate::TaskHandle) when a background task fails.
/// The type is `Clone` so every observer of a handle sees the same failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The work returned an error.
    #[error("execution failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The work panicked.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The background thread could not be started.
    #[error("cannot spawn thread: {error}")]
    Spawn {
        /// The OS error message.
        error: String,
    },

    /// The worker went away without recording a result.
    #[error("task lost before completion")]
    Lost,
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        TaskError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use launchvisor::TaskError;
    ///
    /// assert_eq!(TaskError::failed("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Spawn { .. } => "task_spawn",
            TaskError::Lost => "task_lost",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Failed { error } => format!("error: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Spawn { error } => format!("spawn: {error}"),
            TaskError::Lost => "lost".to_string(),
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::failed(e.to_string())
    }
}

/// # Errors produced by a call through the service proxy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The name is neither a built-in, a registered operation nor exposed by the bound object.
    #[error("no operation named {name:?}")]
    OperationNotFound {
        /// The requested operation name.
        name: String,
    },

    /// The name belongs to a built-in process operation and cannot be registered.
    #[error("operation name {name:?} is reserved")]
    Reserved {
        /// The rejected name.
        name: String,
    },

    /// An argument was missing or had the wrong type.
    #[error("invalid argument for {name:?}: {reason}")]
    InvalidArgument {
        /// The operation being called.
        name: String,
        /// What is wrong with the arguments.
        reason: String,
    },

    /// The operation ran and failed.
    #[error("operation {name:?} failed: {source}")]
    Operation {
        /// The operation that failed.
        name: String,
        /// The failure reported by the operation.
        #[source]
        source: TaskError,
    },
}

impl ProxyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProxyError::OperationNotFound { .. } => "proxy_not_found",
            ProxyError::Reserved { .. } => "proxy_reserved",
            ProxyError::InvalidArgument { .. } => "proxy_invalid_argument",
            ProxyError::Operation { .. } => "proxy_operation",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProxyError::OperationNotFound { name } => format!("not found: {name}"),
            ProxyError::Reserved { name } => format!("reserved: {name}"),
            ProxyError::InvalidArgument { name, reason } => format!("{name}: {reason}"),
            ProxyError::Operation { name, source } => format!("{name}: {}", source.as_message()),
        }
    }
}

/// # Errors produced by a transport.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O failure (runtime construction, signal registration, bind).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport cannot serve anymore (already served, or its peer went away).
    #[error("transport closed")]
    Closed,

    /// Transport-specific failure.
    #[error("{reason}")]
    Failed {
        /// Transport-specific message.
        reason: String,
    },

    /// The remote side rejected or failed the call.
    #[error("remote call failed: {0}")]
    Remote(#[from] ProxyError),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Io(_) => "transport_io",
            TransportError::Closed => "transport_closed",
            TransportError::Failed { .. } => "transport_failed",
            TransportError::Remote(_) => "transport_remote",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::Io(e) => format!("io: {e}"),
            TransportError::Closed => "closed".to_string(),
            TransportError::Failed { reason } => reason.clone(),
            TransportError::Remote(e) => format!("remote: {}", e.as_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(RunError::resolution("x", "missing").as_label(), "run_resolution");
        assert_eq!(TaskError::Lost.as_label(), "task_lost");
        assert_eq!(
            ProxyError::OperationNotFound { name: "x".into() }.as_label(),
            "proxy_not_found"
        );
        assert_eq!(TransportError::Closed.as_label(), "transport_closed");
    }

    #[test]
    fn test_execution_error_keeps_source() {
        let err = RunError::Execution {
            target: "pkg.mod:handler".into(),
            source: TaskError::failed("boom"),
        };
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.as_message(), "execution of pkg.mod:handler: error: boom");
        let src = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(src.as_deref(), Some("execution failed: boom"));
    }

    #[test]
    fn test_io_error_converts_to_task_failure() {
        let io = std::io::Error::other("denied");
        assert_eq!(TaskError::from(io), TaskError::failed("denied"));
    }
}
