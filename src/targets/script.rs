//! # Script targets.
//!
//! A target reference that looks like a path is run as a script rather than
//! resolved as a callable. The script receives the keyword arguments and the
//! extra namespace as top-level bindings and produces no value.
//!
//! [`CommandScript`] runs the file as a child process, optionally through an
//! interpreter, exporting every binding as an environment variable:
//! strings verbatim, every other value JSON-encoded.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::{Map, Value};

use crate::error::TaskError;

/// Runs script targets.
pub trait RunScript: Send + Sync + 'static {
    /// Runs the script at `path` with `bindings`, inside `workdir` if given.
    fn run(
        &self,
        path: &Path,
        bindings: &Map<String, Value>,
        workdir: Option<&Path>,
    ) -> Result<(), TaskError>;
}

/// [`RunScript`] spawning a child process and waiting for it.
#[derive(Clone, Debug, Default)]
pub struct CommandScript {
    interpreter: Option<PathBuf>,
}

impl CommandScript {
    /// Runs scripts directly (they must be executable).
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs scripts as `interpreter <path>`.
    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: Some(interpreter.into()),
        }
    }
}

impl RunScript for CommandScript {
    fn run(
        &self,
        path: &Path,
        bindings: &Map<String, Value>,
        workdir: Option<&Path>,
    ) -> Result<(), TaskError> {
        let mut cmd = match &self.interpreter {
            Some(interp) => {
                let mut c = Command::new(interp);
                c.arg(path);
                c
            }
            None => Command::new(path),
        };
        cmd.envs(bindings.iter().map(|(k, v)| (k, env_value(v))))
            .stdin(Stdio::null());
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(TaskError::failed(format!(
                "script {} exited with {status}",
                path.display()
            )))
        }
    }
}

/// Renders a binding for the environment.
fn env_value(v: &Value) -> OsString {
    match v {
        Value::String(s) => OsString::from(s),
        other => OsString::from(other.to_string()),
    }
}

/// True when `target` should be treated as a script path.
pub(crate) fn looks_like_path(target: &str) -> bool {
    target.contains('/') || target.contains(std::path::MAIN_SEPARATOR) || Path::new(target).exists()
}
