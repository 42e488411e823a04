//! # OS process primitives.
//!
//! [`ProcessOps`] is the seam between the [`ProcessController`](crate::ProcessController)
//! and the operating system. [`OsProcess`] is the real implementation; tests inject
//! their own to observe termination/replacement without touching the test process.
//!
//! ## Unix
//! - `terminate` sends **SIGTERM** to the current process.
//! - `replace` uses `execv` (through [`CommandExt::exec`](std::os::unix::process::CommandExt::exec)),
//!   keeping the original `argv[0]`.
//! - `spawn_detached` starts the child in its own process group.
//!
//! ## Other platforms
//! `replace` is unsupported (the controller falls back to spawning) and
//! `terminate` exits the process with code 0.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Process-level side effects used by `stop` and `reload`.
pub trait ProcessOps: Send + Sync + 'static {
    /// Asks the current process to terminate gracefully.
    fn terminate(&self) -> io::Result<()>;

    /// Replaces the current process image with `program`, passing `argv`
    /// (`argv[0]` included). Only returns on failure.
    fn replace(&self, program: &Path, argv: &[OsString]) -> io::Error;

    /// Starts `program` with `argv` as a detached child.
    fn spawn_detached(&self, program: &Path, argv: &[OsString]) -> io::Result<()>;

    /// Ends the current process with `code`.
    fn exit(&self, code: i32);
}

/// [`ProcessOps`] backed by the real operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsProcess;

impl ProcessOps for OsProcess {
    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        // SAFETY: getpid has no preconditions; kill only delivers a signal to ourselves.
        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> io::Result<()> {
        std::process::exit(0)
    }

    #[cfg(unix)]
    fn replace(&self, program: &Path, argv: &[OsString]) -> io::Error {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new(program);
        if let Some((arg0, rest)) = argv.split_first() {
            cmd.arg0(arg0).args(rest);
        }
        cmd.exec()
    }

    #[cfg(not(unix))]
    fn replace(&self, _program: &Path, _argv: &[OsString]) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "in-place process replacement is not available on this platform",
        )
    }

    fn spawn_detached(&self, program: &Path, argv: &[OsString]) -> io::Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(argv.iter().skip(1)).stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if let Some(arg0) = argv.first() {
                cmd.arg0(arg0);
            }
            cmd.process_group(0);
        }
        cmd.spawn().map(drop)
    }

    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}
