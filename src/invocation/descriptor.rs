//! # Invocation descriptor.
//!
//! [`InvocationDescriptor`] is the immutable description of one run: what to
//! call, with which arguments, in which environment, and whether to host it
//! behind an RPC transport.
//!
//! It is produced by an outer collaborator (a CLI parser, a job queue, ...)
//! through [`InvocationDescriptor::builder`] and consumed by
//! [`ExecutionEngine::run`](crate::ExecutionEngine::run). The engine never mutates it.
//!
//! ## Example
//! ```rust
//! use launchvisor::InvocationDescriptor;
//! use serde_json::json;
//!
//! let desc = InvocationDescriptor::builder("pkg.mod:handler")
//!     .kwarg("x", json!(1))
//!     .kwarg_raw("verbose", "true")
//!     .env("MODE", "batch")
//!     .build();
//!
//! assert_eq!(desc.target(), "pkg.mod:handler");
//! assert_eq!(desc.kwargs().get("verbose"), Some(&json!(true)));
//! assert!(!desc.is_rpc());
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::invocation::value::guess;

/// Immutable description of one invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvocationDescriptor {
    target: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    extra: Map<String, Value>,
    env: BTreeMap<String, String>,
    rpc: Map<String, Value>,
    workdir: Option<PathBuf>,
}

impl InvocationDescriptor {
    /// Starts building a descriptor for `target`.
    ///
    /// `target` is either a script path or a callable reference understood by the
    /// configured [`Resolve`](crate::Resolve) implementation.
    pub fn builder(target: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder {
            inner: InvocationDescriptor {
                target: target.into(),
                ..Default::default()
            },
        }
    }

    /// Script path or callable reference.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Keyword arguments.
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Additional namespace made available to the target next to its kwargs.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Environment overlay applied before execution.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// RPC options; empty means local mode.
    pub fn rpc(&self) -> &Map<String, Value> {
        &self.rpc
    }

    /// Working directory to switch to before execution.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// True when RPC options are present.
    pub fn is_rpc(&self) -> bool {
        !self.rpc.is_empty()
    }
}

/// Builder for [`InvocationDescriptor`].
#[derive(Clone, Debug)]
pub struct InvocationBuilder {
    inner: InvocationDescriptor,
}

impl InvocationBuilder {
    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.inner.args.push(value.into());
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.kwargs.insert(key.into(), value.into());
        self
    }

    /// Sets a keyword argument from raw text, guessing its type.
    pub fn kwarg_raw(self, key: impl Into<String>, raw: &str) -> Self {
        self.kwarg(key, guess(raw))
    }

    /// Sets an entry of the extra namespace.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.extra.insert(key.into(), value.into());
        self
    }

    /// Sets an entry of the extra namespace from raw text, guessing its type.
    pub fn extra_raw(self, key: impl Into<String>, raw: &str) -> Self {
        self.extra(key, guess(raw))
    }

    /// Sets an environment variable of the overlay.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.env.insert(key.into(), value.into());
        self
    }

    /// Sets an RPC option (`mode`, `concurrency`, `ident`, or transport-specific keys).
    pub fn rpc(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner.rpc.insert(key.into(), value.into());
        self
    }

    /// Sets an RPC option from raw text, guessing its type.
    pub fn rpc_raw(self, key: impl Into<String>, raw: &str) -> Self {
        self.rpc(key, guess(raw))
    }

    /// Sets the working directory.
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.workdir = Some(dir.into());
        self
    }

    /// Finishes the descriptor.
    ///
    /// Validation (e.g. a non-empty target) happens when the engine runs it.
    pub fn build(self) -> InvocationDescriptor {
        self.inner
    }
}
