//! LocalRun: one call of a resolved target.
//!
//! The same [`LocalCall`] backs both modes. LocalRun invokes it on the caller's
//! thread; RpcRun moves it into the proxy's main task with the `rpc` binding set.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::{RunError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::invocation::InvocationDescriptor;
use crate::proxy::ServiceProxy;
use crate::targets::{CallContext, Resolve, RunScript, TargetRef, looks_like_path};

/// What a target reference resolved to.
pub(crate) enum Resolved {
    Script(PathBuf),
    Callable(TargetRef),
}

impl Resolved {
    /// Resolves `target`: path-like references are scripts, the rest go to `resolver`.
    pub(crate) fn resolve(target: &str, resolver: &dyn Resolve) -> Result<Self, RunError> {
        if !looks_like_path(target) {
            return resolver.resolve(target).map(Resolved::Callable);
        }
        match Path::new(target).canonicalize() {
            Ok(path) if path.is_file() => Ok(Resolved::Script(path)),
            Ok(_) => Err(RunError::resolution(target, "not a file")),
            Err(e) => Err(RunError::resolution(target, e.to_string())),
        }
    }
}

/// A resolved target together with everything needed to run it once.
pub(crate) struct LocalCall {
    name: String,
    resolved: Resolved,
    ctx: CallContext,
    workdir: Option<PathBuf>,
    scripts: Arc<dyn RunScript>,
    bus: Bus,
}

impl LocalCall {
    pub(crate) fn new(
        desc: &InvocationDescriptor,
        resolved: Resolved,
        workdir: Option<PathBuf>,
        scripts: Arc<dyn RunScript>,
        bus: Bus,
    ) -> Self {
        Self {
            name: desc.target().to_string(),
            resolved,
            ctx: CallContext::from_descriptor(desc),
            workdir,
            scripts,
            bus,
        }
    }

    /// Makes the proxy reachable from the target under the `rpc` binding.
    pub(crate) fn with_rpc(mut self, proxy: Weak<ServiceProxy>) -> Self {
        self.ctx = self.ctx.with_rpc(proxy);
        self
    }

    /// Runs the target. Scripts yield `Null`.
    pub(crate) fn invoke(self) -> Result<Value, TaskError> {
        self.bus
            .publish(Event::new(EventKind::TargetStarting).with_task(self.name.as_str()));

        let out = match &self.resolved {
            Resolved::Script(path) => self
                .scripts
                .run(path, &self.ctx.bindings(), self.workdir.as_deref())
                .map(|()| Value::Null),
            Resolved::Callable(target) => target.call(&self.ctx),
        };

        let ev = match &out {
            Ok(_) => Event::new(EventKind::TargetFinished).with_task(self.name.as_str()),
            Err(e) => Event::new(EventKind::TargetFailed)
                .with_task(self.name.as_str())
                .with_reason(e.to_string()),
        };
        self.bus.publish(ev);
        out
    }
}
