use std::ffi::OsString;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::executor::ExecutionEngine;
use crate::engine::pump::EventPump;
use crate::error::RunError;
use crate::events::Bus;
use crate::process::{OsProcess, ProcessController, ProcessOps};
use crate::subscribers::Subscribe;
use crate::targets::{CommandScript, Resolve, RunScript, TargetRegistry};
use crate::tasks::BackgroundRunner;
use crate::transport::Transport;

/// Builder for constructing an [`ExecutionEngine`] with its collaborators.
///
/// Defaults: an empty [`TargetRegistry`], [`CommandScript`] for path-like targets,
/// [`OsProcess`] for process control, no transport, no subscribers.
pub struct EngineBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    resolver: Arc<dyn Resolve>,
    scripts: Arc<dyn RunScript>,
    transport: Option<Arc<dyn Transport>>,
    process_ops: Arc<dyn ProcessOps>,
    argv: Option<Vec<OsString>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            resolver: Arc::new(TargetRegistry::new()),
            scripts: Arc::new(CommandScript::new()),
            transport: None,
            process_ops: Arc::new(OsProcess),
            argv: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// With at least one subscriber the engine starts a small tokio runtime that
    /// delivers events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the resolver for callable references.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the runner for path-like targets.
    pub fn with_scripts(mut self, scripts: Arc<dyn RunScript>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Sets the transport used by RPC runs. Without one, RPC descriptors are rejected.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the OS side effects behind `stop` and `reload`.
    pub fn with_process_ops(mut self, ops: Arc<dyn ProcessOps>) -> Self {
        self.process_ops = ops;
        self
    }

    /// Replaces the argument vector preserved by `reload` (defaults to the current one).
    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the engine.
    ///
    /// Fails with [`RunError::Runtime`] if subscribers are configured and the event
    /// runtime cannot be created. Must not be called from inside an async runtime
    /// when subscribers are configured.
    pub fn build(self) -> Result<ExecutionEngine, RunError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let pump = if self.subscribers.is_empty() {
            None
        } else {
            Some(EventPump::start(&self.cfg, self.subscribers, &bus)?)
        };

        let runner = Arc::new(BackgroundRunner::new(bus.clone()));
        let mut controller =
            ProcessController::new(Arc::clone(&runner), self.process_ops, bus.clone())
                .with_respawn_exit_code(self.cfg.respawn_exit_code)
                .with_default_delay(self.cfg.default_delay);
        if let Some(argv) = self.argv {
            controller = controller.with_argv(argv);
        }

        Ok(ExecutionEngine::new_internal(
            self.cfg,
            bus,
            pump,
            runner,
            Arc::new(controller),
            self.resolver,
            self.scripts,
            self.transport,
        ))
    }
}
