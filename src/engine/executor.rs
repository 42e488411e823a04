//! # ExecutionEngine: picks LocalRun or RpcRun for an invocation.
//!
//! ## Flow
//! ```text
//! run(desc)
//!   ├─► validate            empty target ──► RunError::Configuration
//!   ├─► apply env overlay + working directory
//!   │
//!   ├─ rpc map empty ──► LocalRun
//!   │     resolve (script path | Resolve) ──► LocalCall::invoke() on this thread
//!   │     └─► Outcome::Completed(value)     failure ──► RunError::Execution
//!   │
//!   └─ rpc map set ──► RpcRun
//!         RpcConfig::from_map ──► resolve eagerly ──► ServiceProxy(main = LocalCall + rpc binding)
//!         proxy.start(transport)                      (blocks for the service lifetime)
//!           └─► on_ready ──► main task on a daemon thread
//!         join tracked background tasks
//!         └─► Outcome::Served
//! ```
//!
//! ## Rules
//! - The mode is chosen once per invocation; the engine never switches between them.
//! - Everything before the transport handoff fails synchronously.
//! - The RPC path returns no engine-level result: the main task's outcome is only
//!   observable through [`ServiceProxy::main_task`] and the event stream.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::config::Config;
use crate::engine::builder::EngineBuilder;
use crate::engine::local::{LocalCall, Resolved};
use crate::engine::pump::EventPump;
use crate::error::{RunError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::invocation::InvocationDescriptor;
use crate::process::ProcessController;
use crate::proxy::ServiceProxy;
use crate::targets::{Resolve, RunScript};
use crate::tasks::BackgroundRunner;
use crate::transport::{RpcConfig, Transport};

/// Result of [`ExecutionEngine::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// LocalRun finished; scripts produce `Null`.
    Completed(Value),
    /// RpcRun finished serving.
    Served,
}

impl Outcome {
    /// The LocalRun value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::Served => None,
        }
    }
}

/// Runs invocation descriptors.
pub struct ExecutionEngine {
    cfg: Config,
    bus: Bus,
    pump: Option<EventPump>,
    runner: Arc<BackgroundRunner>,
    controller: Arc<ProcessController>,
    resolver: Arc<dyn Resolve>,
    scripts: Arc<dyn RunScript>,
    transport: Option<Arc<dyn Transport>>,
}

impl ExecutionEngine {
    /// Returns a builder for the engine.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use launchvisor::{
    ///     CallContext, Config, ExecutionEngine, InvocationDescriptor, Outcome, TargetFn,
    ///     TargetRegistry, TaskError,
    /// };
    /// use serde_json::json;
    ///
    /// let registry = Arc::new(TargetRegistry::new());
    /// registry.register(TargetFn::arc("pkg.mod:handler", |ctx: &CallContext| {
    ///     let x = ctx.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
    ///     Ok::<_, TaskError>(json!(x + 1))
    /// }));
    ///
    /// let engine = ExecutionEngine::builder(Config::default())
    ///     .with_resolver(registry)
    ///     .build()
    ///     .unwrap();
    ///
    /// let desc = InvocationDescriptor::builder("pkg.mod:handler").kwarg("x", 1).build();
    /// assert_eq!(engine.run(&desc).unwrap(), Outcome::Completed(json!(2)));
    /// ```
    pub fn builder(cfg: Config) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        pump: Option<EventPump>,
        runner: Arc<BackgroundRunner>,
        controller: Arc<ProcessController>,
        resolver: Arc<dyn Resolve>,
        scripts: Arc<dyn RunScript>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            cfg,
            bus,
            pump,
            runner,
            controller,
            resolver,
            scripts,
            transport,
        }
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Bus carrying the engine's events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runner shared by the controller and every proxy.
    pub fn runner(&self) -> &Arc<BackgroundRunner> {
        &self.runner
    }

    /// Process controller handed to every proxy.
    pub fn controller(&self) -> &Arc<ProcessController> {
        &self.controller
    }

    /// Runs `desc` in the mode its `rpc` map selects.
    ///
    /// The environment overlay is written into the process environment. When it
    /// is non-empty, the caller must make sure no other thread reads or writes the
    /// environment while `run` applies it (event workers, earlier main tasks and
    /// daemon tasks included).
    pub fn run(&self, desc: &InvocationDescriptor) -> Result<Outcome, RunError> {
        if desc.target().trim().is_empty() {
            return Err(RunError::configuration("target must not be empty"));
        }
        let workdir = apply_environment(desc)?;

        if desc.is_rpc() {
            self.run_rpc(desc, workdir)
        } else {
            self.run_local(desc, workdir).map(Outcome::Completed)
        }
    }

    /// Waits for tracked background tasks and returns their failures.
    pub fn join_background(&self) -> Vec<TaskError> {
        self.runner.join_pending()
    }

    /// Delivers pending events to subscribers and stops the event runtime.
    ///
    /// Must not be called from inside an async runtime.
    pub fn shutdown(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.shutdown();
        }
    }

    fn run_local(
        &self,
        desc: &InvocationDescriptor,
        workdir: Option<PathBuf>,
    ) -> Result<Value, RunError> {
        let resolved = Resolved::resolve(desc.target(), &*self.resolver)?;
        self.bus
            .publish(Event::new(EventKind::LocalRunStarted).with_task(desc.target()));

        LocalCall::new(desc, resolved, workdir, Arc::clone(&self.scripts), self.bus.clone())
            .invoke()
            .map_err(|source| RunError::Execution {
                target: desc.target().to_string(),
                source,
            })
    }

    fn run_rpc(
        &self,
        desc: &InvocationDescriptor,
        workdir: Option<PathBuf>,
    ) -> Result<Outcome, RunError> {
        let cfg = RpcConfig::from_map(desc.rpc())?;
        let transport = self.transport.as_ref().ok_or_else(|| {
            RunError::configuration("rpc options given but no transport is configured")
        })?;
        let resolved = Resolved::resolve(desc.target(), &*self.resolver)?;

        self.bus.publish(
            Event::new(EventKind::RpcRunStarted)
                .with_task(desc.target())
                .with_reason(cfg.mode.as_str())
                .with_ident(cfg.ident_label()),
        );

        let call = LocalCall::new(desc, resolved, workdir, Arc::clone(&self.scripts), self.bus.clone());
        let proxy = ServiceProxy::new(desc.target(), Arc::clone(&self.controller), move |proxy| {
            call.with_rpc(Arc::downgrade(proxy)).invoke()
        });

        let served = proxy.start(transport.as_ref(), &cfg);
        for failure in self.runner.join_pending() {
            tracing::warn!(err = %failure, "background task failed");
        }
        served?;
        Ok(Outcome::Served)
    }
}

/// Applies the environment overlay and enters the working directory.
///
/// Returns the absolute working directory, if one was given.
fn apply_environment(desc: &InvocationDescriptor) -> Result<Option<PathBuf>, RunError> {
    for (key, value) in desc.env() {
        if key.is_empty() || key.contains(['=', '\0']) || value.contains('\0') {
            return Err(RunError::configuration(format!(
                "invalid environment entry {key:?}"
            )));
        }
    }
    for (key, value) in desc.env() {
        // SAFETY: the caller of `ExecutionEngine::run` guarantees that no other
        // thread reads or writes the environment concurrently. Entries were
        // validated above.
        unsafe { std::env::set_var(key, value) };
    }

    let Some(dir) = desc.workdir() else {
        return Ok(None);
    };
    let dir = dir.canonicalize().map_err(|e| {
        RunError::configuration(format!("working directory {}: {e}", dir.display()))
    })?;
    std::env::set_current_dir(&dir).map_err(|e| {
        RunError::configuration(format!("working directory {}: {e}", dir.display()))
    })?;
    Ok(Some(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::process::ProcessOps;
    use crate::subscribers::Subscribe;
    use crate::targets::{CallContext, TargetFn, TargetRegistry};
    use crate::transport::ReadyCallback;
    use async_trait::async_trait;
    use serde_json::json;
    use std::ffi::OsString;
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    struct Inert;

    impl ProcessOps for Inert {
        fn terminate(&self) -> io::Result<()> {
            Ok(())
        }
        fn replace(&self, _: &Path, _: &[OsString]) -> io::Error {
            io::Error::other("disabled")
        }
        fn spawn_detached(&self, _: &Path, _: &[OsString]) -> io::Result<()> {
            Ok(())
        }
        fn exit(&self, _: i32) {}
    }

    /// Calls readiness, then stays "blocked" until the handler reports in.
    struct FakeTransport {
        serves: AtomicUsize,
        seen: Mutex<Option<RpcConfig>>,
        handler_ran: Mutex<std_mpsc::Receiver<ThreadId>>,
        handler_thread: Mutex<Option<ThreadId>>,
        serve_thread: Mutex<Option<ThreadId>>,
    }

    impl FakeTransport {
        fn new(handler_ran: std_mpsc::Receiver<ThreadId>) -> Arc<Self> {
            Arc::new(Self {
                serves: AtomicUsize::new(0),
                seen: Mutex::new(None),
                handler_ran: Mutex::new(handler_ran),
                handler_thread: Mutex::new(None),
                serve_thread: Mutex::new(None),
            })
        }
    }

    impl Transport for FakeTransport {
        fn serve(
            &self,
            proxy: Arc<ServiceProxy>,
            config: &RpcConfig,
            on_ready: ReadyCallback,
        ) -> Result<(), TransportError> {
            self.serves.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(config.clone());
            *self.serve_thread.lock().unwrap() = Some(thread::current().id());
            assert!(proxy.main_task().is_none());

            on_ready(&config.ident);

            let ran = self
                .handler_ran
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .ok();
            *self.handler_thread.lock().unwrap() = ran;
            Ok(())
        }
    }

    struct Refuse;

    impl Transport for Refuse {
        fn serve(
            &self,
            _proxy: Arc<ServiceProxy>,
            _config: &RpcConfig,
            _on_ready: ReadyCallback,
        ) -> Result<(), TransportError> {
            Err(TransportError::Failed {
                reason: "address in use".into(),
            })
        }
    }

    fn registry() -> Arc<TargetRegistry> {
        let registry = Arc::new(TargetRegistry::new());
        registry
            .register(TargetFn::arc("pkg.mod:handler", |ctx: &CallContext| {
                let x = ctx.get("x").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(x + 1))
            }))
            .register(TargetFn::arc("pkg.mod:broken", |_: &CallContext| {
                Err(TaskError::failed("boom"))
            }));
        registry
    }

    fn engine(transport: Option<Arc<dyn Transport>>) -> ExecutionEngine {
        let mut builder = ExecutionEngine::builder(Config::default())
            .with_resolver(registry())
            .with_process_ops(Arc::new(Inert))
            .with_argv(["app"]);
        if let Some(t) = transport {
            builder = builder.with_transport(t);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_empty_target_is_configuration_error() {
        let err = engine(None)
            .run(&InvocationDescriptor::builder("  ").build())
            .unwrap_err();
        assert_eq!(err.as_label(), "run_configuration");
    }

    #[test]
    fn test_local_run_returns_value_without_touching_transport() {
        let (_tx, rx) = std_mpsc::channel();
        let transport = FakeTransport::new(rx);
        let eng = engine(Some(transport.clone() as Arc<dyn Transport>));
        let mut events = eng.bus().subscribe();

        let desc = InvocationDescriptor::builder("pkg.mod:handler")
            .kwarg("x", 1)
            .build();
        assert_eq!(eng.run(&desc).unwrap(), Outcome::Completed(json!(2)));

        assert_eq!(transport.serves.load(Ordering::SeqCst), 0);
        assert_eq!(eng.runner().pending(), 0);
        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::LocalRunStarted,
                EventKind::TargetStarting,
                EventKind::TargetFinished
            ]
        );
    }

    #[test]
    fn test_local_failure_propagates_unchanged() {
        let err = engine(None)
            .run(&InvocationDescriptor::builder("pkg.mod:broken").build())
            .unwrap_err();
        match err {
            RunError::Execution { target, source } => {
                assert_eq!(target, "pkg.mod:broken");
                assert_eq!(source, TaskError::failed("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_callable_and_missing_script_are_resolution_errors() {
        let eng = engine(None);
        for target in ["pkg.mod:missing", "./no/such/script.sh"] {
            let err = eng
                .run(&InvocationDescriptor::builder(target).build())
                .unwrap_err();
            assert_eq!(err.as_label(), "run_resolution", "target {target}");
        }
    }

    #[test]
    fn test_rpc_without_transport_is_configuration_error() {
        let desc = InvocationDescriptor::builder("pkg.mod:handler")
            .rpc("mode", "http")
            .build();
        let err = engine(None).run(&desc).unwrap_err();
        assert_eq!(err.as_label(), "run_configuration");
    }

    #[test]
    fn test_rpc_run_serves_once_and_runs_handler_after_ready() {
        let (tx, rx) = std_mpsc::channel::<ThreadId>();
        let transport = FakeTransport::new(rx);
        let registry = Arc::new(TargetRegistry::new());
        let tx = Mutex::new(tx);
        registry.register(TargetFn::arc("pkg.mod:handler", move |ctx: &CallContext| {
            let proxy = ctx.rpc().ok_or_else(|| TaskError::failed("no rpc binding"))?;
            assert!(proxy.has_operation("stop"));
            let _ = tx.lock().unwrap().send(thread::current().id());
            Ok(Value::Null)
        }));
        let eng = ExecutionEngine::builder(Config::default())
            .with_resolver(registry)
            .with_process_ops(Arc::new(Inert))
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let desc = InvocationDescriptor::builder("pkg.mod:handler")
            .rpc("mode", "http")
            .rpc("ident", 8080)
            .build();
        assert_eq!(eng.run(&desc).unwrap(), Outcome::Served);

        assert_eq!(transport.serves.load(Ordering::SeqCst), 1);
        let seen = transport.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.mode, "http");
        assert_eq!(seen.ident, json!(8080));

        let handler = transport.handler_thread.lock().unwrap().unwrap();
        let server = transport.serve_thread.lock().unwrap().unwrap();
        assert_ne!(handler, server);
    }

    #[test]
    fn test_rpc_resolution_fails_before_handoff() {
        let (_tx, rx) = std_mpsc::channel();
        let transport = FakeTransport::new(rx);
        let desc = InvocationDescriptor::builder("pkg.mod:missing")
            .rpc("ident", 8080)
            .build();
        let err = engine(Some(transport.clone() as Arc<dyn Transport>))
            .run(&desc)
            .unwrap_err();
        assert_eq!(err.as_label(), "run_resolution");
        assert_eq!(transport.serves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rpc_bad_options_fail_before_handoff() {
        let (_tx, rx) = std_mpsc::channel();
        let transport = FakeTransport::new(rx);
        let desc = InvocationDescriptor::builder("pkg.mod:handler")
            .rpc("concurrency", 0)
            .build();
        let err = engine(Some(transport.clone() as Arc<dyn Transport>))
            .run(&desc)
            .unwrap_err();
        assert_eq!(err.as_label(), "run_configuration");
        assert_eq!(transport.serves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transport_failure_before_ready_propagates() {
        let desc = InvocationDescriptor::builder("pkg.mod:handler")
            .rpc("ident", 8080)
            .build();
        let err = engine(Some(Arc::new(Refuse) as Arc<dyn Transport>))
            .run(&desc)
            .unwrap_err();
        assert!(matches!(err, RunError::Transport(TransportError::Failed { .. })));
    }

    #[test]
    fn test_env_overlay_is_visible_to_target() {
        let registry = Arc::new(TargetRegistry::new());
        registry.register(TargetFn::arc("env:read", |_: &CallContext| {
            Ok(json!(std::env::var("LAUNCHVISOR_ENGINE_TEST").ok()))
        }));
        let eng = ExecutionEngine::builder(Config::default())
            .with_resolver(registry)
            .build()
            .unwrap();

        let desc = InvocationDescriptor::builder("env:read")
            .env("LAUNCHVISOR_ENGINE_TEST", "on")
            .build();
        assert_eq!(eng.run(&desc).unwrap(), Outcome::Completed(json!("on")));

        let bad = InvocationDescriptor::builder("env:read")
            .env("A=B", "x")
            .build();
        assert_eq!(eng.run(&bad).unwrap_err().as_label(), "run_configuration");
    }

    #[cfg(unix)]
    #[test]
    fn test_script_target_gets_bindings_and_returns_null() {
        use crate::targets::CommandScript;

        let path = std::env::temp_dir().join(format!("launchvisor-engine-{}.sh", std::process::id()));
        std::fs::write(&path, "[ \"$x\" = 1 ] && [ \"$name\" = demo ] || exit 3\n").unwrap();

        let eng = ExecutionEngine::builder(Config::default())
            .with_scripts(Arc::new(CommandScript::with_interpreter("sh")))
            .build()
            .unwrap();
        let target = path.to_string_lossy().into_owned();

        let ok = InvocationDescriptor::builder(target.as_str())
            .kwarg("x", 1)
            .extra("name", "demo")
            .build();
        assert_eq!(eng.run(&ok).unwrap(), Outcome::Completed(Value::Null));

        let failing = InvocationDescriptor::builder(target.as_str())
            .kwarg("x", 2)
            .build();
        assert_eq!(eng.run(&failing).unwrap_err().as_label(), "run_execution");

        let _ = std::fs::remove_file(&path);
    }

    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &crate::events::Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[test]
    fn test_subscribers_see_events_after_shutdown() {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let eng = ExecutionEngine::builder(Config::default())
            .with_resolver(registry())
            .with_subscribers(vec![sink.clone() as Arc<dyn Subscribe>])
            .build()
            .unwrap();

        assert!(
            eng.run(&InvocationDescriptor::builder("pkg.mod:broken").build())
                .is_err()
        );
        eng.shutdown();

        let kinds = sink.0.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![
                EventKind::LocalRunStarted,
                EventKind::TargetStarting,
                EventKind::TargetFailed
            ]
        );
    }
}
