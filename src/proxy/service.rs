//! # ServiceProxy: the callable surface of an RPC-hosted target.
//!
//! The proxy is what a [`Transport`] serves. It answers remote calls by name and,
//! once the transport reports readiness, runs the wrapped main work on a daemon
//! thread.
//!
//! ## Lookup order
//! ```text
//! call(name)
//!   ├─► built-in process operation  (stop / reload / background)
//!   ├─► registered operation        (register_operation)
//!   ├─► bound delegate              (bind + Expose::operations)
//!   └─► ProxyError::OperationNotFound
//! ```
//!
//! ## Lifecycle
//! ```text
//! start(transport, cfg) ──► transport.serve(proxy, cfg, on_ready)   (blocks)
//!                                        │
//!                                        └─► on_ready(ident) ──► ServiceReady
//!                                                           └──► spawn(Daemon): main()
//! ```
//!
//! ## Rules
//! - Built-in names are reserved; registering one fails with [`ProxyError::Reserved`].
//! - The main work runs at most once; later readiness signals are ignored.
//! - A failing main task is recorded on [`ServiceProxy::main_task`] and never stops
//!   the transport.
//! - `bind` and `register_operation` are setup-time calls.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ProxyError, TaskError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::process::ProcessController;
use crate::proxy::operation::{CallArgs, Expose, Operation};
use crate::tasks::{TaskHandle, ThreadMode};
use crate::transport::{ReadyCallback, RpcConfig, Transport, ident_label};

/// Operations every proxy answers to before any registered or bound name.
pub const BUILTIN_OPERATIONS: [&str; 3] = ["stop", "reload", "background"];

type MainFn = Box<dyn FnOnce(&Arc<ServiceProxy>) -> Result<Value, TaskError> + Send>;

/// Name-based call surface served by a transport.
pub struct ServiceProxy {
    me: Weak<ServiceProxy>,
    name: String,
    main: Mutex<Option<MainFn>>,
    main_task: OnceLock<TaskHandle<Value>>,
    bound: RwLock<Option<Arc<dyn Expose>>>,
    operations: RwLock<HashMap<String, Operation>>,
    controller: Arc<ProcessController>,
}

impl ServiceProxy {
    /// Creates a proxy that runs `main` once the service is ready.
    ///
    /// `main` receives the live proxy. `name` labels the main task and its events.
    pub fn new<F>(name: impl Into<String>, controller: Arc<ProcessController>, main: F) -> Arc<Self>
    where
        F: FnOnce(&Arc<ServiceProxy>) -> Result<Value, TaskError> + Send + 'static,
    {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            name,
            main: Mutex::new(Some(Box::new(main))),
            main_task: OnceLock::new(),
            bound: RwLock::new(None),
            operations: RwLock::new(HashMap::new()),
            controller,
        })
    }

    /// Name of the wrapped main work.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller backing the built-in operations.
    pub fn controller(&self) -> &Arc<ProcessController> {
        &self.controller
    }

    /// Sets the delegate consulted after registered operations.
    pub fn bind(&self, obj: Arc<dyn Expose>) -> &Self {
        *self.bound.write().unwrap_or_else(PoisonError::into_inner) = Some(obj);
        self
    }

    /// Registers `op` under `name`, replacing a previous registration.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use launchvisor::{BackgroundRunner, Bus, CallArgs, OsProcess, ProcessController, ProxyError, ServiceProxy};
    /// use serde_json::{json, Value};
    ///
    /// let bus = Bus::default();
    /// let runner = Arc::new(BackgroundRunner::new(bus.clone()));
    /// let ctl = Arc::new(ProcessController::new(runner, Arc::new(OsProcess), bus));
    /// let proxy = ServiceProxy::new("demo", ctl, |_proxy| Ok(Value::Null));
    ///
    /// proxy.register_operation("ping", |_args: &CallArgs| Ok(json!("pong"))).unwrap();
    /// assert_eq!(proxy.call("ping", CallArgs::new()), Ok(json!("pong")));
    ///
    /// let err = proxy.register_operation("stop", |_args: &CallArgs| Ok(Value::Null));
    /// assert!(matches!(err, Err(ProxyError::Reserved { .. })));
    /// ```
    pub fn register_operation<F>(&self, name: &str, op: F) -> Result<&Self, ProxyError>
    where
        F: Fn(&CallArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        if BUILTIN_OPERATIONS.contains(&name) {
            return Err(ProxyError::Reserved { name: name.into() });
        }
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(op));
        Ok(self)
    }

    /// True if `call(name, ..)` would find an implementation.
    pub fn has_operation(&self, name: &str) -> bool {
        BUILTIN_OPERATIONS.contains(&name)
            || self.read_operations().contains_key(name)
            || self
                .bound()
                .is_some_and(|obj| obj.operations().iter().any(|n| n == name))
    }

    /// Every name this proxy answers to, sorted.
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BUILTIN_OPERATIONS.iter().map(|n| n.to_string()).collect();
        names.extend(self.read_operations().keys().cloned());
        if let Some(obj) = self.bound() {
            names.extend(obj.operations());
        }
        names.into_iter().collect()
    }

    /// Calls the operation `name`.
    pub fn call(&self, name: &str, args: CallArgs) -> Result<Value, ProxyError> {
        match name {
            "stop" => return self.call_stop(&args),
            "reload" => return self.call_reload(&args),
            "background" => return self.call_background(&args),
            _ => {}
        }

        let registered = self.read_operations().get(name).cloned();
        if let Some(op) = registered {
            return op(&args).map_err(|source| operation_failed(name, source));
        }
        match self.bound() {
            Some(obj) if obj.operations().iter().any(|n| n == name) => obj
                .invoke(name, &args)
                .map_err(|source| operation_failed(name, source)),
            _ => Err(ProxyError::OperationNotFound { name: name.into() }),
        }
    }

    /// Schedules termination of the hosting process.
    pub fn stop(&self, delay: Option<Duration>) -> String {
        self.controller
            .stop(delay.unwrap_or_else(|| self.controller.default_delay()))
    }

    /// Schedules a restart of the hosting process.
    pub fn reload(&self, exec_path: Option<PathBuf>, delay: Option<Duration>) -> String {
        self.controller.reload(
            exec_path,
            delay.unwrap_or_else(|| self.controller.default_delay()),
        )
    }

    /// Runs `f` as a background task after `delay`.
    ///
    /// [`ThreadMode::Joined`] tasks are waited for before the engine returns;
    /// [`ThreadMode::Daemon`] ones are not.
    pub fn add_background_task<T, F>(
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
        self.controller.runner().run_deferred(name, delay, mode, f)
    }

    /// Hands the proxy to `transport` and blocks for the service lifetime.
    ///
    /// A failure before readiness is returned here and the main work never runs.
    pub fn start(&self, transport: &dyn Transport, config: &RpcConfig) -> Result<(), TransportError> {
        let me = self.me.upgrade().ok_or(TransportError::Closed)?;
        let weak = self.me.clone();
        let on_ready: ReadyCallback = Box::new(move |ident: &Value| {
            if let Some(proxy) = weak.upgrade() {
                proxy.on_ready(ident);
            }
        });

        let served = transport.serve(me, config, on_ready);

        let mut ev = Event::new(EventKind::ServiceStopped).with_task(self.name.as_str());
        if let Err(e) = &served {
            ev = ev.with_reason(e.to_string());
        }
        self.bus().publish(ev);
        served
    }

    /// Readiness callback: starts the main work on a daemon thread, once.
    pub fn on_ready(&self, ident: &Value) {
        let main = self.main.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(main) = main else {
            tracing::warn!(proxy = %self.name, "readiness signalled again, ignored");
            return;
        };
        let Some(me) = self.me.upgrade() else {
            return;
        };

        self.bus().publish(
            Event::new(EventKind::ServiceReady)
                .with_task(self.name.as_str())
                .with_ident(ident_label(ident)),
        );
        let main_task = &self.main_task;
        self.controller.runner().spawn_observed(
            &self.name,
            ThreadMode::Daemon,
            |handle| {
                let _ = main_task.set(handle.clone());
            },
            move || main(&me),
        );
    }

    /// Handle of the main work, once readiness has fired.
    ///
    /// Set before the main work starts, so the main work itself always sees it.
    pub fn main_task(&self) -> Option<TaskHandle<Value>> {
        self.main_task.get().cloned()
    }

    fn bus(&self) -> &Bus {
        self.controller.bus()
    }

    fn bound(&self) -> Option<Arc<dyn Expose>> {
        self.bound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_operations(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Operation>> {
        self.operations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn call_stop(&self, args: &CallArgs) -> Result<Value, ProxyError> {
        let delay = seconds("stop", args.get(0, "delay"))?;
        Ok(Value::String(self.stop(delay)))
    }

    fn call_reload(&self, args: &CallArgs) -> Result<Value, ProxyError> {
        let exec_path = match args.get(0, "exec_path") {
            None => None,
            Some(Value::String(p)) => Some(PathBuf::from(p)),
            Some(other) => return Err(invalid("reload", format!("exec_path must be a string, got {other}"))),
        };
        let delay = seconds("reload", args.get(1, "delay"))?;
        Ok(Value::String(self.reload(exec_path, delay)))
    }

    fn call_background(&self, args: &CallArgs) -> Result<Value, ProxyError> {
        let op = match args.get(0, "op") {
            Some(Value::String(op)) => op.clone(),
            Some(other) => return Err(invalid("background", format!("op must be a string, got {other}"))),
            None => return Err(invalid("background", "missing op")),
        };
        if op == "background" || !self.has_operation(&op) {
            return Err(ProxyError::OperationNotFound { name: op });
        }

        let inner = CallArgs {
            positional: match args.named.get("args") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => return Err(invalid("background", format!("args must be a list, got {other}"))),
            },
            named: match args.named.get("kwargs") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(other) => return Err(invalid("background", format!("kwargs must be a map, got {other}"))),
            },
        };
        let delay = seconds("background", args.get(1, "delay"))?
            .unwrap_or_else(|| self.controller.default_delay());
        let mode = match args.get(2, "daemon") {
            None | Some(Value::Bool(false)) => ThreadMode::Joined,
            Some(Value::Bool(true)) => ThreadMode::Daemon,
            Some(other) => return Err(invalid("background", format!("daemon must be a bool, got {other}"))),
        };

        let me = self.me.upgrade().ok_or_else(|| invalid("background", "proxy is gone"))?;
        let target = op.clone();
        let task = self.add_background_task(&op, delay, mode, move || {
            me.call(&target, inner)
                .map_err(|e| TaskError::failed(e.to_string()))
        });
        Ok(Value::String(format!(
            "running {op} in {delay:?}, background task: {task}"
        )))
    }
}

fn operation_failed(name: &str, source: TaskError) -> ProxyError {
    ProxyError::Operation {
        name: name.into(),
        source,
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ProxyError {
    ProxyError::InvalidArgument {
        name: name.into(),
        reason: reason.into(),
    }
}

/// Parses an optional non-negative number of seconds.
fn seconds(name: &str, value: Option<&Value>) -> Result<Option<Duration>, ProxyError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .as_f64()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(Some)
        .ok_or_else(|| {
            invalid(
                name,
                format!("delay must be a non-negative number of seconds, got {value}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOps;
    use crate::tasks::BackgroundRunner;
    use serde_json::json;
    use std::ffi::OsString;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Hooks {
        terminated: AtomicUsize,
    }

    impl ProcessOps for Hooks {
        fn terminate(&self) -> io::Result<()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn replace(&self, _: &Path, _: &[OsString]) -> io::Error {
            io::Error::other("no exec in tests")
        }
        fn spawn_detached(&self, _: &Path, _: &[OsString]) -> io::Result<()> {
            Ok(())
        }
        fn exit(&self, _: i32) {}
    }

    struct Delegate;

    impl Expose for Delegate {
        fn operations(&self) -> Vec<String> {
            vec!["greet".into(), "whoami".into()]
        }
        fn invoke(&self, name: &str, _args: &CallArgs) -> Result<Value, TaskError> {
            Ok(json!(format!("delegate:{name}")))
        }
    }

    fn controller(hooks: Arc<Hooks>) -> Arc<ProcessController> {
        let bus = Bus::new(64);
        let runner = Arc::new(BackgroundRunner::new(bus.clone()));
        Arc::new(
            ProcessController::new(runner, hooks, bus)
                .with_argv(["svc"])
                .with_default_delay(Duration::ZERO),
        )
    }

    fn proxy() -> Arc<ServiceProxy> {
        ServiceProxy::new("svc", controller(Arc::default()), |_| Ok(Value::Null))
    }

    #[test]
    fn test_registered_operation_wins_over_delegate() {
        let p = proxy();
        p.bind(Arc::new(Delegate));
        p.register_operation("greet", |_: &CallArgs| Ok(json!("registered")))
            .unwrap();

        assert_eq!(p.call("greet", CallArgs::new()), Ok(json!("registered")));
        assert_eq!(p.call("whoami", CallArgs::new()), Ok(json!("delegate:whoami")));
    }

    #[test]
    fn test_unknown_name_is_lookup_error() {
        let p = proxy();
        assert_eq!(
            p.call("missing", CallArgs::new()),
            Err(ProxyError::OperationNotFound {
                name: "missing".into()
            })
        );
        p.bind(Arc::new(Delegate));
        assert!(!p.has_operation("missing"));
        assert!(p.has_operation("greet"));
    }

    #[test]
    fn test_builtin_names_are_reserved() {
        let p = proxy();
        for name in BUILTIN_OPERATIONS {
            let err = p.register_operation(name, |_: &CallArgs| Ok(Value::Null));
            assert!(matches!(err, Err(ProxyError::Reserved { .. })));
        }
    }

    #[test]
    fn test_operation_names_cover_every_tier() {
        let p = proxy();
        p.bind(Arc::new(Delegate));
        p.register_operation("greet", |_: &CallArgs| Ok(Value::Null))
            .unwrap()
            .register_operation("add", |_: &CallArgs| Ok(Value::Null))
            .unwrap();
        assert_eq!(
            p.operation_names(),
            vec!["add", "background", "greet", "reload", "stop", "whoami"]
        );
    }

    #[test]
    fn test_operation_failure_names_the_operation() {
        let p = proxy();
        p.register_operation("fail", |_: &CallArgs| Err(TaskError::failed("nope")))
            .unwrap();
        assert_eq!(
            p.call("fail", CallArgs::new()),
            Err(ProxyError::Operation {
                name: "fail".into(),
                source: TaskError::failed("nope"),
            })
        );
    }

    #[test]
    fn test_stop_builtin_reaches_termination_hook() {
        let hooks = Arc::new(Hooks::default());
        let p = ServiceProxy::new("svc", controller(hooks.clone()), |_| Ok(Value::Null));

        let msg = p.call("stop", CallArgs::new().arg(0)).unwrap();
        assert!(msg.as_str().unwrap().starts_with("stopping process"));
        assert_eq!(hooks.terminated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_delay_is_invalid_argument() {
        let p = proxy();
        let err = p.call("stop", CallArgs::new().named("delay", -1)).unwrap_err();
        assert_eq!(err.as_label(), "proxy_invalid_argument");
        let err = p.call("reload", CallArgs::new().arg(3)).unwrap_err();
        assert_eq!(err.as_label(), "proxy_invalid_argument");
    }

    #[test]
    fn test_out_of_range_delay_is_invalid_argument() {
        let p = proxy();
        for name in ["stop", "reload"] {
            let err = p.call(name, CallArgs::new().named("delay", 1e20)).unwrap_err();
            assert_eq!(err.as_label(), "proxy_invalid_argument");
        }
        let err = p
            .call("background", CallArgs::new().arg("stop").arg(1e20))
            .unwrap_err();
        assert_eq!(err.as_label(), "proxy_invalid_argument");
    }

    #[test]
    fn test_background_daemon_flag_selects_thread_mode() {
        let p = proxy();
        let runner = Arc::clone(p.controller().runner());
        p.register_operation("noop", |_: &CallArgs| Ok(Value::Null))
            .unwrap();

        p.call(
            "background",
            CallArgs::new().arg("noop").arg(0.05).named("daemon", true),
        )
        .unwrap();
        assert_eq!(runner.pending(), 0);

        p.call("background", CallArgs::new().arg("noop").arg(0.05))
            .unwrap();
        assert_eq!(runner.pending(), 1);
        assert!(runner.join_pending().is_empty());

        let err = p
            .call("background", CallArgs::new().arg("noop").named("daemon", "yes"))
            .unwrap_err();
        assert_eq!(err.as_label(), "proxy_invalid_argument");
    }

    #[test]
    fn test_background_runs_another_operation() {
        let p = proxy();
        p.register_operation("add", |args: &CallArgs| {
            let sum: i64 = args.positional.iter().filter_map(Value::as_i64).sum();
            Ok(json!(sum))
        })
        .unwrap();

        let msg = p
            .call(
                "background",
                CallArgs::new().arg("add").arg(0).named("args", json!([1, 2])),
            )
            .unwrap();
        let msg = msg.as_str().unwrap();
        assert!(msg.starts_with("running add in 0ns"));
        assert!(msg.ends_with("(succeeded)"));

        assert_eq!(
            p.call("background", CallArgs::new().arg("nope")),
            Err(ProxyError::OperationNotFound {
                name: "nope".into()
            })
        );
    }

    #[test]
    fn test_ready_runs_main_exactly_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let caller = std::thread::current().id();
        let p = ServiceProxy::new("svc", controller(Arc::default()), move |proxy| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(proxy.name(), "svc");
            Ok(json!(std::thread::current().id() != caller))
        });
        assert!(p.main_task().is_none());

        p.on_ready(&json!(8080));
        p.on_ready(&json!(8080));

        let handle = p.main_task().unwrap();
        assert_eq!(handle.wait_blocking(), Ok(json!(true)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_main_task_is_visible_to_main_work() {
        let p = ServiceProxy::new("svc", controller(Arc::default()), |proxy| {
            Ok(json!(proxy.main_task().is_some()))
        });
        p.on_ready(&json!(0));
        assert_eq!(p.main_task().unwrap().wait_blocking(), Ok(json!(true)));
    }

    #[test]
    fn test_main_failure_is_recorded_only() {
        let p = ServiceProxy::new("svc", controller(Arc::default()), |_| {
            Err(TaskError::failed("main broke"))
        });
        p.on_ready(&json!(0));
        assert_eq!(
            p.main_task().unwrap().wait_blocking(),
            Err(TaskError::failed("main broke"))
        );
        assert!(p.has_operation("stop"));
    }

    #[test]
    fn test_start_propagates_failure_before_readiness() {
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

        let p = proxy();
        let err = p.start(&Refuse, &RpcConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "address in use");
        assert!(p.main_task().is_none());
    }
}
