//! # launchvisor
//!
//! **Launchvisor** is a small process-control kernel.
//!
//! It takes an [`InvocationDescriptor`] and either runs its target synchronously
//! in the current process (**LocalRun**) or hosts it behind an RPC [`Transport`]
//! as a long-running service (**RpcRun**). Hosted targets and remote callers get
//! self-management primitives: deferred background tasks, delayed stop and
//! in-place (or respawned) reload.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                     ┌──────────────────────────┐
//!                     │   InvocationDescriptor   │
//!                     │ target, args, kwargs,    │
//!                     │ extra, env, rpc, workdir │
//!                     └────────────┬─────────────┘
//!                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ExecutionEngine                                                  │
//! │  - Resolve (callable lookup)      - RunScript (path-like targets) │
//! │  - Transport (optional)           - Bus + SubscriberSet           │
//! └──────┬───────────────────────────────────────────────┬────────────┘
//!        │ rpc empty                                     │ rpc set
//!        ▼                                               ▼
//!   LocalRun: call target                     ServiceProxy::start(transport)
//!   on the caller's thread                           │ (blocks)
//!        │                                           ▼
//!        ▼                                    Transport::serve ──► on_ready(ident)
//!   Outcome::Completed(value)                        │                  │
//!                                        remote calls by name     main task (daemon thread)
//!                                                    │
//!                        ┌───────────────────────────┼───────────────────────┐
//!                        ▼                           ▼                       ▼
//!                  built-ins                  registered ops          bound delegate
//!             stop / reload / background      (register_operation)      (Expose)
//!                        │
//!                        ▼
//!               ProcessController ──► BackgroundRunner ──► OS threads
//! ```
//!
//! ### Events
//! ```text
//! Engine / Proxy / Runner / Controller ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                          ┌─────────┼─────────┐
//!                                                                          ▼         ▼         ▼
//!                                                                      LogWriter   sub 2     sub N
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Engine**        | Chooses LocalRun or RpcRun and dispatches.                    | [`ExecutionEngine`], [`Outcome`]            |
//! | **Service proxy** | Two-tier name lookup and readiness-driven main task.          | [`ServiceProxy`], [`Expose`], [`CallArgs`]  |
//! | **Transports**    | Service loop contract and an in-process implementation.       | [`Transport`], [`LocalTransport`]           |
//! | **Background**    | Deferred work on OS threads with future-like handles.         | [`BackgroundRunner`], [`TaskHandle`]        |
//! | **Process**       | Delayed stop and exec-or-respawn reload.                      | [`ProcessController`], [`ProcessOps`]       |
//! | **Targets**       | Callable targets, resolution and script execution.            | [`Target`], [`TargetRegistry`], [`RunScript`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, audit).         | [`Subscribe`]                               |
//! | **Errors**        | Typed errors for runs, tasks, proxy calls and transports.     | [`RunError`], [`TaskError`], [`ProxyError`] |
//! | **Configuration** | Centralize engine settings.                                   | [`Config`], [`RpcConfig`]                   |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex, mpsc};
//! use std::thread;
//! use launchvisor::{
//!     CallArgs, CallContext, Config, ExecutionEngine, InvocationDescriptor, LocalTransport,
//!     Outcome, TargetFn, TargetRegistry, TaskError,
//! };
//! use serde_json::json;
//!
//! let (up_tx, up_rx) = mpsc::channel();
//! let up_tx = Mutex::new(up_tx);
//!
//! let registry = Arc::new(TargetRegistry::new());
//! registry.register(TargetFn::arc("app:main", move |ctx: &CallContext| {
//!     // The live proxy is injected in RPC mode.
//!     if let Some(rpc) = ctx.rpc() {
//!         rpc.register_operation("hello", |_: &CallArgs| Ok(json!("hi"))).ok();
//!     }
//!     up_tx.lock().unwrap().send(()).ok();
//!     Ok::<_, TaskError>(json!(null))
//! }));
//!
//! let (transport, client) = LocalTransport::new(16);
//! let engine = ExecutionEngine::builder(Config::default())
//!     .with_resolver(registry)
//!     .with_transport(Arc::new(transport.without_signals()))
//!     .build()
//!     .unwrap();
//!
//! let desc = InvocationDescriptor::builder("app:main")
//!     .rpc("mode", "local")
//!     .rpc("ident", "demo")
//!     .build();
//!
//! let server = thread::spawn(move || engine.run(&desc));
//!
//! up_rx.recv().unwrap();
//! assert_eq!(client.call_blocking("hello", CallArgs::new()).unwrap(), json!("hi"));
//!
//! // Dropping the last client ends the service loop.
//! drop(client);
//! assert_eq!(server.join().unwrap().unwrap(), Outcome::Served);
//! ```

mod config;
mod engine;
mod error;
mod events;
mod invocation;
mod process;
mod proxy;
mod subscribers;
mod targets;
mod tasks;
mod transport;

// ---- Public re-exports ----

pub use config::Config;
pub use engine::{EngineBuilder, ExecutionEngine, Outcome};
pub use error::{ProxyError, RunError, TaskError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use invocation::{InvocationBuilder, InvocationDescriptor, guess, guess_map};
pub use process::{OsProcess, ProcessController, ProcessOps, wait_for_shutdown_signal};
pub use proxy::{BUILTIN_OPERATIONS, CallArgs, Expose, Operation, ServiceProxy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use targets::{
    CallContext, CommandScript, RPC_BINDING, Resolve, RunScript, Target, TargetFn, TargetRef,
    TargetRegistry,
};
pub use tasks::{BackgroundRunner, TaskHandle, TaskState, ThreadMode};
pub use transport::{LocalClient, LocalTransport, ReadyCallback, RpcConfig, Transport};

// Built-in logger subscriber.
// Disable with: `--no-default-features`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
