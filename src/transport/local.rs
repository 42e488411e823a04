//! # In-process transport.
//!
//! [`LocalTransport`] serves a [`ServiceProxy`] to [`LocalClient`] handles living
//! in the same process. It is the transport used by embedders that drive a
//! service from their own threads, and the reference for real transports.
//!
//! ## Architecture
//! ```text
//! LocalClient::call ──► [mpsc queue] ──► serve loop ──► spawn_blocking(proxy.call)
//!        ▲                                  │                     │
//!        └──────────── oneshot reply ◄──────┼─────────────────────┘
//!                                           │
//!                           ends on: shutdown token | SIGINT/SIGTERM/SIGQUIT
//!                                    | every client dropped
//! ```
//!
//! ## Rules
//! - The loop runs on a current-thread runtime owned by the thread calling `serve`.
//! - At most `concurrency` calls run at once; further requests wait in the queue.
//!   Shutdown is honoured even while every slot is busy; queued requests are
//!   then dropped and their callers see [`TransportError::Closed`].
//! - Signal handlers are installed before readiness is reported, so a `stop`
//!   issued by the main work ends the loop instead of killing the process.
//! - A transport serves once; a second `serve` fails with [`TransportError::Closed`].

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, TransportError};
use crate::process::wait_for_shutdown_signal;
use crate::proxy::{CallArgs, ServiceProxy};
use crate::transport::{ReadyCallback, RpcConfig, Transport};

struct Request {
    op: String,
    args: CallArgs,
    reply: oneshot::Sender<Result<Value, ProxyError>>,
}

/// Transport serving a proxy to in-process clients.
pub struct LocalTransport {
    requests: Mutex<Option<mpsc::Receiver<Request>>>,
    shutdown: CancellationToken,
    signals: bool,
}

/// Cloneable caller side of a [`LocalTransport`].
#[derive(Clone, Debug)]
pub struct LocalClient {
    tx: mpsc::Sender<Request>,
}

impl LocalTransport {
    /// Creates a transport with a request queue of `buffer` slots (min 1) and its first client.
    pub fn new(buffer: usize) -> (Self, LocalClient) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let transport = Self {
            requests: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
            signals: true,
        };
        (transport, LocalClient { tx })
    }

    /// Do not end the loop on termination signals.
    pub fn without_signals(mut self) -> Self {
        self.signals = false;
        self
    }

    /// Token that ends the serve loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn run(
        &self,
        proxy: Arc<ServiceProxy>,
        config: &RpcConfig,
        on_ready: ReadyCallback,
        mut requests: mpsc::Receiver<Request>,
    ) -> Result<(), TransportError> {
        let signal = self.signals.then(|| tokio::spawn(wait_for_shutdown_signal()));
        // Let the listener task install its handlers.
        tokio::task::yield_now().await;
        if signal.as_ref().is_some_and(JoinHandle::is_finished) {
            return signalled(signal).await;
        }

        let limit = Arc::new(Semaphore::new(config.concurrency.max(1)));
        on_ready(&config.ident);

        let stopped = signalled(signal);
        tokio::pin!(stopped);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                res = &mut stopped => return res,
                req = requests.recv() => {
                    let Some(req) = req else {
                        return Ok(());
                    };
                    // A saturated loop must still see shutdown.
                    let permit = tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(()),
                        res = &mut stopped => return res,
                        permit = Arc::clone(&limit).acquire_owned() => {
                            permit.map_err(|_| TransportError::Closed)?
                        }
                    };
                    let proxy = Arc::clone(&proxy);
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        let out = proxy.call(&req.op, req.args);
                        let _ = req.reply.send(out);
                    });
                }
            }
        }
    }
}

impl Transport for LocalTransport {
    fn serve(
        &self,
        proxy: Arc<ServiceProxy>,
        config: &RpcConfig,
        on_ready: ReadyCallback,
    ) -> Result<(), TransportError> {
        let requests = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::Closed)?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let served = rt.block_on(self.run(proxy, config, on_ready, requests));
        rt.shutdown_background();
        served
    }
}

/// Completes when the signal listener does; never without one.
async fn signalled(listener: Option<JoinHandle<io::Result<()>>>) -> Result<(), TransportError> {
    match listener {
        Some(h) => match h.await {
            Ok(res) => res.map_err(TransportError::from),
            Err(e) => Err(TransportError::Failed {
                reason: format!("signal listener failed: {e}"),
            }),
        },
        None => std::future::pending().await,
    }
}

impl LocalClient {
    /// Calls `op` on the served proxy.
    ///
    /// Fails with [`TransportError::Closed`] when the transport is not serving and
    /// with [`TransportError::Remote`] when the proxy rejects the call.
    pub async fn call(&self, op: &str, args: CallArgs) -> Result<Value, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                op: op.to_string(),
                args,
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(rx.await.map_err(|_| TransportError::Closed)??)
    }

    /// Blocking variant of [`LocalClient::call`].
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn call_blocking(&self, op: &str, args: CallArgs) -> Result<Value, TransportError> {
        futures::executor::block_on(self.call(op, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::events::Bus;
    use crate::process::{OsProcess, ProcessController, ProcessOps};
    use crate::tasks::BackgroundRunner;
    use serde_json::json;
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::mpsc as std_mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

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

    fn proxy<F>(main: F) -> Arc<ServiceProxy>
    where
        F: FnOnce(&Arc<ServiceProxy>) -> Result<Value, TaskError> + Send + 'static,
    {
        proxy_with(Arc::new(Inert), main)
    }

    fn proxy_with<F>(ops: Arc<dyn ProcessOps>, main: F) -> Arc<ServiceProxy>
    where
        F: FnOnce(&Arc<ServiceProxy>) -> Result<Value, TaskError> + Send + 'static,
    {
        let bus = Bus::new(64);
        let runner = Arc::new(BackgroundRunner::new(bus.clone()));
        let ctl = Arc::new(ProcessController::new(runner, ops, bus));
        let p = ServiceProxy::new("svc", ctl, main);
        p.register_operation("echo", |args: &CallArgs| {
            Ok(args.positional.first().cloned().unwrap_or(Value::Null))
        })
        .unwrap();
        p
    }

    fn ready_probe() -> (ReadyCallback, std_mpsc::Receiver<Value>) {
        let (tx, rx) = std_mpsc::channel();
        let cb: ReadyCallback = Box::new(move |ident: &Value| {
            let _ = tx.send(ident.clone());
        });
        (cb, rx)
    }

    #[test]
    fn test_calls_are_dispatched_until_clients_go_away() {
        let (transport, client) = LocalTransport::new(8);
        let transport = transport.without_signals();
        let p = proxy(|_| Ok(Value::Null));
        let (on_ready, ready) = ready_probe();

        let server = thread::spawn(move || {
            let cfg = RpcConfig {
                ident: json!("local"),
                ..RpcConfig::default()
            };
            transport.serve(p, &cfg, on_ready)
        });
        assert_eq!(ready.recv().unwrap(), json!("local"));

        assert_eq!(
            client.call_blocking("echo", CallArgs::new().arg("hi")).unwrap(),
            json!("hi")
        );
        let err = client.call_blocking("missing", CallArgs::new()).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Remote(ProxyError::OperationNotFound { .. })
        ));

        drop(client);
        assert!(server.join().unwrap().is_ok());
    }

    #[test]
    fn test_shutdown_token_ends_loop() {
        let (transport, client) = LocalTransport::new(8);
        let transport = Arc::new(transport.without_signals());
        let token = transport.shutdown_token();
        let (on_ready, ready) = ready_probe();

        let t = Arc::clone(&transport);
        let server =
            thread::spawn(move || t.serve(proxy(|_| Ok(Value::Null)), &RpcConfig::default(), on_ready));
        ready.recv().unwrap();

        token.cancel();
        assert!(server.join().unwrap().is_ok());
        assert!(matches!(
            client.call_blocking("echo", CallArgs::new()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_serves_only_once() {
        let (transport, client) = LocalTransport::new(1);
        let transport = transport.without_signals();
        drop(client);
        let (on_ready, _ready) = ready_probe();
        transport
            .serve(proxy(|_| Ok(Value::Null)), &RpcConfig::default(), on_ready)
            .unwrap();

        let (on_ready, ready) = ready_probe();
        let err = transport
            .serve(proxy(|_| Ok(Value::Null)), &RpcConfig::default(), on_ready)
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(ready.try_recv().is_err());
    }

    #[test]
    fn test_proxy_start_runs_main_after_ready() {
        let (transport, client) = LocalTransport::new(8);
        let transport = transport.without_signals();
        let (started_tx, started_rx) = std_mpsc::channel();
        let p = proxy(move |_| {
            let _ = started_tx.send(thread::current().name().map(str::to_string));
            Ok(json!("main done"))
        });

        let server_proxy = Arc::clone(&p);
        let server = thread::spawn(move || server_proxy.start(&transport, &RpcConfig::default()));

        let thread_name = started_rx.recv().unwrap().unwrap_or_default();
        assert!(thread_name.starts_with("bg-svc#"));
        assert_eq!(client.call_blocking("echo", CallArgs::new().arg(1)).unwrap(), json!(1));

        drop(client);
        assert!(server.join().unwrap().is_ok());
        assert_eq!(p.main_task().unwrap().wait_blocking(), Ok(json!("main done")));
    }

    #[test]
    fn test_shutdown_is_seen_while_every_slot_is_busy() {
        let (transport, client) = LocalTransport::new(8);
        let transport = transport.without_signals();
        let token = transport.shutdown_token();

        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let entered_tx = Mutex::new(entered_tx);
        let p = proxy(|_| Ok(Value::Null));
        p.register_operation("block", move |_: &CallArgs| {
            let _ = entered_tx.lock().unwrap().send(());
            let _ = release_rx.lock().unwrap().recv();
            Ok(Value::Null)
        })
        .unwrap();

        let (on_ready, ready) = ready_probe();
        let (done_tx, done_rx) = std_mpsc::channel();
        thread::spawn(move || {
            let cfg = RpcConfig {
                concurrency: 1,
                ..RpcConfig::default()
            };
            let _ = done_tx.send(transport.serve(p, &cfg, on_ready));
        });
        ready.recv().unwrap();

        let callers: Vec<_> = (0..2)
            .map(|_| {
                let c = client.clone();
                thread::spawn(move || c.call_blocking("block", CallArgs::new()))
            })
            .collect();
        entered_rx.recv().unwrap();
        // Give the loop time to pick up the second request and wait for a slot.
        thread::sleep(Duration::from_millis(50));

        let cancelled_at = Instant::now();
        token.cancel();
        let served = done_rx.recv_timeout(Duration::from_secs(1));
        assert!(matches!(served, Ok(Ok(()))));
        assert!(cancelled_at.elapsed() < Duration::from_secs(1));

        drop(release_tx);
        for c in callers {
            let _ = c.join();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_from_main_work_ends_the_loop() {
        let (transport, client) = LocalTransport::new(8);
        let p = proxy_with(Arc::new(OsProcess), |proxy| {
            Ok(Value::String(proxy.stop(Some(Duration::ZERO))))
        });

        let server_proxy = Arc::clone(&p);
        let (done_tx, done_rx) = std_mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(server_proxy.start(&transport, &RpcConfig::default()));
        });

        let served = done_rx.recv_timeout(Duration::from_secs(5));
        assert!(matches!(served, Ok(Ok(()))));
        let msg = p.main_task().unwrap().wait_blocking().unwrap();
        assert!(msg.as_str().unwrap().starts_with("stopping process"));
        drop(client);
    }
}
