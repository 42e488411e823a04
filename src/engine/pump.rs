//! Event runtime feeding subscribers.
//!
//! Built only when at least one subscriber is configured. Publishers stay on plain
//! threads; the pump owns the tokio runtime that drives the [`SubscriberSet`].

use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::RunError;
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};

pub(crate) struct EventPump {
    runtime: Runtime,
    listener: JoinHandle<Arc<SubscriberSet>>,
    stop: CancellationToken,
}

impl EventPump {
    pub(crate) fn start(
        cfg: &Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
        bus: &Bus,
    ) -> Result<Self, RunError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(cfg.event_workers_clamped())
            .thread_name("launchvisor-events")
            .enable_all()
            .build()
            .map_err(|e| RunError::Runtime {
                reason: e.to_string(),
            })?;

        let entered = runtime.enter();
        let set = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let stop = CancellationToken::new();
        let listener = runtime.spawn(listen(bus.subscribe(), set, stop.clone()));
        drop(entered);

        Ok(Self {
            runtime,
            listener,
            stop,
        })
    }

    /// Delivers what is already on the bus, then drains subscriber queues.
    pub(crate) fn shutdown(self) {
        self.stop.cancel();
        let Self {
            runtime, listener, ..
        } = self;
        runtime.block_on(async move {
            let Ok(set) = listener.await else {
                return;
            };
            if let Ok(set) = Arc::try_unwrap(set) {
                set.shutdown().await;
            }
        });
    }
}

/// Forwards bus events to the subscriber set until stopped, then drains what is left.
async fn listen(
    mut rx: broadcast::Receiver<Event>,
    set: Arc<SubscriberSet>,
    stop: CancellationToken,
) -> Arc<SubscriberSet> {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            ev = rx.recv() => match ev {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged behind the bus");
                }
                Err(RecvError::Closed) => return set,
            },
        }
    }
    loop {
        match rx.try_recv() {
            Ok(ev) => set.emit(&ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return set,
        }
    }
}
