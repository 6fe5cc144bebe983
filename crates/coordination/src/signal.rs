//! Cooperative cancellation.
//!
//! A service run owns a [`StopHandle`]; its loops hold [`StopSignal`]s and check them at
//! the top of every cycle or race them against their current await point. Nothing is
//! ever aborted from the outside.

use crate::bus::{BusError, MemoryBus};
use common::messages::{Channel, UniverseChange};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why a service run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// The asset universe moved; derived state is stale and the service must restart.
    UniverseChanged,
    /// The process is going down.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<Option<ServiceExit>>>,
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<Option<ServiceExit>>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(None);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

impl StopHandle {
    /// Requests a stop. The first reason wins; later calls are ignored.
    pub fn stop(&self, reason: ServiceExit) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Resolves once every signal of this handle has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl StopSignal {
    /// The stop reason, if a stop was requested.
    pub fn exit(&self) -> Option<ServiceExit> {
        *self.rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.exit().is_some()
    }

    /// Resolves with the reason once a stop is requested. Never resolves if the handle
    /// is dropped without stopping.
    pub async fn stopped(&self) -> ServiceExit {
        let mut rx = self.rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }

    /// A fresh handle/signal pair that also stops when this signal does.
    pub fn child(&self) -> (StopHandle, StopSignal) {
        let (handle, signal) = stop_channel();
        let parent = self.clone();
        let forward = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                reason = parent.stopped() => forward.stop(reason),
                _ = forward.closed() => {}
            }
        });
        (handle, signal)
    }
}

/// Background task that stops a service run on the first universe-change message.
///
/// The subscription is taken in [`UniverseListener::spawn`], before the caller starts its
/// primary loop, so a change published right after startup is not missed. Dropping the
/// listener tears the task down.
pub struct UniverseListener {
    task: JoinHandle<()>,
}

impl UniverseListener {
    pub fn spawn(bus: &MemoryBus, stop: StopHandle) -> Self {
        let mut subscription = bus.subscribe(&[Channel::UniverseChange]);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.closed() => return,
                    message = subscription.recv() => match message {
                        Ok(message) => {
                            match message.decode::<UniverseChange>() {
                                Ok(envelope) => info!(
                                    old = ?envelope.data.old,
                                    new = ?envelope.data.new,
                                    "Universe change received, stopping"
                                ),
                                Err(e) => warn!(error = %e, "Undecodable universe change, stopping anyway"),
                            }
                            stop.stop(ServiceExit::UniverseChanged);
                            return;
                        }
                        Err(BusError::Closed) => return,
                        Err(e) => warn!(error = %e, "Universe listener receive error"),
                    }
                }
            }
        });
        Self { task }
    }
}

impl Drop for UniverseListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
