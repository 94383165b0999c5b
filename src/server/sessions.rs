// SPDX-License-Identifier: GPL-3.0-only

//! Periodic sweep of expired viewer sessions

use crate::backends::{MediaEngine, MediaServer};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Handle to a running maintenance task
pub(crate) struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Maintenance {
    /// Spawn the sweep on the current tokio runtime
    pub fn spawn<E, S>(server: Arc<S>, period: Duration) -> Self
    where
        E: MediaEngine,
        S: MediaServer<E> + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run::<E, S>(server, period, shutdown_rx, PhantomData));
        Self { shutdown_tx, task }
    }

    /// Signal the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            debug!(error = %e, "Session maintenance task ended abnormally");
        }
    }

    /// Cancel without waiting
    pub fn abort(self) {
        self.task.abort();
    }
}

async fn run<E, S>(
    server: Arc<S>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    _engine: PhantomData<E>,
) where
    E: MediaEngine,
    S: MediaServer<E>,
{
    info!(?period, "Session maintenance started");
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let removed = server.cleanup_sessions();
                if removed > 0 {
                    debug!(removed, "Expired sessions removed");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("Session maintenance stopped");
}
