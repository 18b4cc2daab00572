//! # Background Scheduler
//!
//! Cancellable periodic tasks owned by the coordinator: the reconciliation
//! poller and the proactive token refresher.
//!
//! ## Task Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PeriodicTask Loop                                │
//! │                                                                         │
//! │   ┌──────────────┐   period elapsed   ┌──────────────┐                 │
//! │   │    sleep     │ ─────────────────► │     tick     │ ──┐             │
//! │   └──────┬───────┘                    └──────┬───────┘   │             │
//! │          │ shutdown                          │ shutdown  │ done        │
//! │          ▼                                   ▼           │             │
//! │   ┌──────────────────────────────────────────────┐       │             │
//! │   │   exit (tick future dropped, nothing raised) │ ◄─────┘ (loop)      │
//! │   └──────────────────────────────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first tick happens one full period after spawning.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle for stopping a periodic task.
///
/// Dropping the handle without calling [`PeriodicTaskHandle::shutdown`]
/// also stops the task at its next await point.
#[derive(Debug)]
pub struct PeriodicTaskHandle {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl PeriodicTaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True once the task loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            debug!(task = self.name, error = %e, "Periodic task ended abnormally");
        }
    }
}

/// Spawns `tick` every `period` until shut down.
///
/// Shutdown is observed while sleeping and while a tick is running; an
/// interrupted tick is dropped.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> PeriodicTaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let join = tokio::spawn(async move {
        info!(task = name, period_secs = period.as_secs(), "Periodic task starting");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(period) => {}
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tick() => {}
            }
        }

        info!(task = name, "Periodic task stopped");
    });

    PeriodicTaskHandle {
        name,
        shutdown_tx,
        join,
    }
}
