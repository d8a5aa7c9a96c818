//! Periodic pruning of expired counter and lockout entries.

use crate::application::dispatcher::ShutdownError;
use crate::application::ports::{Clock, CounterStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Spawn a task that calls [`CounterStore::sweep`] every `interval`.
///
/// Lockout history idle for longer than `lockout_retention` is removed
/// unless the identity is still locked.
///
/// # Panics
/// Panics if called outside a tokio runtime or if `every` is zero.
pub fn spawn_sweeper(
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
    lockout_retention: Duration,
) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.sweep(clock.now(), lockout_retention);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = store.len(), "Swept expired entries");
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    SweeperHandle {
        shutdown_tx: Some(shutdown_tx),
        join_handle,
    }
}

/// Handle for stopping the sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        (&mut self.join_handle).await?;
        Ok(())
    }

    /// Whether the task has exited, either stopped or panicked.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}
