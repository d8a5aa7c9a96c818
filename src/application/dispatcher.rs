//! Background delivery of audit events.
//!
//! [`ChannelAuditSink`] hands events to a bounded channel and returns at once;
//! a tokio task forwards them to the real sink. A full channel drops the
//! event instead of blocking the request.

use crate::application::ports::AuditSink;
use crate::domain::audit::AuditEvent;
use std::panic;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default number of events buffered between callers and the dispatcher task.
pub const DEFAULT_AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// Error returned when a background task does not stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// The task panicked
    TaskPanicked,
    /// The task was cancelled before it finished
    TaskCancelled,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "background task panicked"),
            ShutdownError::TaskCancelled => write!(f, "background task was cancelled"),
        }
    }
}

impl std::error::Error for ShutdownError {}

impl From<tokio::task::JoinError> for ShutdownError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ShutdownError::TaskPanicked
        } else {
            ShutdownError::TaskCancelled
        }
    }
}

/// Non-blocking [`AuditSink`] backed by a bounded channel.
///
/// # Examples
///
/// ```
/// use portal_guard::application::dispatcher::ChannelAuditSink;
/// use portal_guard::infrastructure::audit_sink::TracingAuditSink;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (sink, handle) = ChannelAuditSink::spawn(Arc::new(TracingAuditSink), 256);
/// // hand `sink` to AuditLogger::with_external_sink(...)
/// # drop(sink);
/// handle.shutdown().await.expect("dispatcher stopped cleanly");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Spawn the dispatcher task on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn spawn(downstream: Arc<dyn AuditSink>, capacity: usize) -> (Self, AuditDispatcherHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(run_dispatcher(downstream, rx, shutdown_rx));

        (
            Self { tx },
            AuditDispatcherHandle {
                shutdown_tx: Some(shutdown_tx),
                join_handle,
            },
        )
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: &AuditEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!(
                    event_type = dropped.event_type().as_str(),
                    "Audit channel full, event dropped"
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::debug!(
                    event_type = dropped.event_type().as_str(),
                    "Audit dispatcher stopped, event dropped"
                );
            }
        }
    }
}

async fn run_dispatcher(
    downstream: Arc<dyn AuditSink>,
    mut rx: mpsc::Receiver<AuditEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => forward(downstream.as_ref(), &event),
                None => break,
            },
            // Also fires when the handle is dropped
            _ = &mut shutdown_rx => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    forward(downstream.as_ref(), &event);
                }
                break;
            }
        }
    }
    tracing::debug!("Audit dispatcher stopped");
}

fn forward(sink: &dyn AuditSink, event: &AuditEvent) {
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| sink.record(event)));
    if result.is_err() {
        tracing::warn!(
            event_type = event.event_type().as_str(),
            "Audit sink failed, event dropped"
        );
    }
}

/// Handle for stopping the dispatcher task.
///
/// Dropping the handle also stops the task after pending events are drained.
#[derive(Debug)]
pub struct AuditDispatcherHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl AuditDispatcherHandle {
    /// Stop accepting events, deliver everything already queued and wait
    /// for the task to finish.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The task may already be gone; the join below reports how it ended
            let _ = tx.send(());
        }
        (&mut self.join_handle).await?;
        Ok(())
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}
