//! Best-effort audit trail.
//!
//! Handlers enqueue events with [`AuditHandle::record`], which never waits.
//! A background worker drains the queue into the [`AuditSink`]. A full queue
//! or a failing sink is logged and counted, and never changes the outcome
//! of the request that produced the event.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::directory::{AuditEvent, AuditSink};
use crate::observability::metrics;

/// Cheap, cloneable sender side of the audit queue.
#[derive(Clone, Debug)]
pub struct AuditHandle {
    tx: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditHandle {
    /// A handle that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueue `event` without waiting. Returns false if it was dropped.
    pub fn record(&self, event: AuditEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(action = %event.action, "Audit queue full; dropping event");
                metrics::record_audit_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Audit worker stopped; dropping event");
                metrics::record_audit_dropped();
                false
            }
        }
    }
}

/// Start the audit worker. It drains pending events before exiting on shutdown.
pub fn spawn_audit_worker(
    sink: Arc<dyn AuditSink>,
    capacity: usize,
    mut shutdown: broadcast::Receiver<()>,
) -> (AuditHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity);

    let worker = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => deliver(sink.as_ref(), event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        deliver(sink.as_ref(), event).await;
                    }
                    tracing::info!("Audit worker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    });

    (AuditHandle { tx: Some(tx) }, worker)
}

async fn deliver(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action.clone();
    if let Err(e) = sink.record(event).await {
        tracing::warn!(action = %action, error = %e, "Failed to record audit event");
        metrics::record_audit_dropped();
    }
}
