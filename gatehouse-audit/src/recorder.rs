//! Non-blocking audit recording
//!
//! Events flow through a bounded channel drained by a single writer task.
//! When the channel is saturated the producer waits a bounded interval, then
//! falls back to a synchronous store write so critical events stay durable.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use gatehouse_storage::{AuditRecord, Store};

use crate::events::AuditEvent;

/// Bounded wait before falling back to a synchronous write
const SATURATION_WAIT: Duration = Duration::from_millis(100);

/// Cloneable handle used by every component that records audit events
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditRecord>,
    store: Store,
}

impl AuditRecorder {
    /// Create the recorder and spawn its writer task
    pub fn spawn(store: Store, channel_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let writer = tokio::spawn(writer_loop(store.clone(), rx));
        (Self { tx, store }, writer)
    }

    /// Record an event. Never fails the caller; persistence failures are
    /// logged and swallowed.
    pub async fn record(&self, event: AuditEvent) {
        let critical = event.kind.is_critical();
        let record = event.into_record();

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                warn!(kind = %record.kind, "audit channel saturated");
                match tokio::time::timeout(SATURATION_WAIT, self.tx.send(record.clone())).await {
                    Ok(Ok(())) => {}
                    _ => {
                        // Bounded wait expired (or writer gone): write through
                        if let Err(e) = self.store.audit().append(&record).await {
                            if critical {
                                error!(kind = %record.kind, error = %e, "lost critical audit event");
                            } else {
                                warn!(kind = %record.kind, error = %e, "lost audit event");
                            }
                        }
                    }
                }
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                // Writer already shut down; last-ditch synchronous write
                if let Err(e) = self.store.audit().append(&record).await {
                    error!(kind = %record.kind, error = %e, "audit write after shutdown failed");
                }
            }
        }
    }

    /// Record an event and wait until it is persisted. Used on paths where
    /// durability must precede the HTTP response (admin mutations).
    pub async fn record_durable(&self, event: AuditEvent) {
        let record = event.into_record();
        if let Err(e) = self.store.audit().append(&record).await {
            error!(kind = %record.kind, error = %e, "durable audit write failed");
        }
    }
}

async fn writer_loop(store: Store, mut rx: mpsc::Receiver<AuditRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = store.audit().append(&record).await {
            error!(kind = %record.kind, error = %e, "audit append failed");
        }
    }
    debug!("audit writer stopped");
}

/// Periodically delete events past the retention window
pub fn spawn_retention(
    store: Store,
    retention_days: u32,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
            match store.audit().cleanup(cutoff).await {
                Ok(0) => {}
                Ok(n) => debug!(removed = n, "audit retention sweep"),
                Err(e) => warn!(error = %e, "audit retention sweep failed"),
            }
        }
    })
}
