//! Debounced background writer for the remote cart mirror.
//!
//! Each mutation pushes the whole snapshot into the task. A push replaces
//! whatever write is pending and restarts the quiet window; only when the
//! window passes without a newer push is the snapshot written. Closing the
//! channel flushes the pending write before the task exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::UserIdentity;
use super::store::{CartStore, CartStoreError, CartSyncPayload};
use crate::models::CartLine;

/// Error and loading flags shared between the manager and its sync task.
#[derive(Debug, Default)]
pub struct SyncStatus {
    error: Mutex<Option<String>>,
    loading: AtomicBool,
}

impl SyncStatus {
    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_error(&self, error: Option<String>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Release);
    }
}

/// A snapshot waiting for the debounce window to close.
pub struct PendingWrite {
    pub identity: UserIdentity,
    pub lines: Vec<CartLine>,
}

pub enum SyncCommand {
    /// Replace the pending write and restart the window.
    Push(PendingWrite),
    /// Drop the pending write without sending it.
    Discard,
}

/// Sending half of the sync task.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// Spawn the sync task on the current runtime.
    pub fn spawn(store: Arc<dyn CartStore>, status: Arc<SyncStatus>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, store, status, debounce));
        Self { tx }
    }

    pub fn push(&self, write: PendingWrite) {
        if self.tx.send(SyncCommand::Push(write)).is_err() {
            warn!("Cart sync task has stopped; write dropped");
        }
    }

    pub fn discard(&self) {
        if self.tx.send(SyncCommand::Discard).is_err() {
            warn!("Cart sync task has stopped; discard dropped");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<SyncCommand>,
    store: Arc<dyn CartStore>,
    status: Arc<SyncStatus>,
    debounce: Duration,
) {
    let mut pending: Option<PendingWrite> = None;

    loop {
        let command = if pending.is_some() {
            tokio::select! {
                command = rx.recv() => command,
                () = tokio::time::sleep(debounce) => {
                    if let Some(write) = pending.take() {
                        flush(store.as_ref(), &status, write).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(SyncCommand::Push(write)) => pending = Some(write),
            Some(SyncCommand::Discard) => {
                if pending.take().is_some() {
                    debug!("Pending cart write discarded");
                }
            }
            None => {
                if let Some(write) = pending.take() {
                    flush(store.as_ref(), &status, write).await;
                }
                break;
            }
        }
    }
}

async fn flush(store: &dyn CartStore, status: &SyncStatus, write: PendingWrite) {
    let user_id = write.identity.user_id.clone();
    match send(store, write).await {
        Ok(()) => status.set_error(None),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Cart sync failed");
            status.set_error(Some(e.sync_message()));
        }
    }
}

async fn send(store: &dyn CartStore, write: PendingWrite) -> Result<(), CartStoreError> {
    let token = write
        .identity
        .tokens
        .id_token()
        .await
        .map_err(|e| CartStoreError::Token(e.to_string()))?;

    let payload = CartSyncPayload {
        cart: write.lines,
        user_id: write.identity.user_id,
        email: write.identity.email,
        timestamp: Utc::now(),
    };

    store.push(&token, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_task_tolerates_commands() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SyncHandle { tx };

        handle.discard();
        assert!(handle.tx.is_closed());
    }
}
