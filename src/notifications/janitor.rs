//! Cleanup of transient ping messages
//!
//! Every ping message gets a deletion task owned by the janitor. Shutdown
//! aborts whatever is still pending, so no cleanup outlives the process
//! lifetime of the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

use super::DeliveryTarget;
use crate::metrics;
use crate::models::MessageRef;

/// Owner of pending ping deletions
pub struct PingJanitor {
    target: Arc<dyn DeliveryTarget>,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl PingJanitor {
    pub fn new(target: Arc<dyn DeliveryTarget>) -> Self {
        Self {
            target,
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Schedule deletion of a message after `delay`
    ///
    /// Returns `false` once the janitor has been shut down.
    pub fn schedule(&self, channel_id: &str, message: MessageRef, delay: Duration) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(channel_id = channel_id, message_id = %message, "Janitor closed, cleanup dropped");
            return false;
        }

        let target = Arc::clone(&self.target);
        let channel_id = channel_id.to_string();

        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            match target.delete_message(&channel_id, &message).await {
                Ok(()) => {
                    tracing::debug!(channel_id = %channel_id, message_id = %message, "Ping message deleted");
                }
                Err(e) => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        message_id = %message,
                        error = %e,
                        "Failed to delete ping message"
                    );
                }
            }
        });

        metrics::set_pending_pings(tasks.len());
        true
    }

    /// Number of cleanups not yet finished
    pub fn pending(&self) -> usize {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}

        metrics::set_pending_pings(tasks.len());
        tasks.len()
    }

    /// Wait for every scheduled cleanup to run
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        while tasks.join_next().await.is_some() {}
        metrics::set_pending_pings(0);
    }

    /// Cancel all pending cleanups and refuse new ones
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut tasks = std::mem::take(&mut *self.lock());
        let cancelled = tasks.len();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        metrics::set_pending_pings(0);
        tracing::info!(cancelled = cancelled, "Ping janitor stopped");
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
