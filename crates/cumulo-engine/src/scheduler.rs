//! Operation scheduler
//!
//! `enqueue` writes the durable operation row and submits the background
//! job, enforcing single-flight per target database. `wait_for` gives
//! callers a synchronous-looking result with a bounded timeout: waiters
//! subscribe to a completion notification instead of polling the store, and
//! a timeout hands back a still-running hint without cancelling anything,
//! since partially-applied cloud side effects cannot be safely unwound by
//! aborting the call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use cumulo_core::{DatabaseId, OperationId};

use crate::operation::{OperationError, OperationRecord, OperationStore, OperationType};
use crate::queue::{Job, JobQueue, QueueError};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default bound for `wait_for`, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

fn default_wait_timeout_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

impl SchedulerConfig {
    /// The default wait bound as a duration.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// What a bounded wait observed.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The operation reached a terminal state.
    Completed(OperationRecord),
    /// The wait timed out; the operation keeps running under this id.
    StillRunning { operation_id: OperationId },
}

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Operation store error.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Queue submission error.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Completion notifications keyed by operation.
#[derive(Default)]
pub struct WaitRegistry {
    notifies: Mutex<HashMap<OperationId, Arc<Notify>>>,
}

impl WaitRegistry {
    /// The notification handle for an operation, created on first use.
    pub async fn subscribe(&self, operation_id: OperationId) -> Arc<Notify> {
        let mut notifies = self.notifies.lock().await;
        notifies.entry(operation_id).or_default().clone()
    }

    /// Wake every waiter on an operation and drop the handle.
    pub async fn notify(&self, operation_id: OperationId) {
        let handle = {
            let mut notifies = self.notifies.lock().await;
            notifies.remove(&operation_id)
        };
        if let Some(notify) = handle {
            notify.notify_waiters();
        }
    }
}

/// Accepts operation requests and exposes the bounded wait.
pub struct OperationScheduler {
    store: Arc<dyn OperationStore>,
    queue: Arc<dyn JobQueue>,
    waits: Arc<WaitRegistry>,
    config: SchedulerConfig,
}

impl OperationScheduler {
    /// Create a scheduler over the given store and queue.
    pub fn new(
        store: Arc<dyn OperationStore>,
        queue: Arc<dyn JobQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            waits: Arc::new(WaitRegistry::default()),
            config,
        }
    }

    /// The completion registry workers notify through.
    #[must_use]
    pub fn waits(&self) -> Arc<WaitRegistry> {
        self.waits.clone()
    }

    /// The backing operation store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn OperationStore> {
        self.store.clone()
    }

    /// Insert a pending operation row and submit its background job.
    ///
    /// Rejected while another operation for the same database is
    /// non-terminal (single-flight).
    pub async fn enqueue(
        &self,
        database_id: DatabaseId,
        op_type: OperationType,
        params: Value,
    ) -> Result<OperationRecord, SchedulerError> {
        if let Some(existing) = self.store.find_non_terminal(database_id).await? {
            return Err(OperationError::AlreadyRunning {
                database_id,
                operation_id: existing.id,
            }
            .into());
        }

        let record = self.store.insert(database_id, op_type, params).await?;
        self.queue
            .enqueue(Job {
                operation_id: record.id,
                database_id,
                op_type,
                params: record.params.clone(),
            })
            .await?;

        info!(
            operation_id = %record.id,
            database_id = %database_id,
            op_type = %op_type,
            "Enqueued operation"
        );
        Ok(record)
    }

    /// Wait until the operation is terminal or the timeout elapses.
    ///
    /// The row is re-checked on every wake so a completion between the
    /// check and the subscription is never missed.
    pub async fn wait_for(
        &self,
        operation_id: OperationId,
        timeout: Duration,
    ) -> Result<WaitOutcome, SchedulerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = self.waits.subscribe(operation_id).await;
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before checking the row so a completion
            // between the check and the await is not lost.
            notified.as_mut().enable();

            let record = self.store.get(operation_id).await?;
            if record.is_terminal() {
                return Ok(WaitOutcome::Completed(record));
            }

            tokio::select! {
                () = &mut notified => {
                    debug!(operation_id = %operation_id, "Woken by completion notification");
                }
                () = tokio::time::sleep_until(deadline) => {
                    let record = self.store.get(operation_id).await?;
                    if record.is_terminal() {
                        return Ok(WaitOutcome::Completed(record));
                    }
                    return Ok(WaitOutcome::StillRunning { operation_id });
                }
            }
        }
    }

    /// Wait with the configured default timeout.
    pub async fn wait_for_default(
        &self,
        operation_id: OperationId,
    ) -> Result<WaitOutcome, SchedulerError> {
        self.wait_for(operation_id, self.config.wait_timeout()).await
    }

    /// Mark an operation done and wake its waiters.
    pub async fn complete(
        &self,
        operation_id: OperationId,
        output: Value,
    ) -> Result<OperationRecord, SchedulerError> {
        let record = self.store.complete(operation_id, output).await?;
        self.waits.notify(operation_id).await;
        Ok(record)
    }

    /// Mark an operation failed and wake its waiters.
    pub async fn fail(
        &self,
        operation_id: OperationId,
        error: &str,
    ) -> Result<OperationRecord, SchedulerError> {
        let record = self.store.fail(operation_id, error).await?;
        self.waits.notify(operation_id).await;
        Ok(record)
    }
}
