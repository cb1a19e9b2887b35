//! Background job queue boundary
//!
//! The engine only needs `enqueue` plus a worker that dequeues and executes.
//! Durable exactly-once-with-retry semantics belong to the queue
//! implementation wired in by the host; the in-memory implementation here
//! covers single-process deployments and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use cumulo_core::{DatabaseId, OperationId};

use crate::operation::OperationType;

/// One queued unit of work, referencing its durable operation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub operation_id: OperationId,
    pub database_id: DatabaseId,
    pub op_type: OperationType,
    pub params: Value,
}

/// Queue submission error.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is no longer accepting jobs.
    #[error("queue closed")]
    Closed,
}

/// The enqueue side of the background queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job for background execution.
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;
}

/// In-process queue over a tokio channel.
pub struct InMemoryJobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl InMemoryJobQueue {
    /// Create the queue, returning the receiver the worker consumes.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.tx.send(job).map_err(|_| QueueError::Closed)
    }
}
