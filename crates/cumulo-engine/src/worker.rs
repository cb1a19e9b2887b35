//! Background worker
//!
//! Consumes jobs from the queue and runs each operation to completion on
//! one worker task. Before executing, the worker takes the per-database
//! lock; on contention the job is requeued rather than failed, so a burst
//! of requests against one database serializes instead of erroring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::locks::DatabaseLocks;
use crate::queue::{Job, JobQueue};
use crate::scheduler::OperationScheduler;

/// Executes one operation against its target database.
#[async_trait]
pub trait ExecuteOperation: Send + Sync {
    /// Run the operation, returning its output or a single aggregated
    /// error message.
    async fn execute(&self, job: &Job) -> Result<Value, String>;
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of operations processed concurrently.
    pub concurrency: usize,

    /// Delay before a job bounced off a busy database is requeued (ms).
    pub requeue_delay_ms: u64,

    /// How often the run loop checks the shutdown flag (ms).
    pub shutdown_poll_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            requeue_delay_ms: 1000,
            shutdown_poll_ms: 500,
        }
    }
}

/// Background worker over the in-process job channel.
pub struct Worker {
    rx: tokio::sync::mpsc::UnboundedReceiver<Job>,
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn ExecuteOperation>,
    scheduler: Arc<OperationScheduler>,
    locks: Arc<DatabaseLocks>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    /// Create a worker.
    pub fn new(
        rx: tokio::sync::mpsc::UnboundedReceiver<Job>,
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn ExecuteOperation>,
        scheduler: Arc<OperationScheduler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            rx,
            queue,
            executor,
            scheduler,
            locks: Arc::new(DatabaseLocks::new()),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting graceful shutdown from outside the run loop.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run until the queue closes or shutdown is requested.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!(
            concurrency = self.config.concurrency,
            "Starting operation worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut shutdown_tick = interval(Duration::from_millis(self.config.shutdown_poll_ms));

        loop {
            tokio::select! {
                job = self.rx.recv() => {
                    match job {
                        Some(job) => self.dispatch(job, &semaphore).await,
                        None => {
                            info!("Job queue closed, stopping worker");
                            break;
                        }
                    }
                }
                _ = shutdown_tick.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        info!("Worker shutdown requested, stopping run loop");
                        break;
                    }
                }
            }
        }

        // Wait for in-flight operations to complete
        info!("Waiting for in-flight operations to complete...");
        let _ = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await;
        info!("Worker stopped");
    }

    async fn dispatch(&self, job: Job, semaphore: &Arc<Semaphore>) {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // Single-flight per database: bounce off a held lock and requeue.
        let guard = match self.locks.try_acquire(job.database_id).await {
            Some(guard) => guard,
            None => {
                debug!(
                    database_id = %job.database_id,
                    operation_id = %job.operation_id,
                    "Database busy, requeueing job"
                );
                let queue = self.queue.clone();
                let delay = Duration::from_millis(self.config.requeue_delay_ms);
                tokio::spawn(async move {
                    let _permit = permit;
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue(job).await {
                        error!(error = %e, "Failed to requeue job");
                    }
                });
                return;
            }
        };

        let executor = self.executor.clone();
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            process_operation(executor, scheduler, job).await;
        });
    }
}

/// Process a single operation.
#[instrument(skip(executor, scheduler, job), fields(operation_id = %job.operation_id))]
async fn process_operation(
    executor: Arc<dyn ExecuteOperation>,
    scheduler: Arc<OperationScheduler>,
    job: Job,
) {
    info!(
        op_type = %job.op_type,
        database_id = %job.database_id,
        "Processing operation"
    );

    let start = std::time::Instant::now();
    let result = executor.execute(&job).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok(output) => {
            info!(duration_ms = duration_ms, "Operation completed successfully");
            if let Err(e) = scheduler.complete(job.operation_id, output).await {
                error!(error = %e, "Failed to mark operation as complete");
            }
        }
        Err(message) => {
            warn!(
                duration_ms = duration_ms,
                error = %message,
                "Operation failed"
            );
            if let Err(e) = scheduler.fail(job.operation_id, &message).await {
                error!(error = %e, "Failed to mark operation as failed");
            }
        }
    }
}
