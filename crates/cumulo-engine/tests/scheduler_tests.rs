//! Scheduler and worker tests
//!
//! Exercises the operation lifecycle end to end over the in-memory queue:
//! - Single-flight per target database, at both layers
//! - Bounded wait with a still-running hint and an unchanged terminal result
//! - Worker completion/failure write-back and waiter notification
//! - Requeue-on-contention and cross-database parallelism

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use cumulo_core::{DatabaseId, OperationId};
use cumulo_engine::operation::{
    OperationError, OperationRecord, OperationResult, OperationStore, OperationType,
};
use cumulo_engine::queue::{InMemoryJobQueue, Job, JobQueue};
use cumulo_engine::scheduler::{OperationScheduler, SchedulerConfig, SchedulerError, WaitOutcome};
use cumulo_engine::service::{CumuloService, ServiceConfig, ServiceError};
use cumulo_engine::worker::{ExecuteOperation, Worker, WorkerConfig};

// =============================================================================
// In-memory operation store
// =============================================================================

#[derive(Default)]
struct MemoryOperationStore {
    records: Mutex<HashMap<OperationId, OperationRecord>>,
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn insert(
        &self,
        database_id: DatabaseId,
        op_type: OperationType,
        params: Value,
    ) -> OperationResult<OperationRecord> {
        let record = OperationRecord {
            id: OperationId::new(),
            database_id,
            op_type,
            params,
            start_time: Utc::now(),
            end_time: None,
            output: None,
            error: None,
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, operation_id: OperationId) -> OperationResult<OperationRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&operation_id)
            .cloned()
            .ok_or(OperationError::NotFound { operation_id })
    }

    async fn find_non_terminal(
        &self,
        database_id: DatabaseId,
    ) -> OperationResult<Option<OperationRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.database_id == database_id && !r.is_terminal())
            .cloned())
    }

    async fn complete(
        &self,
        operation_id: OperationId,
        output: Value,
    ) -> OperationResult<OperationRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&operation_id)
            .ok_or(OperationError::NotFound { operation_id })?;
        if record.end_time.is_none() {
            record.end_time = Some(Utc::now());
            record.output = Some(output);
        }
        Ok(record.clone())
    }

    async fn fail(
        &self,
        operation_id: OperationId,
        error: &str,
    ) -> OperationResult<OperationRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&operation_id)
            .ok_or(OperationError::NotFound { operation_id })?;
        if record.end_time.is_none() {
            record.end_time = Some(Utc::now());
            record.error = Some(error.to_string());
        }
        Ok(record.clone())
    }
}

// =============================================================================
// Mock executor
// =============================================================================

struct MockExecutor {
    delay: Duration,
    response: Result<Value, String>,
    executions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExecutor {
    fn new(delay: Duration, response: Result<Value, String>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            response,
            executions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExecuteOperation for MockExecutor {
    async fn execute(&self, _job: &Job) -> Result<Value, String> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.response.clone()
    }
}

struct TestRig {
    scheduler: Arc<OperationScheduler>,
    queue: Arc<InMemoryJobQueue>,
    executor: Arc<MockExecutor>,
}

fn rig(executor: Arc<MockExecutor>) -> TestRig {
    let (queue, rx) = InMemoryJobQueue::new();
    let queue = Arc::new(queue);
    let store = Arc::new(MemoryOperationStore::default());
    let scheduler = Arc::new(OperationScheduler::new(
        store,
        queue.clone(),
        SchedulerConfig::default(),
    ));
    let worker = Worker::new(
        rx,
        queue.clone(),
        executor.clone(),
        scheduler.clone(),
        WorkerConfig {
            requeue_delay_ms: 10,
            ..WorkerConfig::default()
        },
    );
    tokio::spawn(worker.run());
    TestRig {
        scheduler,
        queue,
        executor,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_operation_completes_and_wakes_waiter() {
    let executor = MockExecutor::new(Duration::from_millis(20), Ok(json!({"rows": 1})));
    let rig = rig(executor);
    let db = DatabaseId::new();

    let record = rig
        .scheduler
        .enqueue(db, OperationType::Apply, json!({}))
        .await
        .unwrap();
    let outcome = rig
        .scheduler
        .wait_for(record.id, Duration::from_secs(5))
        .await
        .unwrap();

    match outcome {
        WaitOutcome::Completed(record) => {
            assert!(record.is_terminal());
            assert_eq!(record.output, Some(json!({"rows": 1})));
            assert!(record.error.is_none());
        }
        WaitOutcome::StillRunning { .. } => panic!("operation should have completed"),
    }
}

#[tokio::test]
async fn test_failed_operation_records_error() {
    let executor = MockExecutor::new(Duration::from_millis(10), Err("provider exploded".into()));
    let rig = rig(executor);
    let db = DatabaseId::new();

    let record = rig
        .scheduler
        .enqueue(db, OperationType::Sync, json!({}))
        .await
        .unwrap();
    let outcome = rig
        .scheduler
        .wait_for(record.id, Duration::from_secs(5))
        .await
        .unwrap();

    match outcome {
        WaitOutcome::Completed(record) => {
            assert_eq!(record.error.as_deref(), Some("provider exploded"));
            assert!(record.output.is_none());
        }
        WaitOutcome::StillRunning { .. } => panic!("operation should have completed"),
    }
}

#[tokio::test]
async fn test_second_operation_rejected_while_first_pending() {
    let executor = MockExecutor::new(Duration::from_millis(200), Ok(json!({})));
    let rig = rig(executor);
    let db = DatabaseId::new();

    let first = rig
        .scheduler
        .enqueue(db, OperationType::Apply, json!({}))
        .await
        .unwrap();

    let err = rig
        .scheduler
        .enqueue(db, OperationType::Sync, json!({}))
        .await
        .unwrap_err();
    match err {
        SchedulerError::Operation(OperationError::AlreadyRunning { operation_id, .. }) => {
            assert_eq!(operation_id, first.id);
        }
        other => panic!("expected AlreadyRunning, got: {other}"),
    }

    // Once the first is terminal, a new operation is accepted.
    rig.scheduler
        .wait_for(first.id, Duration::from_secs(5))
        .await
        .unwrap();
    rig.scheduler
        .enqueue(db, OperationType::Sync, json!({}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_timeout_returns_still_running_and_result_is_unchanged_later() {
    let executor = MockExecutor::new(Duration::from_millis(150), Ok(json!({"done": true})));
    let rig = rig(executor);
    let db = DatabaseId::new();

    let record = rig
        .scheduler
        .enqueue(db, OperationType::Apply, json!({}))
        .await
        .unwrap();

    let outcome = rig
        .scheduler
        .wait_for(record.id, Duration::from_millis(30))
        .await
        .unwrap();
    let operation_id = match outcome {
        WaitOutcome::StillRunning { operation_id } => operation_id,
        WaitOutcome::Completed(_) => panic!("wait should have timed out"),
    };
    assert_eq!(operation_id, record.id);

    // The operation was not cancelled; a later wait observes the terminal
    // result, unchanged by the earlier timeout.
    let outcome = rig
        .scheduler
        .wait_for(operation_id, Duration::from_secs(5))
        .await
        .unwrap();
    match outcome {
        WaitOutcome::Completed(record) => {
            assert_eq!(record.output, Some(json!({"done": true})));
        }
        WaitOutcome::StillRunning { .. } => panic!("operation should have completed"),
    }
    assert_eq!(rig.executor.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_contending_jobs_for_one_database_serialize() {
    let executor = MockExecutor::new(Duration::from_millis(60), Ok(json!({})));
    let rig = rig(executor);
    let db = DatabaseId::new();

    // Bypass the scheduler's single-flight check to race two jobs for the
    // same database directly at the worker's lock.
    for _ in 0..2 {
        rig.queue
            .enqueue(Job {
                operation_id: OperationId::new(),
                database_id: db,
                op_type: OperationType::Apply,
                params: json!({}),
            })
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(rig.executor.executions.load(Ordering::SeqCst), 2);
    assert_eq!(rig.executor.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_databases_run_in_parallel() {
    let executor = MockExecutor::new(Duration::from_millis(100), Ok(json!({})));
    let rig = rig(executor);

    for _ in 0..2 {
        rig.queue
            .enqueue(Job {
                operation_id: OperationId::new(),
                database_id: DatabaseId::new(),
                op_type: OperationType::Apply,
                params: json!({}),
            })
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rig.executor.executions.load(Ordering::SeqCst), 2);
    assert_eq!(rig.executor.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_service_round_trip() {
    let executor = MockExecutor::new(Duration::from_millis(10), Ok(json!({"plan_version": 3})));
    let rig = rig(executor);
    let service = CumuloService::new(
        rig.scheduler.clone(),
        DatabaseId::new(),
        ServiceConfig::default(),
    );

    let output = service.apply().await.unwrap();
    assert_eq!(output, json!({"plan_version": 3}));
}

#[tokio::test]
async fn test_service_surfaces_recorded_error() {
    let executor = MockExecutor::new(Duration::from_millis(10), Err("1 unresolved: boom".into()));
    let rig = rig(executor);
    let service = CumuloService::new(
        rig.scheduler.clone(),
        DatabaseId::new(),
        ServiceConfig::default(),
    );

    let err = service.sync().await.unwrap_err();
    match err {
        ServiceError::OperationFailed { message } => assert_eq!(message, "1 unresolved: boom"),
        other => panic!("expected OperationFailed, got: {other}"),
    }
}

#[tokio::test]
async fn test_service_still_running_then_pollable() {
    let executor = MockExecutor::new(Duration::from_millis(200), Ok(json!({"ok": true})));
    let rig = rig(executor);
    let service = CumuloService::new(
        rig.scheduler.clone(),
        DatabaseId::new(),
        ServiceConfig {
            wait_timeout_secs: 0,
        },
    );

    let err = service.list().await.unwrap_err();
    let operation_id = match err {
        ServiceError::StillRunning { operation_id } => operation_id,
        other => panic!("expected StillRunning, got: {other}"),
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    let record = service.operation(operation_id).await.unwrap();
    assert!(record.is_terminal());
    assert_eq!(record.output, Some(json!({"ok": true})));
}
