//! # Reconciliation Engine
//!
//! Operation scheduling and state reconciliation for cumulo.
//!
//! This crate provides the infrastructure for:
//! - Durable operation records with a background worker
//! - Single-flight execution per target database
//! - The diff-then-apply / diff-then-pull reconciliation passes
//! - An append-only audit log bracketing every mutation
//! - Dependency-ordered module install and uninstall
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌──────────────┐
//! │ SQL caller  │────►│ Scheduler  │────►│    Queue     │
//! │ (service)   │◄────│ (wait_for) │     │              │
//! └─────────────┘     └────────────┘     └──────┬───────┘
//!                                               │
//!                        ┌──────────────────────▼──────┐
//!                        │           Worker            │
//!                        │  (per-database lock, spawn) │
//!                        └──────────────┬──────────────┘
//!                                       │
//!                 ┌─────────────────────┼─────────────────────┐
//!                 ▼                     ▼                     ▼
//!          ┌────────────┐       ┌──────────────┐      ┌─────────────┐
//!          │  Install   │       │ Reconcile    │      │  Audit log  │
//!          │ /Uninstall │       │ (apply/sync) │      │             │
//!          └────────────┘       └──────────────┘      └─────────────┘
//! ```
//!
//! Each operation runs to completion on one worker, against a context built
//! fresh for it. Waiters subscribe to completion through the scheduler
//! rather than polling the store.

pub mod audit;
pub mod catalog;
pub mod engine;
pub mod install;
pub mod loader;
pub mod locks;
pub mod operation;
pub mod plan;
pub mod queue;
pub mod roles;
pub mod schema;
pub mod scheduler;
pub mod service;
pub mod worker;

pub use audit::{AuditChangeKind, AuditEntry, AuditSink, PgAuditLog};
pub use catalog::ModuleCatalog;
pub use engine::{Direction, EngineConfig, EngineError, ReconciliationEngine, StateExport};
pub use install::{InstallError, Installer};
pub use operation::{
    OperationError, OperationRecord, OperationStore, OperationType, PgOperationStore,
};
pub use plan::{PlanAction, PlanRow, PlanSummary};
pub use queue::{InMemoryJobQueue, Job, JobQueue};
pub use roles::{RetryPolicy, RoleManager};
pub use schema::bootstrap;
pub use scheduler::{OperationScheduler, SchedulerConfig, WaitOutcome};
pub use service::{CumuloService, OperationExecutor, ServiceConfig, ServiceError};
pub use worker::{ExecuteOperation, Worker, WorkerConfig};
