//! Service entry points
//!
//! The SQL-visible surface: six logical calls, each an enqueue-then-wait
//! round trip against the scheduler. The executor on the other side of the
//! queue builds a fresh context per operation and dispatches into the
//! engine or the installer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use thiserror::Error;

use cumulo_cloud::{ClientPool, RegionSet};
use cumulo_core::{DatabaseId, OperationId};
use cumulo_module::{sort_modules, Context, ModuleDescriptor, ModuleRegistry};

use crate::engine::{Direction, ReconciliationEngine};
use crate::install::Installer;
use crate::operation::{OperationRecord, OperationType};
use crate::queue::Job;
use crate::scheduler::{OperationScheduler, SchedulerError, WaitOutcome};
use crate::worker::ExecuteOperation;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bound for the enqueue-then-wait round trip, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

fn default_wait_timeout_secs() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

/// Service errors surfaced to SQL callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Scheduling failure (single-flight rejection, store, queue).
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The wait bound elapsed; the operation keeps running under this id.
    #[error("operation {operation_id} is still running")]
    StillRunning { operation_id: OperationId },

    /// The operation completed with a recorded error.
    #[error("{message}")]
    OperationFailed { message: String },
}

/// Executes operations dequeued by the worker.
pub struct OperationExecutor {
    pool: PgPool,
    registry: Arc<ModuleRegistry>,
    clients: Arc<ClientPool>,
    regions: RegionSet,
    engine: Arc<ReconciliationEngine>,
    installer: Installer,
}

impl OperationExecutor {
    /// Create an executor for one managed database.
    pub fn new(
        pool: PgPool,
        registry: Arc<ModuleRegistry>,
        clients: Arc<ClientPool>,
        regions: RegionSet,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            installer: Installer::new(pool.clone(), registry.clone()),
            pool,
            registry,
            clients,
            regions,
            engine,
        }
    }

    /// Installed modules in dependency order.
    async fn installed_modules(&self) -> Result<Vec<Arc<ModuleDescriptor>>, String> {
        let catalog = crate::catalog::ModuleCatalog::new(self.pool.clone());
        let installed = catalog.installed().await.map_err(|e| e.to_string())?;
        let modules: Vec<Arc<ModuleDescriptor>> = installed
            .iter()
            .filter_map(|name| self.registry.get(name).cloned())
            .collect();
        sort_modules(&self.registry, &modules, &[]).map_err(|e| e.to_string())
    }

    fn context(&self, database_id: DatabaseId) -> Arc<Context> {
        Arc::new(Context::new(
            database_id,
            self.pool.clone(),
            self.clients.clone(),
            self.regions.clone(),
        ))
    }
}

#[async_trait]
impl ExecuteOperation for OperationExecutor {
    async fn execute(&self, job: &Job) -> Result<Value, String> {
        let ctx = self.context(job.database_id);
        match job.op_type {
            OperationType::Apply => {
                let modules = self.installed_modules().await?;
                let summary = self
                    .engine
                    .apply(&ctx, &modules)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            OperationType::Sync => {
                let modules = self.installed_modules().await?;
                let summary = self
                    .engine
                    .sync(&ctx, &modules)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            OperationType::Plan => {
                let modules = self.installed_modules().await?;
                let direction = match job.params.get("direction").and_then(Value::as_str) {
                    Some("sync") => Direction::Sync,
                    _ => Direction::Apply,
                };
                let summary = self
                    .engine
                    .plan(&ctx, &modules, direction)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            OperationType::List => {
                let modules = self.installed_modules().await?;
                let export = self
                    .engine
                    .list(&ctx, &modules)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(export).map_err(|e| e.to_string())
            }
            OperationType::Install => {
                let names = module_names(&job.params)?;
                let installed = self
                    .installer
                    .install(&ctx, &self.engine, &names)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "installed": installed }))
            }
            OperationType::Uninstall => {
                let names = module_names(&job.params)?;
                let removed = self
                    .installer
                    .uninstall(&names)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "uninstalled": removed }))
            }
        }
    }
}

fn module_names(params: &Value) -> Result<Vec<String>, String> {
    params
        .get("modules")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .ok_or_else(|| "missing 'modules' parameter".to_string())
}

/// The SQL-level surface of one managed database.
pub struct CumuloService {
    scheduler: Arc<OperationScheduler>,
    database_id: DatabaseId,
    config: ServiceConfig,
}

impl CumuloService {
    /// Create the service surface over a scheduler.
    pub fn new(
        scheduler: Arc<OperationScheduler>,
        database_id: DatabaseId,
        config: ServiceConfig,
    ) -> Self {
        Self {
            scheduler,
            database_id,
            config,
        }
    }

    /// Install the named modules (plus missing dependencies).
    pub async fn install(&self, modules: Vec<String>) -> Result<Value, ServiceError> {
        self.run(OperationType::Install, json!({ "modules": modules }))
            .await
    }

    /// Uninstall the named modules.
    pub async fn uninstall(&self, modules: Vec<String>) -> Result<Value, ServiceError> {
        self.run(OperationType::Uninstall, json!({ "modules": modules }))
            .await
    }

    /// Push db state to the cloud.
    pub async fn apply(&self) -> Result<Value, ServiceError> {
        self.run(OperationType::Apply, json!({})).await
    }

    /// Pull cloud state into the db.
    pub async fn sync(&self) -> Result<Value, ServiceError> {
        self.run(OperationType::Sync, json!({})).await
    }

    /// Report the would-be plan without executing it.
    pub async fn plan(&self, direction: Direction) -> Result<Value, ServiceError> {
        self.run(
            OperationType::Plan,
            json!({ "direction": direction.to_string() }),
        )
        .await
    }

    /// Export current db/cloud state.
    pub async fn list(&self) -> Result<Value, ServiceError> {
        self.run(OperationType::List, json!({})).await
    }

    /// Fetch an operation row, e.g. to poll one that outlived its wait.
    pub async fn operation(
        &self,
        operation_id: OperationId,
    ) -> Result<OperationRecord, ServiceError> {
        Ok(self
            .scheduler
            .store()
            .get(operation_id)
            .await
            .map_err(SchedulerError::from)?)
    }

    async fn run(&self, op_type: OperationType, params: Value) -> Result<Value, ServiceError> {
        let record = self
            .scheduler
            .enqueue(self.database_id, op_type, params)
            .await?;
        let timeout = Duration::from_secs(self.config.wait_timeout_secs);
        match self.scheduler.wait_for(record.id, timeout).await? {
            WaitOutcome::Completed(record) => match record.error {
                Some(message) => Err(ServiceError::OperationFailed { message }),
                None => Ok(record.output.unwrap_or(Value::Null)),
            },
            WaitOutcome::StillRunning { operation_id } => {
                Err(ServiceError::StillRunning { operation_id })
            }
        }
    }
}
