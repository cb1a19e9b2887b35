//! Module install and uninstall
//!
//! Install walks the dependency order forward: schema first, catalog rows
//! in the same transaction, then an initial import of existing cloud state
//! for the new mappers. Uninstall walks the reverse order and refuses to
//! remove a module another installed module still depends on. Both reject
//! configuration problems before touching the schema.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use cumulo_module::{
    sort_modules, Context, ModuleDescriptor, ModuleError, ModuleRegistry, Side,
};

use crate::catalog::{CatalogError, ModuleCatalog};
use crate::engine::{EngineError, ReconciliationEngine};
use crate::loader::{run_with_retries, unit, Unit};

/// Install/uninstall errors.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Framework error (unknown module, cycle, missing dependency).
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Catalog error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Store error while running module SQL.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The pre-install sync failed.
    #[error("sync during module install failed: {0}")]
    PreInstallSync(#[source] EngineError),

    /// A module's tables collide with pre-existing ones.
    #[error("collision with existing tables detected. {}", details.join("; "))]
    TableCollision { details: Vec<String> },

    /// The initial cloud import failed.
    #[error("initial import failed: {0}")]
    Import(String),
}

/// Installs and uninstalls module sets against one managed database.
pub struct Installer {
    pool: PgPool,
    registry: Arc<ModuleRegistry>,
}

impl Installer {
    /// Create an installer for the given database.
    pub fn new(pool: PgPool, registry: Arc<ModuleRegistry>) -> Self {
        Self { pool, registry }
    }

    /// Install the named modules plus any missing dependencies.
    ///
    /// Returns the versioned names actually installed, dependency-first.
    pub async fn install(
        &self,
        ctx: &Arc<Context>,
        engine: &ReconciliationEngine,
        names: &[String],
    ) -> Result<Vec<String>, InstallError> {
        let catalog = ModuleCatalog::new(self.pool.clone());
        let installed = catalog.installed().await?;

        let mut modules: Vec<Arc<ModuleDescriptor>> = Vec::new();
        for name in names {
            modules.push(self.registry.resolve(name)?);
        }
        modules.retain(|m| !installed.contains(&m.versioned_name()));

        self.attach_missing_dependencies(&mut modules, &installed)?;

        if modules.is_empty() {
            info!("All modules already installed");
            return Ok(Vec::new());
        }

        self.check_table_collisions(&catalog, &modules).await?;

        // Sync the modules already present first so records the new modules
        // reference exist before their initial import.
        let installed_modules = self.descriptors_for(&installed);
        if !installed_modules.is_empty() {
            let sorted = sort_modules(&self.registry, &installed_modules, &[])?;
            engine
                .sync(ctx, &sorted)
                .await
                .map_err(InstallError::PreInstallSync)?;
        }

        let sorted = sort_modules(&self.registry, &modules, &installed)?;

        let mut tx = self.pool.begin().await?;
        for module in &sorted {
            info!(module = %module.versioned_name(), "Installing module");
            for statement in module.install_sql() {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            ModuleCatalog::record_install(
                &mut tx,
                &module.versioned_name(),
                module.dependencies(),
                module.tables(),
            )
            .await?;
        }
        tx.commit().await?;

        self.import_cloud_state(ctx, &sorted).await?;

        Ok(sorted.iter().map(|m| m.versioned_name()).collect())
    }

    /// Uninstall the named modules.
    ///
    /// Returns the versioned names actually removed, dependents-first.
    pub async fn uninstall(&self, names: &[String]) -> Result<Vec<String>, InstallError> {
        let catalog = ModuleCatalog::new(self.pool.clone());
        let installed = catalog.installed().await?;

        let mut modules: Vec<Arc<ModuleDescriptor>> = Vec::new();
        for name in names {
            modules.push(self.registry.resolve(name)?);
        }
        modules.retain(|m| installed.contains(&m.versioned_name()));

        if modules.is_empty() {
            info!("All modules already uninstalled");
            return Ok(Vec::new());
        }

        let removing: HashSet<String> = modules.iter().map(|m| m.versioned_name()).collect();
        for module in &modules {
            let name = module.versioned_name();
            let dependents: Vec<String> = catalog
                .dependents_of(&name)
                .await?
                .into_iter()
                .filter(|d| !removing.contains(d))
                .collect();
            if !dependents.is_empty() {
                return Err(ModuleError::StillDependedOn {
                    module: name,
                    dependents,
                }
                .into());
            }
        }

        let remaining: Vec<String> = installed
            .iter()
            .filter(|name| !removing.contains(*name))
            .cloned()
            .collect();
        let mut sorted = sort_modules(&self.registry, &modules, &remaining)?;
        sorted.reverse();

        let mut tx = self.pool.begin().await?;
        for module in &sorted {
            info!(module = %module.versioned_name(), "Uninstalling module");
            for statement in module.remove_sql() {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            ModuleCatalog::record_uninstall(&mut tx, &module.versioned_name()).await?;
        }
        tx.commit().await?;

        Ok(sorted.iter().map(|m| m.versioned_name()).collect())
    }

    /// Pull transitive dependencies that are neither listed nor installed
    /// into the install set.
    fn attach_missing_dependencies(
        &self,
        modules: &mut Vec<Arc<ModuleDescriptor>>,
        installed: &[String],
    ) -> Result<(), InstallError> {
        let mut listed: HashSet<String> = modules.iter().map(|m| m.versioned_name()).collect();
        loop {
            let mut missing: Vec<String> = modules
                .iter()
                .flat_map(|m| m.dependencies().iter().cloned())
                .filter(|dep| !listed.contains(dep) && !installed.contains(dep))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            missing.sort();
            if missing.is_empty() {
                return Ok(());
            }
            warn!(
                missing = ?missing,
                "Automatically attaching missing dependencies to this install"
            );
            for name in missing {
                let module = self.registry.resolve(&name)?;
                listed.insert(name);
                modules.push(module);
            }
        }
    }

    async fn check_table_collisions(
        &self,
        catalog: &ModuleCatalog,
        modules: &[Arc<ModuleDescriptor>],
    ) -> Result<(), InstallError> {
        // Tables already owned by installed modules are expected to exist;
        // anything else occupying a requested name is a collision.
        let existing: HashSet<String> = catalog.existing_tables().await?.into_iter().collect();
        let owned: HashSet<String> = catalog.owned_tables().await?.into_iter().collect();

        let mut details = Vec::new();
        for module in modules {
            let collisions: Vec<&String> = module
                .tables()
                .iter()
                .filter(|t| existing.contains(*t) && !owned.contains(*t))
                .collect();
            if !collisions.is_empty() {
                details.push(format!(
                    "Module {} collides with tables: {}",
                    module.name(),
                    collisions
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(InstallError::TableCollision { details })
        }
    }

    /// Read current cloud state for newly installed modules and seed their
    /// tables with it.
    async fn import_cloud_state(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
    ) -> Result<(), InstallError> {
        for module in modules {
            let units: Vec<Unit> = module
                .mappers()
                .iter()
                .map(|mapper| {
                    let ctx = ctx.clone();
                    let mapper = mapper.clone();
                    unit(move || {
                        let ctx = ctx.clone();
                        let mapper = mapper.clone();
                        async move {
                            let kind = mapper.entity_kind();
                            let records = mapper
                                .cloud_read_all(&ctx)
                                .await
                                .map_err(|e| format!("{kind} cloud read error: {e}"))?;
                            if records.is_empty() {
                                return Ok(());
                            }
                            ctx.memo().store(Side::Cloud, records.clone()).await;
                            let created = mapper
                                .db_create(records, &ctx)
                                .await
                                .map_err(|e| format!("{kind} db create error: {e}"))?;
                            ctx.memo().store(Side::Db, created).await;
                            Ok(())
                        }
                    })
                })
                .collect();
            run_with_retries(units)
                .await
                .map_err(|e| InstallError::Import(e.to_string()))?;
        }
        Ok(())
    }

    fn descriptors_for(&self, names: &[String]) -> Vec<Arc<ModuleDescriptor>> {
        names
            .iter()
            .filter_map(|name| self.registry.get(name).cloned())
            .collect()
    }
}
