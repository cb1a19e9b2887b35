//! Installed-module catalog
//!
//! Bookkeeping rows for which modules a managed database has installed,
//! their dependency edges and the tables they provide. Rows are written
//! inside the install/uninstall transaction so the catalog can never
//! disagree with the schema.

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

/// Catalog access error.
#[derive(Debug, Error)]
#[error("module catalog error: {0}")]
pub struct CatalogError(String);

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// The installed-module catalog of one managed database.
pub struct ModuleCatalog {
    pool: PgPool,
}

impl ModuleCatalog {
    /// Create a catalog reading through the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Versioned names of every installed module.
    pub async fn installed(&self) -> Result<Vec<String>, CatalogError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM module ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Versioned names of installed modules that depend on the given one.
    pub async fn dependents_of(&self, versioned_name: &str) -> Result<Vec<String>, CatalogError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT module FROM module_dependency WHERE dependency = $1 ORDER BY module",
        )
        .bind(versioned_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Every table name owned by an installed module.
    pub async fn owned_tables(&self) -> Result<Vec<String>, CatalogError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT table_name FROM module_table ORDER BY table_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Tables present in the public schema, for collision checks.
    pub async fn existing_tables(&self) -> Result<Vec<String>, CatalogError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT table_name::varchar
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Record an installed module inside the install transaction.
    pub async fn record_install(
        tx: &mut Transaction<'_, Postgres>,
        versioned_name: &str,
        dependencies: &[String],
        tables: &[String],
    ) -> Result<(), CatalogError> {
        sqlx::query("INSERT INTO module (name) VALUES ($1)")
            .bind(versioned_name)
            .execute(&mut **tx)
            .await?;
        for dependency in dependencies {
            sqlx::query("INSERT INTO module_dependency (module, dependency) VALUES ($1, $2)")
                .bind(versioned_name)
                .bind(dependency)
                .execute(&mut **tx)
                .await?;
        }
        for table in tables {
            sqlx::query("INSERT INTO module_table (module, table_name) VALUES ($1, $2)")
                .bind(versioned_name)
                .bind(table)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Remove a module's rows inside the uninstall transaction.
    ///
    /// Dependency and table rows cascade from the module row.
    pub async fn record_uninstall(
        tx: &mut Transaction<'_, Postgres>,
        versioned_name: &str,
    ) -> Result<(), CatalogError> {
        sqlx::query("DELETE FROM module WHERE name = $1")
            .bind(versioned_name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
