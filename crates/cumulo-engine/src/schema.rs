//! Platform bookkeeping schema
//!
//! The tables every managed database carries regardless of which modules
//! are installed: the installed-module catalog, the operation table and the
//! audit log. Bootstrap is idempotent and runs when a database is first
//! connected.

use sqlx::PgPool;

/// DDL for the platform bookkeeping tables, in creation order.
pub const PLATFORM_DDL: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS module (
        name varchar PRIMARY KEY
    )",
    r"
    CREATE TABLE IF NOT EXISTS module_dependency (
        module varchar NOT NULL REFERENCES module (name) ON DELETE CASCADE,
        dependency varchar NOT NULL REFERENCES module (name) ON DELETE CASCADE,
        PRIMARY KEY (module, dependency)
    )",
    r"
    CREATE TABLE IF NOT EXISTS module_table (
        module varchar NOT NULL REFERENCES module (name) ON DELETE CASCADE,
        table_name varchar NOT NULL,
        PRIMARY KEY (module, table_name)
    )",
    r"
    CREATE TABLE IF NOT EXISTS operation (
        id uuid PRIMARY KEY,
        database_id uuid NOT NULL,
        op_type varchar NOT NULL,
        params json NOT NULL,
        start_time timestamptz NOT NULL DEFAULT NOW(),
        end_time timestamptz,
        output json,
        error varchar
    )",
    // At most one non-terminal operation per target database.
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS operation_database_pending_idx
    ON operation (database_id) WHERE end_time IS NULL",
    r"
    CREATE TABLE IF NOT EXISTS audit_log (
        id serial PRIMARY KEY,
        ts timestamptz NOT NULL,
        actor varchar NOT NULL,
        table_name varchar NOT NULL,
        change_kind varchar NOT NULL,
        change json NOT NULL,
        message varchar,
        transaction_id uuid
    )",
    r"
    CREATE INDEX IF NOT EXISTS audit_log_ts_idx ON audit_log (ts)",
];

/// Create the platform bookkeeping tables if they do not exist.
pub async fn bootstrap(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for ddl in PLATFORM_DDL {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
