//! Operation records
//!
//! One row per scheduled unit of work. A record is pending while its
//! `end_time` is null; exactly one worker transitions it to done (output
//! set) or failed (error set), and it is terminal from then on. At most one
//! non-terminal operation may exist per target database.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use async_trait::async_trait;

use cumulo_core::{DatabaseId, OperationId};

/// The kind of a scheduled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Apply,
    Sync,
    Install,
    Uninstall,
    Plan,
    List,
}

impl OperationType {
    /// The store-side representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Apply => "APPLY",
            OperationType::Sync => "SYNC",
            OperationType::Install => "INSTALL",
            OperationType::Uninstall => "UNINSTALL",
            OperationType::Plan => "PLAN",
            OperationType::List => "LIST",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for OperationType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for OperationType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPLY" => Ok(OperationType::Apply),
            "SYNC" => Ok(OperationType::Sync),
            "INSTALL" => Ok(OperationType::Install),
            "UNINSTALL" => Ok(OperationType::Uninstall),
            "PLAN" => Ok(OperationType::Plan),
            "LIST" => Ok(OperationType::List),
            other => Err(format!("unknown operation type: {other}")),
        }
    }
}

/// One durable operation row.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: OperationId,
    pub database_id: DatabaseId,
    pub op_type: OperationType,
    pub params: Value,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl OperationRecord {
    /// Terminal once the end time is set.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Operation store error.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Store error.
    #[error("operation store error: {0}")]
    Database(String),

    /// No such operation.
    #[error("operation not found: {operation_id}")]
    NotFound { operation_id: OperationId },

    /// Another operation is already outstanding for the database.
    #[error("operation {operation_id} already running for database {database_id}")]
    AlreadyRunning {
        database_id: DatabaseId,
        operation_id: OperationId,
    },
}

/// Result type for operation store calls.
pub type OperationResult<T> = Result<T, OperationError>;

/// The durable operation table.
///
/// Backed by Postgres in production ([`PgOperationStore`]); tests use an
/// in-memory store.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert a new pending operation row.
    async fn insert(
        &self,
        database_id: DatabaseId,
        op_type: OperationType,
        params: Value,
    ) -> OperationResult<OperationRecord>;

    /// Fetch one operation row.
    async fn get(&self, operation_id: OperationId) -> OperationResult<OperationRecord>;

    /// The non-terminal operation for a database, if one exists.
    async fn find_non_terminal(
        &self,
        database_id: DatabaseId,
    ) -> OperationResult<Option<OperationRecord>>;

    /// Transition to done, setting the end time and output.
    async fn complete(
        &self,
        operation_id: OperationId,
        output: Value,
    ) -> OperationResult<OperationRecord>;

    /// Transition to failed, setting the end time and error.
    async fn fail(
        &self,
        operation_id: OperationId,
        error: &str,
    ) -> OperationResult<OperationRecord>;
}

/// Postgres-backed operation store.
pub struct PgOperationStore {
    pool: PgPool,
}

impl PgOperationStore {
    /// Create a store writing through the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationStore for PgOperationStore {
    async fn insert(
        &self,
        database_id: DatabaseId,
        op_type: OperationType,
        params: Value,
    ) -> OperationResult<OperationRecord> {
        let row: OperationRow = sqlx::query_as(
            r"
            INSERT INTO operation (id, database_id, op_type, params, start_time)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, database_id, op_type, params, start_time, end_time, output, error
            ",
        )
        .bind(OperationId::new().as_uuid())
        .bind(database_id.as_uuid())
        .bind(op_type.as_str())
        .bind(&params)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OperationError::Database(e.to_string()))?;

        row.into_record()
    }

    async fn get(&self, operation_id: OperationId) -> OperationResult<OperationRecord> {
        let row: Option<OperationRow> = sqlx::query_as(
            r"
            SELECT id, database_id, op_type, params, start_time, end_time, output, error
            FROM operation
            WHERE id = $1
            ",
        )
        .bind(operation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::Database(e.to_string()))?;

        row.ok_or(OperationError::NotFound { operation_id })?
            .into_record()
    }

    async fn find_non_terminal(
        &self,
        database_id: DatabaseId,
    ) -> OperationResult<Option<OperationRecord>> {
        let row: Option<OperationRow> = sqlx::query_as(
            r"
            SELECT id, database_id, op_type, params, start_time, end_time, output, error
            FROM operation
            WHERE database_id = $1 AND end_time IS NULL
            LIMIT 1
            ",
        )
        .bind(database_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::Database(e.to_string()))?;

        row.map(OperationRow::into_record).transpose()
    }

    async fn complete(
        &self,
        operation_id: OperationId,
        output: Value,
    ) -> OperationResult<OperationRecord> {
        let row: Option<OperationRow> = sqlx::query_as(
            r"
            UPDATE operation
            SET end_time = NOW(), output = $2
            WHERE id = $1 AND end_time IS NULL
            RETURNING id, database_id, op_type, params, start_time, end_time, output, error
            ",
        )
        .bind(operation_id.as_uuid())
        .bind(&output)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::Database(e.to_string()))?;

        row.ok_or(OperationError::NotFound { operation_id })?
            .into_record()
    }

    async fn fail(
        &self,
        operation_id: OperationId,
        error: &str,
    ) -> OperationResult<OperationRecord> {
        let row: Option<OperationRow> = sqlx::query_as(
            r"
            UPDATE operation
            SET end_time = NOW(), error = $2
            WHERE id = $1 AND end_time IS NULL
            RETURNING id, database_id, op_type, params, start_time, end_time, output, error
            ",
        )
        .bind(operation_id.as_uuid())
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OperationError::Database(e.to_string()))?;

        row.ok_or(OperationError::NotFound { operation_id })?
            .into_record()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: uuid::Uuid,
    database_id: uuid::Uuid,
    op_type: String,
    params: Value,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    output: Option<Value>,
    error: Option<String>,
}

impl OperationRow {
    fn into_record(self) -> OperationResult<OperationRecord> {
        let op_type = self.op_type.parse().map_err(OperationError::Database)?;
        Ok(OperationRecord {
            id: OperationId::from_uuid(self.id),
            database_id: DatabaseId::from_uuid(self.database_id),
            op_type,
            params: self.params,
            start_time: self.start_time,
            end_time: self.end_time,
            output: self.output,
            error: self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_roundtrip() {
        let types = [
            OperationType::Apply,
            OperationType::Sync,
            OperationType::Install,
            OperationType::Uninstall,
            OperationType::Plan,
            OperationType::List,
        ];
        for op_type in types {
            assert_eq!(op_type.as_str().parse::<OperationType>().unwrap(), op_type);
        }
        assert!("UPGRADE".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_terminal_iff_end_time() {
        let mut record = OperationRecord {
            id: OperationId::new(),
            database_id: DatabaseId::new(),
            op_type: OperationType::Apply,
            params: serde_json::json!({}),
            start_time: Utc::now(),
            end_time: None,
            output: None,
            error: None,
        };
        assert!(!record.is_terminal());
        record.end_time = Some(Utc::now());
        assert!(record.is_terminal());
    }
}
