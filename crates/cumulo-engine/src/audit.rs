//! Append-only audit log
//!
//! Every data-mutating step of a reconciliation pass lands in the audit
//! log, bracketed by START_COMMIT/END_COMMIT entries (or START_REVERT/
//! END_REVERT when a failed pass is rolled back). The scheduler writes the
//! OPEN_TRANSACTION/CLOSE_TRANSACTION markers and operation messages.
//!
//! The log is ordered by timestamp and never updated in place.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use cumulo_core::TransactionId;

/// Kind of one audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditChangeKind {
    Insert,
    Update,
    Delete,
    StartCommit,
    EndCommit,
    OpenTransaction,
    CloseTransaction,
    Error,
    StartRevert,
    EndRevert,
    SetMessage,
}

impl AuditChangeKind {
    /// The store-side representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditChangeKind::Insert => "INSERT",
            AuditChangeKind::Update => "UPDATE",
            AuditChangeKind::Delete => "DELETE",
            AuditChangeKind::StartCommit => "START_COMMIT",
            AuditChangeKind::EndCommit => "END_COMMIT",
            AuditChangeKind::OpenTransaction => "OPEN_TRANSACTION",
            AuditChangeKind::CloseTransaction => "CLOSE_TRANSACTION",
            AuditChangeKind::Error => "ERROR",
            AuditChangeKind::StartRevert => "START_REVERT",
            AuditChangeKind::EndRevert => "END_REVERT",
            AuditChangeKind::SetMessage => "SET_MESSAGE",
        }
    }
}

impl std::fmt::Display for AuditChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(AuditChangeKind::Insert),
            "UPDATE" => Ok(AuditChangeKind::Update),
            "DELETE" => Ok(AuditChangeKind::Delete),
            "START_COMMIT" => Ok(AuditChangeKind::StartCommit),
            "END_COMMIT" => Ok(AuditChangeKind::EndCommit),
            "OPEN_TRANSACTION" => Ok(AuditChangeKind::OpenTransaction),
            "CLOSE_TRANSACTION" => Ok(AuditChangeKind::CloseTransaction),
            "ERROR" => Ok(AuditChangeKind::Error),
            "START_REVERT" => Ok(AuditChangeKind::StartRevert),
            "END_REVERT" => Ok(AuditChangeKind::EndRevert),
            "SET_MESSAGE" => Ok(AuditChangeKind::SetMessage),
            other => Err(format!("unknown audit change kind: {other}")),
        }
    }
}

/// One audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub table_name: String,
    pub change_kind: AuditChangeKind,
    pub change: Value,
    pub message: Option<String>,
    pub transaction_id: Option<TransactionId>,
}

impl AuditEntry {
    /// A marker entry (no table, empty change payload).
    #[must_use]
    pub fn marker(
        actor: impl Into<String>,
        change_kind: AuditChangeKind,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            ts: Utc::now(),
            actor: actor.into(),
            table_name: String::new(),
            change_kind,
            change: Value::Object(serde_json::Map::new()),
            message: None,
            transaction_id: Some(transaction_id),
        }
    }

    /// A row-mutation entry.
    #[must_use]
    pub fn mutation(
        actor: impl Into<String>,
        table_name: impl Into<String>,
        change_kind: AuditChangeKind,
        change: Value,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            ts: Utc::now(),
            actor: actor.into(),
            table_name: table_name.into(),
            change_kind,
            change,
            message: None,
            transaction_id: Some(transaction_id),
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Audit log write error.
#[derive(Debug, Error)]
#[error("audit log error: {0}")]
pub struct AuditError(String);

/// Where audit entries go.
///
/// The store-backed implementation is [`PgAuditLog`]; tests substitute an
/// in-memory sink to assert on bracketing order.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// The Postgres-backed audit log.
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    /// Create a log writing through the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Erase for engine wiring.
    #[must_use]
    pub fn into_sink(self) -> Arc<dyn AuditSink> {
        Arc::new(self)
    }

    /// Open a user transaction bracket and return its id.
    pub async fn open_transaction(&self, actor: &str) -> Result<TransactionId, AuditError> {
        let tx = TransactionId::new();
        self.record(AuditEntry::marker(
            actor,
            AuditChangeKind::OpenTransaction,
            tx,
        ))
        .await?;
        Ok(tx)
    }

    /// Close a user transaction bracket.
    pub async fn close_transaction(
        &self,
        actor: &str,
        transaction_id: TransactionId,
    ) -> Result<(), AuditError> {
        self.record(AuditEntry::marker(
            actor,
            AuditChangeKind::CloseTransaction,
            transaction_id,
        ))
        .await
    }

    /// Attach a caller-supplied message to a transaction.
    pub async fn set_message(
        &self,
        actor: &str,
        transaction_id: TransactionId,
        message: &str,
    ) -> Result<(), AuditError> {
        self.record(
            AuditEntry::marker(actor, AuditChangeKind::SetMessage, transaction_id)
                .with_message(message),
        )
        .await
    }

    /// Entries belonging to one transaction bracket, oldest first.
    pub async fn by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r"
            SELECT ts, actor, table_name, change_kind, change, message, transaction_id
            FROM audit_log
            WHERE transaction_id = $1
            ORDER BY ts ASC, id ASC
            ",
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError(e.to_string()))?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }

    /// Row mutations recorded since the most recent OPEN_TRANSACTION marker,
    /// newest first.
    pub async fn changes_since_open_transaction(
        &self,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r"
            SELECT ts, actor, table_name, change_kind, change, message, transaction_id
            FROM audit_log
            WHERE change_kind IN ('INSERT', 'UPDATE', 'DELETE')
              AND ts > (
                SELECT COALESCE(MAX(ts), 'epoch'::timestamptz)
                FROM audit_log
                WHERE change_kind = 'OPEN_TRANSACTION'
              )
            ORDER BY ts DESC, id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError(e.to_string()))?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r"
            INSERT INTO audit_log (ts, actor, table_name, change_kind, change, message, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(entry.ts)
        .bind(&entry.actor)
        .bind(&entry.table_name)
        .bind(entry.change_kind.as_str())
        .bind(&entry.change)
        .bind(&entry.message)
        .bind(entry.transaction_id.map(|t| t.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    ts: DateTime<Utc>,
    actor: String,
    table_name: String,
    change_kind: String,
    change: Value,
    message: Option<String>,
    transaction_id: Option<uuid::Uuid>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, AuditError> {
        let change_kind = self.change_kind.parse().map_err(AuditError)?;
        Ok(AuditEntry {
            ts: self.ts,
            actor: self.actor,
            table_name: self.table_name,
            change_kind,
            change: self.change,
            message: self.message,
            transaction_id: self.transaction_id.map(TransactionId::from_uuid),
        })
    }
}
