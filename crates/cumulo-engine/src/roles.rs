//! Scoped role provisioning
//!
//! CREATE ROLE / GRANT / REVOKE statements are known to trip over each
//! other under concurrent execution and to succeed on a simple retry, so
//! every statement here runs under a bounded retry. The bound and the
//! eligible error codes are configuration, not policy: which concurrency
//! errors are worth retrying depends on the backing store.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;

/// Retry configuration for transient store concurrency errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per statement before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// SQLSTATE codes considered transient.
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<String>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retryable_codes() -> Vec<String> {
    // serialization_failure, deadlock_detected, lock_not_available
    vec!["40001".to_string(), "40P01".to_string(), "55P03".to_string()]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

impl RetryPolicy {
    /// Whether a SQLSTATE code is in the retryable class.
    #[must_use]
    pub fn code_is_retryable(&self, code: &str) -> bool {
        self.retryable_codes.iter().any(|c| c == code)
    }

    /// Whether a store error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self, error: &sqlx::Error) -> bool {
        match error {
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| self.code_is_retryable(&code)),
            _ => false,
        }
    }
}

/// Provisions scoped credentials for a managed database.
pub struct RoleManager {
    pool: PgPool,
    policy: RetryPolicy,
}

impl RoleManager {
    /// Create a manager with the default retry policy.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            policy: RetryPolicy::default(),
        }
    }

    /// Create a manager with a custom retry policy.
    #[must_use]
    pub fn with_policy(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// The active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Create a login role scoped to one database.
    pub async fn create_role(
        &self,
        role: &str,
        password: &str,
        database: &str,
    ) -> Result<(), sqlx::Error> {
        self.execute_with_retry(&format!(
            "CREATE ROLE {} LOGIN PASSWORD {} IN ROLE {}",
            quote_ident(role),
            quote_literal(password),
            quote_ident(&group_role(database)),
        ))
        .await
    }

    /// Grant the database's group role to an existing role.
    pub async fn grant_role(&self, role: &str, database: &str) -> Result<(), sqlx::Error> {
        self.execute_with_retry(&format!(
            "GRANT {} TO {}",
            quote_ident(&group_role(database)),
            quote_ident(role),
        ))
        .await
    }

    /// Revoke the database's group role from a role.
    pub async fn revoke_role(&self, role: &str, database: &str) -> Result<(), sqlx::Error> {
        self.execute_with_retry(&format!(
            "REVOKE {} FROM {}",
            quote_ident(&group_role(database)),
            quote_ident(role),
        ))
        .await
    }

    /// Drop a previously provisioned role.
    pub async fn drop_role(&self, role: &str) -> Result<(), sqlx::Error> {
        self.execute_with_retry(&format!("DROP ROLE IF EXISTS {}", quote_ident(role)))
            .await
    }

    async fn execute_with_retry(&self, sql: &str) -> Result<(), sqlx::Error> {
        let mut attempt = 0;
        loop {
            match sqlx::query(sql).execute(&self.pool).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts || !self.policy.is_retryable(&e) {
                        return Err(e);
                    }
                    warn!(attempt = attempt, error = %e, "Retrying role statement");
                }
            }
        }
    }
}

fn group_role(database: &str) -> String {
    format!("{database}_group")
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}
