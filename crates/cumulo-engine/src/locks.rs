//! Per-database execution locks
//!
//! The single mutual-exclusion primitive in the system: one async lock per
//! target database, serializing every reconciliation operation against it.
//! Different databases proceed fully in parallel. Workers try-acquire and
//! requeue the job on contention rather than failing it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use cumulo_core::DatabaseId;

/// Held for the duration of one operation's execution.
pub type DatabaseGuard = OwnedMutexGuard<()>;

/// The per-database lock table.
#[derive(Default)]
pub struct DatabaseLocks {
    locks: Mutex<HashMap<DatabaseId, Arc<Mutex<()>>>>,
}

impl DatabaseLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, database_id: DatabaseId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(database_id).or_default().clone()
    }

    /// Attempt to take the lock without waiting.
    pub async fn try_acquire(&self, database_id: DatabaseId) -> Option<DatabaseGuard> {
        let lock = self.lock_for(database_id).await;
        lock.try_lock_owned().ok()
    }

    /// Take the lock, waiting for the current holder if necessary.
    pub async fn acquire(&self, database_id: DatabaseId) -> DatabaseGuard {
        let lock = self.lock_for(database_id).await;
        lock.lock_owned().await
    }
}
