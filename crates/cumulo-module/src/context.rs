//! Per-operation context
//!
//! One `Context` is built for each scheduled operation and dropped with it.
//! It carries the memoized db/cloud snapshots, the region-scoped client
//! pool, the enabled-region set and the store handle. Memos are never
//! shared across operations; stale snapshots would corrupt reconciliation
//! decisions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use cumulo_cloud::{ClientPool, CloudClient, CloudError, Region, RegionSet};
use cumulo_core::DatabaseId;

use crate::entity::EntityId;
use crate::error::ModuleResult;
use crate::record::Record;

/// Which memoized side a snapshot call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The relational store snapshot.
    Db,
    /// The provider snapshot.
    Cloud,
}

type SnapshotMap = HashMap<&'static str, HashMap<EntityId, Record>>;

/// The two nested record snapshots, keyed by entity kind and id.
#[derive(Default)]
pub struct Memo {
    db: RwLock<SnapshotMap>,
    cloud: RwLock<SnapshotMap>,
}

impl Memo {
    fn side(&self, side: Side) -> &RwLock<SnapshotMap> {
        match side {
            Side::Db => &self.db,
            Side::Cloud => &self.cloud,
        }
    }

    /// Store records on one side, merging into already-memoized copies so
    /// later reads and provider write-backs land on the same record.
    pub async fn store(&self, side: Side, records: Vec<Record>) {
        let mut map = self.side(side).write().await;
        for record in records {
            let by_id = map.entry(record.kind()).or_default();
            match by_id.get_mut(record.id()) {
                Some(existing) => existing.merge_from(&record),
                None => {
                    by_id.insert(record.id().clone(), record);
                }
            }
        }
    }

    /// Remove a record from one side (after a delete).
    pub async fn remove(&self, side: Side, record: &Record) {
        let mut map = self.side(side).write().await;
        if let Some(by_id) = map.get_mut(record.kind()) {
            by_id.remove(record.id());
        }
    }

    /// All memoized records of one kind on one side.
    pub async fn records(&self, side: Side, kind: &str) -> Vec<Record> {
        let map = self.side(side).read().await;
        map.get(kind)
            .map(|by_id| {
                let mut records: Vec<Record> = by_id.values().cloned().collect();
                records.sort_by(|a, b| a.id().cmp(b.id()));
                records
            })
            .unwrap_or_default()
    }

    /// One memoized record by kind and id.
    pub async fn get(&self, side: Side, kind: &str, id: &EntityId) -> Option<Record> {
        let map = self.side(side).read().await;
        map.get(kind).and_then(|by_id| by_id.get(id)).cloned()
    }

    /// Drop everything memoized on one side.
    pub async fn flush(&self, side: Side) {
        self.side(side).write().await.clear();
    }

    /// Clone the full snapshot of one side, in deterministic kind order.
    pub async fn snapshot(&self, side: Side) -> BTreeMap<String, Vec<Record>> {
        let map = self.side(side).read().await;
        map.iter()
            .map(|(kind, by_id)| {
                let mut records: Vec<Record> = by_id.values().cloned().collect();
                records.sort_by(|a, b| a.id().cmp(b.id()));
                ((*kind).to_string(), records)
            })
            .collect()
    }
}

/// Per-operation handle passed to every mapper call.
pub struct Context {
    database_id: DatabaseId,
    pool: PgPool,
    clients: Arc<ClientPool>,
    regions: RegionSet,
    memo: Memo,
}

impl Context {
    /// Build a fresh context for one operation.
    pub fn new(
        database_id: DatabaseId,
        pool: PgPool,
        clients: Arc<ClientPool>,
        regions: RegionSet,
    ) -> Self {
        Self {
            database_id,
            pool,
            clients,
            regions,
            memo: Memo::default(),
        }
    }

    /// The target database this operation runs against.
    #[must_use]
    pub fn database_id(&self) -> DatabaseId {
        self.database_id
    }

    /// The relational store handle.
    #[must_use]
    pub fn db_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Obtain the provider client for a region.
    ///
    /// The region must be enabled for the account.
    pub async fn client(&self, region: &Region) -> ModuleResult<Arc<dyn CloudClient>> {
        if !self.regions.is_enabled(region) {
            return Err(CloudError::RegionNotEnabled {
                region: region.clone(),
            }
            .into());
        }
        Ok(self.clients.client(region).await?)
    }

    /// The enabled-region set.
    #[must_use]
    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// The account default region.
    #[must_use]
    pub fn default_region(&self) -> &Region {
        self.regions.default_region()
    }

    /// The memoized snapshots for this operation.
    #[must_use]
    pub fn memo(&self) -> &Memo {
        &self.memo
    }
}
