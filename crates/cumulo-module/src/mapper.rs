//! Mapper contracts
//!
//! A mapper owns one entity kind and exposes both sides of its lifecycle:
//! the `db_*` operations against the relational store and the `cloud_*`
//! operations against the provider API, plus the semantic equality and
//! update-vs-replace decisions the reconciliation diff consumes.
//!
//! Resource mappers implement the typed [`EntityMapper`] contract. The
//! engine only sees the object-safe [`Mapper`] form, obtained by wrapping a
//! typed mapper in [`TypedMapper`], which serializes entities into
//! [`Record`]s at the seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::context::Context;
use crate::entity::{Entity, EntityId};
use crate::error::ModuleResult;
use crate::record::Record;

/// Decision for a record present on both sides but not semantically equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOrReplace {
    /// The divergent fields can be applied with an in-place update call.
    Update,
    /// The divergence touches an immutable field; delete then recreate.
    Replace,
}

impl fmt::Display for UpdateOrReplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOrReplace::Update => write!(f, "update"),
            UpdateOrReplace::Replace => write!(f, "replace"),
        }
    }
}

/// Which side a mapper treats as authoritative during an apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOfTruth {
    /// The database row is desired state; apply pushes it to the cloud.
    Db,
    /// The cloud record is authoritative; apply leaves it alone.
    Cloud,
}

impl fmt::Display for SourceOfTruth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOfTruth::Db => write!(f, "db"),
            SourceOfTruth::Cloud => write!(f, "cloud"),
        }
    }
}

/// The typed bidirectional CRUD + diff contract for one entity kind.
///
/// The `db_*` operations talk only to the relational store and must never
/// call the provider; the `cloud_*` operations talk only to the provider.
///
/// `cloud_read` with no id enumerates every instance across every enabled
/// region. Raw provider records that cannot be mapped (a dependent lookup
/// failed, a partial response) are dropped, not raised, so one bad record
/// never aborts the read of all others.
///
/// `cloud_create` and `cloud_update` return the entities with
/// provider-assigned fields (ids, ARNs, timestamps) filled in, and persist
/// those fields to the db side before returning, so the two sides never
/// observe a provider-assigned identity mismatch.
#[async_trait]
pub trait EntityMapper: Send + Sync + 'static {
    type Entity: Entity;

    /// Which side is authoritative for this kind during apply.
    fn source(&self) -> SourceOfTruth {
        SourceOfTruth::Db
    }

    /// Read rows from the relational store; all of them when `id` is None.
    async fn db_read(
        &self,
        ctx: &Context,
        id: Option<&EntityId>,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Insert rows into the relational store.
    async fn db_create(
        &self,
        entities: Vec<Self::Entity>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Update rows in the relational store.
    async fn db_update(
        &self,
        entities: Vec<Self::Entity>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Delete rows from the relational store.
    async fn db_delete(&self, entities: Vec<Self::Entity>, ctx: &Context) -> ModuleResult<()>;

    /// Read records from the provider; every enabled region when `id` is None.
    async fn cloud_read(
        &self,
        ctx: &Context,
        id: Option<&EntityId>,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Create records in the provider account.
    async fn cloud_create(
        &self,
        entities: Vec<Self::Entity>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Update records in the provider account.
    async fn cloud_update(
        &self,
        entities: Vec<Self::Entity>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Self::Entity>>;

    /// Delete records from the provider account.
    async fn cloud_delete(&self, entities: Vec<Self::Entity>, ctx: &Context) -> ModuleResult<()>;

    /// Semantic equality between the two sides.
    ///
    /// Must tolerate representational differences that do not indicate
    /// drift; see [`crate::compare::json_eq_normalized`] for the common
    /// list-of-one normalizations.
    fn equals(&self, a: &Self::Entity, b: &Self::Entity) -> bool;

    /// Decide how to reconcile a divergent pair. Pure; no side effects.
    fn update_or_replace(
        &self,
        _old: &Self::Entity,
        _new: &Self::Entity,
    ) -> UpdateOrReplace {
        UpdateOrReplace::Update
    }

    /// Records exempt from drift deletion (default/non-owned resources).
    fn protected(&self, _entity: &Self::Entity) -> bool {
        false
    }
}

/// The erased, object-safe mapper form the engine walks.
#[async_trait]
pub trait Mapper: Send + Sync {
    /// The entity kind, doubling as the backing table name.
    fn entity_kind(&self) -> &'static str;

    /// The declared key columns of the entity kind.
    fn id_columns(&self) -> &'static [&'static str];

    /// Which side is authoritative for this kind during apply.
    fn source(&self) -> SourceOfTruth;

    /// Read all rows from the relational store.
    async fn db_read_all(&self, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Insert rows into the relational store.
    async fn db_create(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Update rows in the relational store.
    async fn db_update(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Delete rows from the relational store.
    async fn db_delete(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<()>;

    /// Read all records from the provider, across every enabled region.
    async fn cloud_read_all(&self, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Read one record from the provider.
    async fn cloud_read(&self, ctx: &Context, id: &EntityId) -> ModuleResult<Option<Record>>;

    /// Create records in the provider account.
    async fn cloud_create(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Update records in the provider account.
    async fn cloud_update(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>>;

    /// Delete records from the provider account.
    async fn cloud_delete(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<()>;

    /// Semantic equality between the two sides.
    fn equals(&self, a: &Record, b: &Record) -> bool;

    /// Decide how to reconcile a divergent pair.
    fn update_or_replace(&self, old: &Record, new: &Record) -> UpdateOrReplace;

    /// Records exempt from drift deletion.
    fn protected(&self, record: &Record) -> bool;
}

/// Adapter carrying a typed [`EntityMapper`] across the erased seam.
pub struct TypedMapper<M: EntityMapper> {
    inner: M,
}

impl<M: EntityMapper> TypedMapper<M> {
    /// Wrap a typed mapper.
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    /// Wrap a typed mapper and erase it for module registration.
    pub fn erased(inner: M) -> Arc<dyn Mapper> {
        Arc::new(Self::new(inner))
    }

    fn decode_all(&self, records: Vec<Record>) -> ModuleResult<Vec<M::Entity>> {
        records.iter().map(Record::decode).collect()
    }

    fn encode_all(&self, entities: Vec<M::Entity>) -> ModuleResult<Vec<Record>> {
        entities.iter().map(Record::encode).collect()
    }
}

#[async_trait]
impl<M: EntityMapper> Mapper for TypedMapper<M> {
    fn entity_kind(&self) -> &'static str {
        M::Entity::KIND
    }

    fn id_columns(&self) -> &'static [&'static str] {
        M::Entity::ID_COLUMNS
    }

    fn source(&self) -> SourceOfTruth {
        self.inner.source()
    }

    async fn db_read_all(&self, ctx: &Context) -> ModuleResult<Vec<Record>> {
        let entities = self.inner.db_read(ctx, None).await?;
        self.encode_all(entities)
    }

    async fn db_create(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>> {
        let entities = self.decode_all(records)?;
        let created = self.inner.db_create(entities, ctx).await?;
        self.encode_all(created)
    }

    async fn db_update(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<Vec<Record>> {
        let entities = self.decode_all(records)?;
        let updated = self.inner.db_update(entities, ctx).await?;
        self.encode_all(updated)
    }

    async fn db_delete(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<()> {
        let entities = self.decode_all(records)?;
        self.inner.db_delete(entities, ctx).await
    }

    async fn cloud_read_all(&self, ctx: &Context) -> ModuleResult<Vec<Record>> {
        let entities = self.inner.cloud_read(ctx, None).await?;
        self.encode_all(entities)
    }

    async fn cloud_read(&self, ctx: &Context, id: &EntityId) -> ModuleResult<Option<Record>> {
        let entities = self.inner.cloud_read(ctx, Some(id)).await?;
        Ok(match entities.into_iter().next() {
            Some(entity) => Some(Record::encode(&entity)?),
            None => None,
        })
    }

    async fn cloud_create(
        &self,
        records: Vec<Record>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Record>> {
        let entities = self.decode_all(records)?;
        let created = self.inner.cloud_create(entities, ctx).await?;
        self.encode_all(created)
    }

    async fn cloud_update(
        &self,
        records: Vec<Record>,
        ctx: &Context,
    ) -> ModuleResult<Vec<Record>> {
        let entities = self.decode_all(records)?;
        let updated = self.inner.cloud_update(entities, ctx).await?;
        self.encode_all(updated)
    }

    async fn cloud_delete(&self, records: Vec<Record>, ctx: &Context) -> ModuleResult<()> {
        let entities = self.decode_all(records)?;
        self.inner.cloud_delete(entities, ctx).await
    }

    fn equals(&self, a: &Record, b: &Record) -> bool {
        match (a.decode::<M::Entity>(), b.decode::<M::Entity>()) {
            (Ok(ea), Ok(eb)) => self.inner.equals(&ea, &eb),
            _ => {
                // An undecodable record is drift by definition.
                warn!(kind = M::Entity::KIND, "Undecodable record in equality check");
                false
            }
        }
    }

    fn update_or_replace(&self, old: &Record, new: &Record) -> UpdateOrReplace {
        match (old.decode::<M::Entity>(), new.decode::<M::Entity>()) {
            (Ok(eo), Ok(en)) => self.inner.update_or_replace(&eo, &en),
            // Let the update path surface the decode failure.
            _ => UpdateOrReplace::Update,
        }
    }

    fn protected(&self, record: &Record) -> bool {
        match record.decode::<M::Entity>() {
            Ok(entity) => self.inner.protected(&entity),
            Err(_) => false,
        }
    }
}
