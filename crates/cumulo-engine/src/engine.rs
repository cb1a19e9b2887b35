//! Reconciliation engine
//!
//! Brings the relational store and the provider account into agreement, in
//! either direction. An apply pass treats the db rows as desired state and
//! pushes them to the cloud; a sync pass treats the cloud as authoritative
//! and pulls it into the db.
//!
//! A pass runs two nested convergence loops rather than a single
//! diff-and-execute: provider calls change provider-assigned fields, and
//! records reference records other mappers own, so the engine re-reads the
//! target side and re-diffs until an iteration decides on no work. Failed
//! per-record calls are retried through the loader while each round
//! resolves more of them; an iteration whose diff sizes stop moving four
//! times in a row is halted as making no forward progress.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use cumulo_core::TransactionId;
use cumulo_module::{
    find_diff, Context, Diff, Mapper, ModuleDescriptor, ModuleError, Record, Side, SourceOfTruth,
    UpdateOrReplace,
};

use crate::audit::{AuditChangeKind, AuditEntry, AuditSink};
use crate::loader::{run_with_retries, unit, LoaderError, Unit};
use crate::plan::{DiffCounts, PlanAccumulator, PlanAction, PlanSummary};

/// Which side is authoritative for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Push db rows to the cloud.
    Apply,
    /// Pull cloud records into the db.
    Sync,
}

impl Direction {
    fn authoritative(self) -> Side {
        match self {
            Direction::Apply => Side::Db,
            Direction::Sync => Side::Cloud,
        }
    }

    fn target(self) -> Side {
        match self {
            Direction::Apply => Side::Cloud,
            Direction::Sync => Side::Db,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Direction::Apply => "DB",
            Direction::Sync => "Cloud",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Apply => write!(f, "apply"),
            Direction::Sync => write!(f, "sync"),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive iterations with identical diff sizes before a pass is
    /// declared stalled.
    #[serde(default = "default_max_stalled_iterations")]
    pub max_stalled_iterations: usize,
    /// Actor recorded on audit entries written by the engine.
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_max_stalled_iterations() -> usize {
    4
}

fn default_actor() -> String {
    "cumulo".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_stalled_iterations: default_max_stalled_iterations(),
            actor: default_actor(),
        }
    }
}

/// Errors from a reconciliation pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Framework error (store, provider, serialization).
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Per-record failures that stopped resolving.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// The convergence loop stopped making progress.
    #[error("forward progress halted. All remaining {direction} changes failing to apply")]
    Halted { direction: &'static str },

    /// Audit log failure.
    #[error("audit log error: {0}")]
    Audit(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Read-only export of the two sides, per entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub db: BTreeMap<String, Vec<Value>>,
    pub cloud: BTreeMap<String, Vec<Value>>,
}

/// The reconciliation engine.
pub struct ReconciliationEngine {
    config: EngineConfig,
    audit: Arc<dyn AuditSink>,
}

impl ReconciliationEngine {
    /// Create an engine writing audit entries to the given sink.
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config: EngineConfig::default(),
            audit,
        }
    }

    /// Create with custom configuration.
    pub fn with_config(audit: Arc<dyn AuditSink>, config: EngineConfig) -> Self {
        Self { config, audit }
    }

    /// Get configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Push db state to the cloud, then pull the authoritative result back.
    ///
    /// The trailing sync closes the loop on provider-assigned fields: after
    /// the apply loop converges, the cloud is re-read and written back to
    /// the db side so the store never holds stale identities. All db
    /// mutations are audit-bracketed; an unrecoverable failure reverts the
    /// db side to its pre-operation snapshot and surfaces the error.
    pub async fn apply(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
    ) -> EngineResult<PlanSummary> {
        let tx = TransactionId::new();
        // Every mapper's table can be touched by the trailing sync, so the
        // revert snapshot covers all of them.
        let all_mappers = collect_mappers(modules, Direction::Sync);

        // The pre-operation db snapshot is the revert target.
        load_side(ctx, &all_mappers, Side::Db).await?;
        let snapshot = ctx.memo().snapshot(Side::Db).await;

        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::StartCommit,
            tx,
        ))
        .await?;

        let result = self.apply_then_resync(ctx, modules, tx).await;

        let result = match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.record(
                    AuditEntry::marker(&self.config.actor, AuditChangeKind::Error, tx)
                        .with_message(e.to_string()),
                )
                .await?;
                if let Err(revert_err) = self.revert(ctx, &all_mappers, &snapshot, tx).await {
                    warn!(error = %revert_err, "Revert after failed apply did not complete");
                }
                Err(e)
            }
        };

        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::EndCommit,
            tx,
        ))
        .await?;
        result
    }

    async fn apply_then_resync(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
        tx: TransactionId,
    ) -> EngineResult<PlanSummary> {
        let summary = self
            .converge(ctx, modules, Direction::Apply, false, None)
            .await?;
        self.converge(ctx, modules, Direction::Sync, false, Some(tx))
            .await?;
        Ok(summary)
    }

    /// Pull cloud state into the db, audit-bracketed with revert on failure.
    pub async fn sync(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
    ) -> EngineResult<PlanSummary> {
        let tx = TransactionId::new();
        let mappers = collect_mappers(modules, Direction::Sync);

        load_side(ctx, &mappers, Side::Db).await?;
        let snapshot = ctx.memo().snapshot(Side::Db).await;

        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::StartCommit,
            tx,
        ))
        .await?;

        let result = self
            .converge(ctx, modules, Direction::Sync, false, Some(tx))
            .await;

        let result = match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.record(
                    AuditEntry::marker(&self.config.actor, AuditChangeKind::Error, tx)
                        .with_message(e.to_string()),
                )
                .await?;
                if let Err(revert_err) = self.revert(ctx, &mappers, &snapshot, tx).await {
                    warn!(error = %revert_err, "Revert after failed sync did not complete");
                }
                Err(e)
            }
        };

        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::EndCommit,
            tx,
        ))
        .await?;
        result
    }

    /// Compute the would-be plan for a direction without executing it.
    pub async fn plan(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
        direction: Direction,
    ) -> EngineResult<PlanSummary> {
        self.converge(ctx, modules, direction, true, None).await
    }

    /// Export the current records on both sides.
    pub async fn list(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
    ) -> EngineResult<StateExport> {
        let mappers = collect_mappers(modules, Direction::Sync);
        load_side(ctx, &mappers, Side::Db).await?;
        load_side(ctx, &mappers, Side::Cloud).await?;

        let mut export = StateExport {
            db: BTreeMap::new(),
            cloud: BTreeMap::new(),
        };
        for mapper in &mappers {
            let kind = mapper.entity_kind();
            let db = ctx.memo().records(Side::Db, kind).await;
            let cloud = ctx.memo().records(Side::Cloud, kind).await;
            export
                .db
                .insert(kind.to_string(), db.iter().map(|r| r.payload().clone()).collect());
            export.cloud.insert(
                kind.to_string(),
                cloud.iter().map(|r| r.payload().clone()).collect(),
            );
        }
        Ok(export)
    }

    /// The nested convergence loops shared by every pass.
    ///
    /// The outer loop reloads the authoritative side; the inner loop
    /// reloads the target side, diffs, and executes the decided work until
    /// an iteration decides on nothing.
    async fn converge(
        &self,
        ctx: &Arc<Context>,
        modules: &[Arc<ModuleDescriptor>],
        direction: Direction,
        plan_only: bool,
        tx: Option<TransactionId>,
    ) -> EngineResult<PlanSummary> {
        let mappers = collect_mappers(modules, direction);
        let mut plan = PlanAccumulator::default();
        if mappers.is_empty() {
            return Ok(plan.into_summary());
        }

        let mut prev_counts: Option<DiffCounts> = None;
        let mut stalled = 0;
        let mut prev_failures: Option<usize> = None;

        let mut ran_full_update = true;
        while ran_full_update {
            ran_full_update = false;
            debug!(direction = %direction, "Reloading authoritative records");
            ctx.memo().flush(direction.authoritative()).await;
            load_side(ctx, &mappers, direction.authoritative()).await?;

            let mut ran_update = true;
            while ran_update {
                ran_update = false;
                ctx.memo().flush(direction.target()).await;
                load_side(ctx, &mappers, direction.target()).await?;

                let mut diffs: Vec<Diff> = Vec::with_capacity(mappers.len());
                for mapper in &mappers {
                    let kind = mapper.entity_kind();
                    let db = ctx.memo().records(Side::Db, kind).await;
                    let cloud = ctx.memo().records(Side::Cloud, kind).await;
                    diffs.push(find_diff(&db, &cloud, |a, b| mapper.equals(a, b)));
                }

                self.accumulate_plan(&mut plan, &mappers, &diffs, direction);
                if plan_only {
                    return Ok(plan.into_summary());
                }

                let counts = DiffCounts::tally(&diffs);
                if prev_counts == Some(counts) {
                    stalled += 1;
                } else {
                    prev_counts = Some(counts);
                    stalled = 0;
                }
                if stalled == self.config.max_stalled_iterations {
                    return Err(EngineError::Halted {
                        direction: direction.noun(),
                    });
                }

                let units = self.build_units(ctx, &mappers, &diffs, direction, tx);
                if units.is_empty() {
                    continue;
                }
                ran_update = true;
                ran_full_update = true;
                match run_with_retries(units).await {
                    Ok(()) => {}
                    Err(e) => {
                        // Another full pass may resolve cross-mapper
                        // references; give up once the failure set stops
                        // shrinking between passes.
                        if prev_failures == Some(e.remaining()) {
                            return Err(e.into());
                        }
                        info!(
                            remaining = e.remaining(),
                            "Pass left unresolved records; retrying with fresh snapshots"
                        );
                        prev_failures = Some(e.remaining());
                        ran_update = false;
                    }
                }
            }
        }
        Ok(plan.into_summary())
    }

    fn accumulate_plan(
        &self,
        plan: &mut PlanAccumulator,
        mappers: &[Arc<dyn Mapper>],
        diffs: &[Diff],
        direction: Direction,
    ) {
        for (mapper, diff) in mappers.iter().zip(diffs) {
            let table = mapper.entity_kind();
            match direction {
                Direction::Apply => {
                    plan.add(PlanAction::Create, table, &diff.db_only);
                    let deletable: Vec<Record> = diff
                        .cloud_only
                        .iter()
                        .filter(|r| !mapper.protected(r))
                        .cloned()
                        .collect();
                    plan.add(PlanAction::Delete, table, &deletable);
                    let mut updates = Vec::new();
                    let mut replaces = Vec::new();
                    for pair in &diff.changed {
                        match mapper.update_or_replace(&pair.cloud, &pair.db) {
                            UpdateOrReplace::Update => updates.push(pair.db.clone()),
                            UpdateOrReplace::Replace => replaces.push(pair.db.clone()),
                        }
                    }
                    plan.add(PlanAction::Update, table, &updates);
                    plan.add(PlanAction::Replace, table, &replaces);
                }
                Direction::Sync => {
                    plan.add(PlanAction::Create, table, &diff.cloud_only);
                    plan.add(PlanAction::Delete, table, &diff.db_only);
                    let updates: Vec<Record> =
                        diff.changed.iter().map(|pair| pair.cloud.clone()).collect();
                    plan.add(PlanAction::Update, table, &updates);
                }
            }
        }
    }

    /// Creates and updates run in module dependency order; deletes run in
    /// reverse order so dependents disappear before their dependencies.
    fn build_units(
        &self,
        ctx: &Arc<Context>,
        mappers: &[Arc<dyn Mapper>],
        diffs: &[Diff],
        direction: Direction,
        tx: Option<TransactionId>,
    ) -> Vec<Unit> {
        let mut units: Vec<Unit> = Vec::new();

        for (mapper, diff) in mappers.iter().zip(diffs) {
            match direction {
                Direction::Apply => {
                    for record in &diff.db_only {
                        units.push(self.cloud_create_unit(ctx, mapper, record.clone()));
                    }
                    for pair in &diff.changed {
                        match mapper.update_or_replace(&pair.cloud, &pair.db) {
                            UpdateOrReplace::Update => {
                                units.push(self.cloud_update_unit(ctx, mapper, pair.db.clone()));
                            }
                            UpdateOrReplace::Replace => {
                                units.push(self.cloud_replace_unit(
                                    ctx,
                                    mapper,
                                    pair.cloud.clone(),
                                    pair.db.clone(),
                                ));
                            }
                        }
                    }
                }
                Direction::Sync => {
                    for record in &diff.cloud_only {
                        units.push(self.db_write_unit(
                            ctx,
                            mapper,
                            record.clone(),
                            DbWrite::Create,
                            tx,
                        ));
                    }
                    for pair in &diff.changed {
                        let mut desired = pair.cloud.clone();
                        if let Some(pk) = pair.db.payload().get("id") {
                            desired.set_field("id", pk.clone());
                        }
                        units.push(self.db_write_unit(ctx, mapper, desired, DbWrite::Update, tx));
                    }
                }
            }
        }

        for (mapper, diff) in mappers.iter().zip(diffs).rev() {
            match direction {
                Direction::Apply => {
                    for record in &diff.cloud_only {
                        if mapper.protected(record) {
                            debug!(
                                kind = mapper.entity_kind(),
                                id = %record.id(),
                                "Skipping protected record"
                            );
                            continue;
                        }
                        units.push(self.cloud_delete_unit(ctx, mapper, record.clone()));
                    }
                }
                Direction::Sync => {
                    for record in &diff.db_only {
                        units.push(self.db_write_unit(
                            ctx,
                            mapper,
                            record.clone(),
                            DbWrite::Delete,
                            tx,
                        ));
                    }
                }
            }
        }
        units
    }

    fn cloud_create_unit(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        record: Record,
    ) -> Unit {
        let ctx = ctx.clone();
        let mapper = mapper.clone();
        unit(move || {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            let record = record.clone();
            async move {
                let created = mapper
                    .cloud_create(vec![record], &ctx)
                    .await
                    .map_err(|e| format!("{} cloud create error: {e}", mapper.entity_kind()))?;
                // Provider-assigned fields flow onto the authoritative copy
                // so the next iteration compares the converged record.
                ctx.memo().store(Side::Db, created).await;
                Ok(())
            }
        })
    }

    fn cloud_update_unit(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        record: Record,
    ) -> Unit {
        let ctx = ctx.clone();
        let mapper = mapper.clone();
        unit(move || {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            let record = record.clone();
            async move {
                let updated = mapper
                    .cloud_update(vec![record], &ctx)
                    .await
                    .map_err(|e| format!("{} cloud update error: {e}", mapper.entity_kind()))?;
                ctx.memo().store(Side::Db, updated).await;
                Ok(())
            }
        })
    }

    fn cloud_replace_unit(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        old: Record,
        new: Record,
    ) -> Unit {
        let ctx = ctx.clone();
        let mapper = mapper.clone();
        unit(move || {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            let old = old.clone();
            let new = new.clone();
            async move {
                mapper
                    .cloud_delete(vec![old.clone()], &ctx)
                    .await
                    .map_err(|e| format!("{} cloud delete error: {e}", mapper.entity_kind()))?;
                ctx.memo().remove(Side::Cloud, &old).await;
                let created = mapper
                    .cloud_create(vec![new], &ctx)
                    .await
                    .map_err(|e| format!("{} cloud create error: {e}", mapper.entity_kind()))?;
                ctx.memo().store(Side::Db, created).await;
                Ok(())
            }
        })
    }

    fn cloud_delete_unit(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        record: Record,
    ) -> Unit {
        let ctx = ctx.clone();
        let mapper = mapper.clone();
        unit(move || {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            let record = record.clone();
            async move {
                mapper
                    .cloud_delete(vec![record.clone()], &ctx)
                    .await
                    .map_err(|e| format!("{} cloud delete error: {e}", mapper.entity_kind()))?;
                ctx.memo().remove(Side::Cloud, &record).await;
                Ok(())
            }
        })
    }

    fn db_write_unit(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        record: Record,
        write: DbWrite,
        tx: Option<TransactionId>,
    ) -> Unit {
        let ctx = ctx.clone();
        let mapper = mapper.clone();
        let audit = self.audit.clone();
        let actor = self.config.actor.clone();
        unit(move || {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            let audit = audit.clone();
            let actor = actor.clone();
            let record = record.clone();
            async move {
                let kind = mapper.entity_kind();
                let audited = match write {
                    DbWrite::Create => {
                        let created = mapper
                            .db_create(vec![record], &ctx)
                            .await
                            .map_err(|e| format!("{kind} db create error: {e}"))?;
                        ctx.memo().store(Side::Cloud, created.clone()).await;
                        (AuditChangeKind::Insert, created)
                    }
                    DbWrite::Update => {
                        let updated = mapper
                            .db_update(vec![record], &ctx)
                            .await
                            .map_err(|e| format!("{kind} db update error: {e}"))?;
                        ctx.memo().store(Side::Cloud, updated.clone()).await;
                        (AuditChangeKind::Update, updated)
                    }
                    DbWrite::Delete => {
                        mapper
                            .db_delete(vec![record.clone()], &ctx)
                            .await
                            .map_err(|e| format!("{kind} db delete error: {e}"))?;
                        ctx.memo().remove(Side::Db, &record).await;
                        (AuditChangeKind::Delete, vec![record])
                    }
                };
                if let Some(tx) = tx {
                    let (change_kind, records) = audited;
                    for changed in records {
                        audit
                            .record(AuditEntry::mutation(
                                &actor,
                                kind,
                                change_kind,
                                changed.payload().clone(),
                                tx,
                            ))
                            .await
                            .map_err(|e| format!("{kind} audit error: {e}"))?;
                    }
                }
                Ok(())
            }
        })
    }

    /// Restore the db side to a pre-operation snapshot, bracketed by
    /// START_REVERT/END_REVERT entries.
    async fn revert(
        &self,
        ctx: &Arc<Context>,
        mappers: &[Arc<dyn Mapper>],
        snapshot: &BTreeMap<String, Vec<Record>>,
        tx: TransactionId,
    ) -> EngineResult<()> {
        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::StartRevert,
            tx,
        ))
        .await?;

        let mut result = Ok(());
        for mapper in mappers.iter().rev() {
            if let Err(e) = self.revert_mapper(ctx, mapper, snapshot, tx).await {
                warn!(
                    kind = mapper.entity_kind(),
                    error = %e,
                    "Could not restore records during revert"
                );
                result = Err(e);
            }
        }

        self.record(AuditEntry::marker(
            &self.config.actor,
            AuditChangeKind::EndRevert,
            tx,
        ))
        .await?;
        result
    }

    async fn revert_mapper(
        &self,
        ctx: &Arc<Context>,
        mapper: &Arc<dyn Mapper>,
        snapshot: &BTreeMap<String, Vec<Record>>,
        tx: TransactionId,
    ) -> EngineResult<()> {
        let kind = mapper.entity_kind();
        let empty = Vec::new();
        let desired = snapshot.get(kind).unwrap_or(&empty);
        let current = mapper.db_read_all(ctx).await?;
        let diff = find_diff(desired, &current, |a, b| mapper.equals(a, b));

        for record in &diff.cloud_only {
            mapper.db_delete(vec![record.clone()], ctx).await?;
            self.record_mutation(kind, AuditChangeKind::Delete, record, tx)
                .await?;
        }
        for pair in &diff.changed {
            mapper.db_update(vec![pair.db.clone()], ctx).await?;
            self.record_mutation(kind, AuditChangeKind::Update, &pair.db, tx)
                .await?;
        }
        for record in &diff.db_only {
            mapper.db_create(vec![record.clone()], ctx).await?;
            self.record_mutation(kind, AuditChangeKind::Insert, record, tx)
                .await?;
        }
        Ok(())
    }

    async fn record_mutation(
        &self,
        table: &str,
        change_kind: AuditChangeKind,
        record: &Record,
        tx: TransactionId,
    ) -> EngineResult<()> {
        self.record(AuditEntry::mutation(
            &self.config.actor,
            table,
            change_kind,
            record.payload().clone(),
            tx,
        ))
        .await
    }

    async fn record(&self, entry: AuditEntry) -> EngineResult<()> {
        self.audit
            .record(entry)
            .await
            .map_err(|e| EngineError::Audit(e.to_string()))
    }
}

/// The mapper walk order for a pass: module dependency order, and for
/// apply, only mappers whose source of truth is the db.
fn collect_mappers(
    modules: &[Arc<ModuleDescriptor>],
    direction: Direction,
) -> Vec<Arc<dyn Mapper>> {
    modules
        .iter()
        .flat_map(|module| module.mappers().iter().cloned())
        .filter(|mapper| match direction {
            Direction::Apply => mapper.source() == SourceOfTruth::Db,
            Direction::Sync => true,
        })
        .collect()
}

/// Load one side of the memo for every mapper, concurrently.
async fn load_side(
    ctx: &Arc<Context>,
    mappers: &[Arc<dyn Mapper>],
    side: Side,
) -> EngineResult<()> {
    let units: Vec<Unit> = mappers
        .iter()
        .map(|mapper| {
            let ctx = ctx.clone();
            let mapper = mapper.clone();
            unit(move || {
                let ctx = ctx.clone();
                let mapper = mapper.clone();
                async move {
                    let records = match side {
                        Side::Db => mapper
                            .db_read_all(&ctx)
                            .await
                            .map_err(|e| format!("{} db read error: {e}", mapper.entity_kind()))?,
                        Side::Cloud => mapper.cloud_read_all(&ctx).await.map_err(|e| {
                            format!("{} cloud read error: {e}", mapper.entity_kind())
                        })?,
                    };
                    ctx.memo().store(side, records).await;
                    Ok(())
                }
            })
        })
        .collect();
    run_with_retries(units).await?;
    Ok(())
}

#[derive(Clone, Copy)]
enum DbWrite {
    Create,
    Update,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.max_stalled_iterations, 4);
        assert_eq!(config.actor, "cumulo");
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Apply.authoritative(), Side::Db);
        assert_eq!(Direction::Apply.target(), Side::Cloud);
        assert_eq!(Direction::Sync.authoritative(), Side::Cloud);
        assert_eq!(Direction::Sync.target(), Side::Db);
    }
}
