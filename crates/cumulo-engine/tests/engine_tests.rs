//! Reconciliation engine tests
//!
//! Exercises the convergence passes against an in-memory mapper:
//! - Idempotence: a converged state performs zero provider calls
//! - Create with provider-assigned field merge-back
//! - Update-vs-replace decisions on immutable fields
//! - Drift removal in both directions, with protected records exempt
//! - Per-record failure isolation and aggregation
//! - Audit bracketing and revert markers
//! - Stalled-pass detection

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;

use cumulo_cloud::{ClientPool, CloudClient, CloudClientFactory, CloudError, CloudResult, Region, RegionSet};
use cumulo_core::DatabaseId;
use cumulo_engine::audit::{AuditChangeKind, AuditEntry, AuditError, AuditSink};
use cumulo_engine::engine::{Direction, EngineError, ReconciliationEngine};
use cumulo_engine::plan::PlanAction;
use cumulo_module::{
    Context, EntityId, Mapper, ModuleDescriptor, ModuleError, ModuleResult, Record, SourceOfTruth,
    UpdateOrReplace,
};

// =============================================================================
// In-memory collaborators
// =============================================================================

struct NullFactory;

#[async_trait]
impl CloudClientFactory for NullFactory {
    async fn open(&self, _region: &Region) -> CloudResult<Arc<dyn CloudClient>> {
        Err(CloudError::unavailable("no provider in tests"))
    }
}

#[derive(Default)]
struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    fn kinds(&self) -> Vec<AuditChangeKind> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.change_kind)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

type Store = Arc<Mutex<BTreeMap<EntityId, Record>>>;

const KIND: &str = "volume";

fn record(id: &str, payload: Value) -> Record {
    Record::from_parts(KIND, EntityId::new(id), payload)
}

fn strip_pk(payload: &Value) -> Value {
    let mut stripped = payload.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove("id");
    }
    stripped
}

fn seed(store: &Store, records: Vec<Record>) {
    let mut map = store.lock().unwrap();
    for r in records {
        map.insert(r.id().clone(), r);
    }
}

/// Mapper over two in-memory stores, with provider-assigned `arn` fields,
/// an immutable `az` attribute and configurable failures.
struct VolumeMapper {
    db: Store,
    cloud: Store,
    cloud_mutations: AtomicUsize,
    cloud_creates: AtomicUsize,
    cloud_updates: AtomicUsize,
    cloud_deletes: AtomicUsize,
    fail_create_ids: Mutex<HashSet<String>>,
    protected_ids: Mutex<HashSet<String>>,
    never_equal: AtomicBool,
}

impl VolumeMapper {
    fn new(db: Store, cloud: Store) -> Self {
        Self {
            db,
            cloud,
            cloud_mutations: AtomicUsize::new(0),
            cloud_creates: AtomicUsize::new(0),
            cloud_updates: AtomicUsize::new(0),
            cloud_deletes: AtomicUsize::new(0),
            fail_create_ids: Mutex::new(HashSet::new()),
            protected_ids: Mutex::new(HashSet::new()),
            never_equal: AtomicBool::new(false),
        }
    }

    fn fail_create(&self, id: &str) {
        self.fail_create_ids.lock().unwrap().insert(id.to_string());
    }

    fn protect(&self, id: &str) {
        self.protected_ids.lock().unwrap().insert(id.to_string());
    }

    fn enrich(record: &Record) -> Record {
        let mut enriched = record.clone();
        enriched.set_field("arn", json!(format!("arn:mock:{}", record.id())));
        enriched
    }
}

#[async_trait]
impl Mapper for VolumeMapper {
    fn entity_kind(&self) -> &'static str {
        KIND
    }

    fn id_columns(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn source(&self) -> SourceOfTruth {
        SourceOfTruth::Db
    }

    async fn db_read_all(&self, _ctx: &Context) -> ModuleResult<Vec<Record>> {
        Ok(self.db.lock().unwrap().values().cloned().collect())
    }

    async fn db_create(&self, records: Vec<Record>, _ctx: &Context) -> ModuleResult<Vec<Record>> {
        let mut map = self.db.lock().unwrap();
        for r in &records {
            map.insert(r.id().clone(), r.clone());
        }
        Ok(records)
    }

    async fn db_update(&self, records: Vec<Record>, _ctx: &Context) -> ModuleResult<Vec<Record>> {
        let mut map = self.db.lock().unwrap();
        for r in &records {
            map.insert(r.id().clone(), r.clone());
        }
        Ok(records)
    }

    async fn db_delete(&self, records: Vec<Record>, _ctx: &Context) -> ModuleResult<()> {
        let mut map = self.db.lock().unwrap();
        for r in &records {
            map.remove(r.id());
        }
        Ok(())
    }

    async fn cloud_read_all(&self, _ctx: &Context) -> ModuleResult<Vec<Record>> {
        Ok(self.cloud.lock().unwrap().values().cloned().collect())
    }

    async fn cloud_read(&self, _ctx: &Context, id: &EntityId) -> ModuleResult<Option<Record>> {
        Ok(self.cloud.lock().unwrap().get(id).cloned())
    }

    async fn cloud_create(
        &self,
        records: Vec<Record>,
        _ctx: &Context,
    ) -> ModuleResult<Vec<Record>> {
        for r in &records {
            if self.fail_create_ids.lock().unwrap().contains(r.id().as_str()) {
                return Err(ModuleError::Cloud(CloudError::unavailable(format!(
                    "create rejected for {}",
                    r.id()
                ))));
            }
        }
        self.cloud_mutations.fetch_add(1, Ordering::SeqCst);
        self.cloud_creates.fetch_add(1, Ordering::SeqCst);
        let enriched: Vec<Record> = records.iter().map(Self::enrich).collect();
        // Provider-assigned fields are persisted db-side before returning.
        {
            let mut cloud = self.cloud.lock().unwrap();
            let mut db = self.db.lock().unwrap();
            for r in &enriched {
                cloud.insert(r.id().clone(), r.clone());
                if let Some(existing) = db.get_mut(r.id()) {
                    existing.merge_from(r);
                }
            }
        }
        Ok(enriched)
    }

    async fn cloud_update(
        &self,
        records: Vec<Record>,
        _ctx: &Context,
    ) -> ModuleResult<Vec<Record>> {
        self.cloud_mutations.fetch_add(1, Ordering::SeqCst);
        self.cloud_updates.fetch_add(1, Ordering::SeqCst);
        if self.never_equal.load(Ordering::SeqCst) {
            // Emulate a provider that acknowledges but never converges.
            return Ok(records);
        }
        let enriched: Vec<Record> = records.iter().map(Self::enrich).collect();
        {
            let mut cloud = self.cloud.lock().unwrap();
            let mut db = self.db.lock().unwrap();
            for r in &enriched {
                cloud.insert(r.id().clone(), r.clone());
                if let Some(existing) = db.get_mut(r.id()) {
                    existing.merge_from(r);
                }
            }
        }
        Ok(enriched)
    }

    async fn cloud_delete(&self, records: Vec<Record>, _ctx: &Context) -> ModuleResult<()> {
        self.cloud_mutations.fetch_add(1, Ordering::SeqCst);
        self.cloud_deletes.fetch_add(1, Ordering::SeqCst);
        let mut cloud = self.cloud.lock().unwrap();
        for r in &records {
            cloud.remove(r.id());
        }
        Ok(())
    }

    fn equals(&self, a: &Record, b: &Record) -> bool {
        if self.never_equal.load(Ordering::SeqCst) {
            return false;
        }
        // The store-assigned primary key is not semantic state.
        strip_pk(a.payload()) == strip_pk(b.payload())
    }

    fn update_or_replace(&self, old: &Record, new: &Record) -> UpdateOrReplace {
        if old.payload().get("az") != new.payload().get("az") {
            UpdateOrReplace::Replace
        } else {
            UpdateOrReplace::Update
        }
    }

    fn protected(&self, record: &Record) -> bool {
        self.protected_ids
            .lock()
            .unwrap()
            .contains(record.id().as_str())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    ctx: Arc<Context>,
    engine: ReconciliationEngine,
    audit: Arc<MemoryAuditSink>,
    mapper: Arc<VolumeMapper>,
    modules: Vec<Arc<ModuleDescriptor>>,
    db: Store,
    cloud: Store,
}

fn harness() -> Harness {
    let db: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let cloud: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let mapper = Arc::new(VolumeMapper::new(db.clone(), cloud.clone()));

    let module = Arc::new(
        ModuleDescriptor::new("block_storage", "0.4.0")
            .with_table(KIND)
            .with_mapper(mapper.clone() as Arc<dyn Mapper>),
    );

    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://cumulo@localhost/cumulo_test")
        .unwrap();
    let ctx = Arc::new(Context::new(
        DatabaseId::new(),
        pool,
        Arc::new(ClientPool::new(Arc::new(NullFactory))),
        RegionSet::single("us-east-1"),
    ));

    let audit = Arc::new(MemoryAuditSink::default());
    let engine = ReconciliationEngine::new(audit.clone() as Arc<dyn AuditSink>);

    Harness {
        ctx,
        engine,
        audit,
        mapper,
        modules: vec![module],
        db,
        cloud,
    }
}

fn cloud_payload(h: &Harness, id: &str) -> Option<Value> {
    h.cloud
        .lock()
        .unwrap()
        .get(&EntityId::new(id))
        .map(|r| r.payload().clone())
}

fn db_payload(h: &Harness, id: &str) -> Option<Value> {
    h.db
        .lock()
        .unwrap()
        .get(&EntityId::new(id))
        .map(|r| r.payload().clone())
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_idempotent_apply_makes_no_cloud_calls() {
    let h = harness();
    let converged = record("v1", json!({"name": "v1", "size": 10, "arn": "arn:mock:v1"}));
    seed(&h.db, vec![converged.clone()]);
    seed(&h.cloud, vec![converged]);

    let summary = h.engine.apply(&h.ctx, &h.modules).await.unwrap();
    assert!(summary.is_empty());
    assert_eq!(h.mapper.cloud_mutations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_apply_creates_missing_record_and_merges_provider_fields() {
    let h = harness();
    seed(&h.db, vec![record("r1", json!({"name": "r1", "size": 10}))]);

    let summary = h.engine.apply(&h.ctx, &h.modules).await.unwrap();

    let row = summary
        .rows
        .iter()
        .find(|r| r.description == "r1")
        .expect("plan row for r1");
    assert_eq!(row.action, PlanAction::Create);

    let cloud = cloud_payload(&h, "r1").expect("record created in cloud");
    assert_eq!(cloud["size"], 10);
    assert_eq!(cloud["arn"], "arn:mock:r1");
    // The provider-assigned field landed on the db side too.
    assert_eq!(db_payload(&h, "r1").unwrap()["arn"], "arn:mock:r1");
}

#[tokio::test]
async fn test_immutable_field_change_replaces_instead_of_updating() {
    let h = harness();
    seed(
        &h.db,
        vec![record(
            "v1",
            json!({"name": "v1", "az": "us-east-1b", "arn": "arn:mock:v1"}),
        )],
    );
    seed(
        &h.cloud,
        vec![record(
            "v1",
            json!({"name": "v1", "az": "us-east-1a", "arn": "arn:mock:v1"}),
        )],
    );

    let summary = h.engine.apply(&h.ctx, &h.modules).await.unwrap();

    let row = summary
        .rows
        .iter()
        .find(|r| r.description == "v1")
        .expect("plan row for v1");
    assert_eq!(row.action, PlanAction::Replace);
    assert_eq!(h.mapper.cloud_updates.load(Ordering::SeqCst), 0);
    assert!(h.mapper.cloud_deletes.load(Ordering::SeqCst) >= 1);
    assert!(h.mapper.cloud_creates.load(Ordering::SeqCst) >= 1);
    assert_eq!(cloud_payload(&h, "v1").unwrap()["az"], "us-east-1b");
}

#[tokio::test]
async fn test_apply_removes_unprotected_drift_only() {
    let h = harness();
    seed(
        &h.cloud,
        vec![
            record("stray", json!({"name": "stray"})),
            record("default", json!({"name": "default"})),
        ],
    );
    h.mapper.protect("default");

    let summary = h.engine.apply(&h.ctx, &h.modules).await.unwrap();

    assert!(cloud_payload(&h, "stray").is_none());
    assert!(cloud_payload(&h, "default").is_some());
    assert!(summary
        .rows
        .iter()
        .all(|r| r.description != "default"));
    let stray = summary
        .rows
        .iter()
        .find(|r| r.description == "stray")
        .unwrap();
    assert_eq!(stray.action, PlanAction::Delete);
}

#[tokio::test]
async fn test_sync_pulls_drift_into_db() {
    let h = harness();
    seed(
        &h.cloud,
        vec![record("x", json!({"name": "x", "arn": "arn:mock:x"}))],
    );

    h.engine.sync(&h.ctx, &h.modules).await.unwrap();

    assert_eq!(db_payload(&h, "x").unwrap()["arn"], "arn:mock:x");
    // The pull was audited as an insert inside the commit bracket.
    let kinds = h.audit.kinds();
    let start = kinds
        .iter()
        .position(|k| *k == AuditChangeKind::StartCommit)
        .unwrap();
    let insert = kinds
        .iter()
        .position(|k| *k == AuditChangeKind::Insert)
        .expect("insert audit entry");
    let end = kinds
        .iter()
        .rposition(|k| *k == AuditChangeKind::EndCommit)
        .unwrap();
    assert!(start < insert && insert < end);
}

#[tokio::test]
async fn test_sync_update_carries_store_primary_key() {
    let h = harness();
    seed(
        &h.db,
        vec![record("v1", json!({"id": 7, "name": "v1", "size": 10}))],
    );
    seed(&h.cloud, vec![record("v1", json!({"name": "v1", "size": 20}))]);

    h.engine.sync(&h.ctx, &h.modules).await.unwrap();

    let updated = db_payload(&h, "v1").unwrap();
    assert_eq!(updated["size"], 20);
    assert_eq!(updated["id"], 7);
}

#[tokio::test]
async fn test_one_failing_record_does_not_block_others() {
    let h = harness();
    seed(
        &h.db,
        vec![
            record("good", json!({"name": "good"})),
            record("bad", json!({"name": "bad"})),
        ],
    );
    h.mapper.fail_create("bad");

    let err = h.engine.apply(&h.ctx, &h.modules).await.unwrap_err();

    // The healthy record still made it to the cloud.
    assert!(cloud_payload(&h, "good").is_some());
    assert!(cloud_payload(&h, "bad").is_none());
    // The failure surfaces as one aggregated message naming the record.
    let message = err.to_string();
    assert!(message.contains("bad"), "unexpected message: {message}");
    assert!(!message.contains("good cloud create"), "unexpected message: {message}");

    // Failure bracketing: ERROR then a revert bracket, all inside the commit.
    let kinds = h.audit.kinds();
    assert_eq!(kinds.first(), Some(&AuditChangeKind::StartCommit));
    assert_eq!(kinds.last(), Some(&AuditChangeKind::EndCommit));
    assert!(kinds.contains(&AuditChangeKind::Error));
    let revert_start = kinds
        .iter()
        .position(|k| *k == AuditChangeKind::StartRevert)
        .expect("revert started");
    let revert_end = kinds
        .iter()
        .position(|k| *k == AuditChangeKind::EndRevert)
        .expect("revert ended");
    assert!(revert_start < revert_end);
}

#[tokio::test]
async fn test_plan_reports_without_executing() {
    let h = harness();
    seed(&h.db, vec![record("r1", json!({"name": "r1", "size": 10}))]);

    let summary = h
        .engine
        .plan(&h.ctx, &h.modules, Direction::Apply)
        .await
        .unwrap();

    assert_eq!(summary.rows.len(), 1);
    assert_eq!(summary.rows[0].action, PlanAction::Create);
    assert_eq!(summary.plan_version, 3);
    assert_eq!(h.mapper.cloud_mutations.load(Ordering::SeqCst), 0);
    assert!(cloud_payload(&h, "r1").is_none());
}

#[tokio::test]
async fn test_list_exports_both_sides() {
    let h = harness();
    seed(&h.db, vec![record("a", json!({"name": "a"}))]);
    seed(&h.cloud, vec![record("b", json!({"name": "b"}))]);

    let export = h.engine.list(&h.ctx, &h.modules).await.unwrap();

    assert_eq!(export.db[KIND].len(), 1);
    assert_eq!(export.cloud[KIND].len(), 1);
    assert_eq!(export.db[KIND][0]["name"], "a");
    assert_eq!(export.cloud[KIND][0]["name"], "b");
    assert_eq!(h.mapper.cloud_mutations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stalled_pass_halts() {
    let h = harness();
    seed(&h.db, vec![record("v1", json!({"name": "v1"}))]);
    seed(&h.cloud, vec![record("v1", json!({"name": "v1"}))]);
    h.mapper.never_equal.store(true, Ordering::SeqCst);

    let err = h.engine.apply(&h.ctx, &h.modules).await.unwrap_err();
    match err {
        EngineError::Halted { .. } => {}
        other => panic!("expected halt, got: {other}"),
    }
}
