//! Plan reports
//!
//! Every reconciliation pass produces a plan: the create/update/replace/
//! delete rows it decided on, keyed by table. PLAN operations return it
//! without executing; APPLY and SYNC return the plan they executed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cumulo_module::{Diff, Record};

/// The decided action for one plan row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    Replace,
    Delete,
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Update => write!(f, "update"),
            PlanAction::Replace => write!(f, "replace"),
            PlanAction::Delete => write!(f, "delete"),
        }
    }
}

/// One row of a plan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRow {
    pub action: PlanAction,
    pub table_name: String,
    pub id: String,
    pub description: String,
}

/// The versioned plan report returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_version: u32,
    pub rows: Vec<PlanRow>,
}

impl PlanSummary {
    /// True when the pass decided on no work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accumulates plan rows across convergence iterations, deduplicated.
#[derive(Debug, Default)]
pub struct PlanAccumulator {
    rows: BTreeMap<(String, String, String), PlanAction>,
}

impl PlanAccumulator {
    /// Record decided actions for a batch of records.
    ///
    /// The row id is the store-assigned primary key when the payload carries
    /// one; the description is the entity identity.
    pub fn add(&mut self, action: PlanAction, table: &str, records: &[Record]) {
        for record in records {
            let id = match record.payload().get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(v) if !v.is_null() => v.to_string(),
                _ => String::new(),
            };
            let key = (table.to_string(), id, record.id().to_string());
            self.rows.entry(key).or_insert(action);
        }
    }

    /// Render the accumulated rows as the versioned report.
    #[must_use]
    pub fn into_summary(self) -> PlanSummary {
        PlanSummary {
            plan_version: 3,
            rows: self
                .rows
                .into_iter()
                .map(|((table_name, id, description), action)| PlanRow {
                    action,
                    table_name,
                    id,
                    description,
                })
                .collect(),
        }
    }
}

/// Diff sizes for one convergence iteration, compared across iterations to
/// detect stalled passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffCounts {
    pub db_only: usize,
    pub cloud_only: usize,
    pub changed: usize,
}

impl DiffCounts {
    /// Sum the sizes of a set of per-mapper diffs.
    #[must_use]
    pub fn tally(diffs: &[Diff]) -> Self {
        let mut counts = Self::default();
        for diff in diffs {
            counts.db_only += diff.db_only.len();
            counts.cloud_only += diff.cloud_only.len();
            counts.changed += diff.changed.len();
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulo_module::EntityId;
    use serde_json::json;

    fn record(id: &str) -> Record {
        Record::from_parts("bucket", EntityId::new(id), json!({}))
    }

    #[test]
    fn test_accumulator_dedups_across_iterations() {
        let mut acc = PlanAccumulator::default();
        acc.add(PlanAction::Create, "bucket", &[record("a")]);
        acc.add(PlanAction::Create, "bucket", &[record("a")]);
        acc.add(PlanAction::Delete, "bucket", &[record("b")]);

        let summary = acc.into_summary();
        assert_eq!(summary.plan_version, 3);
        assert_eq!(summary.rows.len(), 2);
    }

    #[test]
    fn test_plan_serialization_shape() {
        let mut acc = PlanAccumulator::default();
        acc.add(PlanAction::Replace, "bucket", &[record("r1")]);
        let summary = acc.into_summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rows"][0]["action"], "replace");
        assert_eq!(json["rows"][0]["table_name"], "bucket");
    }

    #[test]
    fn test_diff_counts_equality() {
        let a = DiffCounts {
            db_only: 1,
            cloud_only: 0,
            changed: 2,
        };
        let b = DiffCounts {
            db_only: 1,
            cloud_only: 0,
            changed: 2,
        };
        assert_eq!(a, b);
        assert_ne!(a, DiffCounts::default());
    }
}
