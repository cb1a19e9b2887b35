//! Three-way record diff
//!
//! Compares the two memoized sides of one entity kind: records only in the
//! db, records only in the cloud, and records present on both sides that a
//! mapper's semantic equality rejects.

use std::collections::BTreeMap;

use crate::record::Record;

/// A record present on both sides with divergent content.
#[derive(Debug, Clone)]
pub struct ChangedPair {
    /// The db-side copy.
    pub db: Record,
    /// The cloud-side copy.
    pub cloud: Record,
}

/// Outcome of diffing one entity kind.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    /// Records present only in the db.
    pub db_only: Vec<Record>,
    /// Records present only in the cloud.
    pub cloud_only: Vec<Record>,
    /// Records present on both sides but not semantically equal.
    pub changed: Vec<ChangedPair>,
}

impl Diff {
    /// True when the two sides agree completely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db_only.is_empty() && self.cloud_only.is_empty() && self.changed.is_empty()
    }
}

/// Diff two record sets keyed by entity id.
///
/// Output ordering is deterministic (ascending id).
pub fn find_diff(
    db: &[Record],
    cloud: &[Record],
    equals: impl Fn(&Record, &Record) -> bool,
) -> Diff {
    let cloud_by_id: BTreeMap<_, _> = cloud.iter().map(|r| (r.id().clone(), r)).collect();
    let db_by_id: BTreeMap<_, _> = db.iter().map(|r| (r.id().clone(), r)).collect();

    let mut diff = Diff::default();
    for (id, db_record) in &db_by_id {
        match cloud_by_id.get(id) {
            None => diff.db_only.push((*db_record).clone()),
            Some(cloud_record) => {
                if !equals(db_record, cloud_record) {
                    diff.changed.push(ChangedPair {
                        db: (*db_record).clone(),
                        cloud: (*cloud_record).clone(),
                    });
                }
            }
        }
    }
    for (id, cloud_record) in &cloud_by_id {
        if !db_by_id.contains_key(id) {
            diff.cloud_only.push((*cloud_record).clone());
        }
    }
    diff
}
