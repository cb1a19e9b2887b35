//! Entity identity
//!
//! An entity is one row of desired/observed state for one resource kind.
//! Its identity is a single column or a `(column, region)` pair; composite
//! identities are encoded as one opaque string with `|`-joined parts so the
//! memo maps, the diff and the plan report all key on a single value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ModuleError, ModuleResult};

/// Ordered column-name to value mapping for a decomposed entity id.
pub type IdFields = BTreeMap<String, String>;

/// Opaque entity identity within one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    /// Create an id from its already-encoded form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose an id from its key parts, in declared column order.
    #[must_use]
    pub fn from_parts(parts: &[&str]) -> Self {
        Self(parts.join("|"))
    }

    /// The encoded id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into its key parts.
    #[must_use]
    pub fn parts(&self) -> Vec<&str> {
        self.0.split('|').collect()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One row of desired/observed state for one resource kind.
///
/// `KIND` doubles as the table name of the backing store. `ID_COLUMNS`
/// declares the key shape: a single column, or a `(column, region)` pair
/// for region-scoped kinds. Rows of region-scoped kinds default their
/// region to the account default when none is set.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The resource kind, also the backing table name (snake_case).
    const KIND: &'static str;

    /// The declared key columns, in id-encoding order.
    const ID_COLUMNS: &'static [&'static str];

    /// The identity of this row per the declared key shape.
    fn entity_id(&self) -> EntityId;
}

/// Decompose an encoded id into its per-column fields.
pub fn id_fields(columns: &[&str], id: &EntityId) -> IdFields {
    let parts = id.parts();
    columns
        .iter()
        .zip(parts)
        .map(|(col, val)| ((*col).to_string(), val.to_string()))
        .collect()
}

/// Compose an encoded id from per-column fields.
///
/// Every declared column must be present, and nothing else.
pub fn generate_id(columns: &[&str], fields: &IdFields) -> ModuleResult<EntityId> {
    if fields.len() != columns.len() || !columns.iter().all(|c| fields.contains_key(*c)) {
        return Err(ModuleError::IdGeneration {
            expected: columns.join(", "),
            received: fields.keys().cloned().collect::<Vec<_>>().join(", "),
        });
    }
    let parts: Vec<&str> = columns.iter().map(|c| fields[*c].as_str()).collect();
    Ok(EntityId::from_parts(&parts))
}
