//! Erased entity records
//!
//! The engine and the memo maps do not know concrete entity types; they
//! hold `Record`s, the serialized form of an entity tagged with its kind
//! and identity. Typed mappers encode/decode at this seam.

use serde_json::Value;

use crate::entity::{Entity, EntityId};
use crate::error::{ModuleError, ModuleResult};

/// The erased form of one entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: &'static str,
    id: EntityId,
    payload: Value,
}

impl Record {
    /// Erase a typed entity.
    pub fn encode<E: Entity>(entity: &E) -> ModuleResult<Self> {
        Ok(Self {
            kind: E::KIND,
            id: entity.entity_id(),
            payload: serde_json::to_value(entity)?,
        })
    }

    /// Build a record from raw parts. Intended for tests and store glue.
    pub fn from_parts(kind: &'static str, id: EntityId, payload: Value) -> Self {
        Self { kind, id, payload }
    }

    /// Recover the typed entity.
    pub fn decode<E: Entity>(&self) -> ModuleResult<E> {
        if self.kind != E::KIND {
            return Err(ModuleError::invalid_record(
                E::KIND,
                format!("record holds kind {}", self.kind),
            ));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The entity identity.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// The serialized entity payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Set one field on an object payload.
    ///
    /// Used to carry a store-assigned primary key onto the authoritative
    /// copy before writing it back. No effect on non-object payloads.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.payload {
            map.insert(key.into(), value);
        }
    }

    /// Merge another record's fields into this one.
    ///
    /// Used when a later read or a provider response returns an updated copy
    /// of an already-memoized record: object payloads merge key-wise so
    /// provider-assigned fields land on the stored copy, other payload
    /// shapes are replaced wholesale. The identity follows the newer record.
    pub fn merge_from(&mut self, other: &Record) {
        self.id = other.id.clone();
        match (&mut self.payload, &other.payload) {
            (Value::Object(mine), Value::Object(theirs)) => {
                for (k, v) in theirs {
                    mine.insert(k.clone(), v.clone());
                }
            }
            (mine, theirs) => *mine = theirs.clone(),
        }
    }
}
