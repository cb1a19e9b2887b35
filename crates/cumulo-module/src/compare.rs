//! Semantic JSON comparison
//!
//! Provider APIs are loose about list-of-one encodings: a policy document's
//! statement may come back as a bare object or a one-element array, a
//! single-valued field as a string or `["string"]`. Neither difference is
//! drift, so mapper equality checks normalize them before comparing.

use serde_json::Value;

/// Compare two JSON values, treating a one-element array as equal to its
/// sole element at every depth.
#[must_use]
pub fn json_eq_normalized(a: &Value, b: &Value) -> bool {
    match (unwrap_singleton(a), unwrap_singleton(b)) {
        (Value::Object(ma), Value::Object(mb)) => {
            ma.len() == mb.len()
                && ma
                    .iter()
                    .all(|(k, va)| mb.get(k).is_some_and(|vb| json_eq_normalized(va, vb)))
        }
        (Value::Array(la), Value::Array(lb)) => {
            la.len() == lb.len()
                && la
                    .iter()
                    .zip(lb.iter())
                    .all(|(va, vb)| json_eq_normalized(va, vb))
        }
        (va, vb) => va == vb,
    }
}

fn unwrap_singleton(v: &Value) -> &Value {
    match v {
        Value::Array(items) if items.len() == 1 => unwrap_singleton(&items[0]),
        other => other,
    }
}
