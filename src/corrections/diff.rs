//! Diff engine
//!
//! Computes the sparse change-set between a canonical record and a candidate
//! edit. Pure and deterministic: the same inputs always yield the same
//! change-set, and nothing outside the arguments is read.

use serde_json::Value;

use super::model::ChangeSet;
use crate::db::Document;
use crate::schema::EntitySchema;

/// Whether a candidate value counts as "not provided".
///
/// Absent, `null` and the empty string are skipped; `false` and `0` are not.
pub fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Fields of `candidate` that name a schema field, are provided, and differ
/// from `canonical`.
pub fn diff(schema: &EntitySchema, canonical: &Document, candidate: &Document) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for field in schema.field_names() {
        let Some(proposed) = candidate.get(field) else {
            continue;
        };
        if is_unset(Some(proposed)) {
            continue;
        }

        let current = canonical.get(field).unwrap_or(&Value::Null);
        if !deep_equal(proposed, current) {
            changes.insert(field, proposed.clone());
        }
    }

    changes
}

/// Structural equality.
///
/// Numbers compare by value (`1` equals `1.0`), arrays element-wise in order,
/// objects key-wise regardless of key order. Inside objects a missing key
/// and an explicit `null` are the same.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                i == j
            } else if let (Some(i), Some(j)) = (x.as_u64(), y.as_u64()) {
                i == j
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(i), Some(j)) => i == j,
                    _ => false,
                }
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            let null = Value::Null;
            xm.keys().chain(ym.keys()).all(|key| {
                deep_equal(xm.get(key).unwrap_or(&null), ym.get(key).unwrap_or(&null))
            })
        }
        _ => a == b,
    }
}
