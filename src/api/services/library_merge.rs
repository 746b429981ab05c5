//! Merge rule for library blobs.
//!
//! Used when a fresh upload meets a blob that already exists on the server.
//! `elements` and `diagrams` are merged element-wise by id; for ids present on
//! both sides the incoming fields overwrite the existing ones while fields only
//! the existing side has survive. Every other key is carried through, incoming
//! preferred.

use crate::models::EntityKind;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Merge `incoming` (freshly computed local data) into `existing` (stored remote data).
pub fn merge_library_data(
    existing: &Map<String, Value>,
    incoming: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = existing.clone();

    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }

    for kind in EntityKind::all() {
        let key = kind.library_key();
        if existing.contains_key(key) || incoming.contains_key(key) {
            let rows = merge_rows_by_id(
                existing.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]),
                incoming.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]),
            );
            merged.insert(key.to_string(), Value::Array(rows));
        }
    }

    merged
}

/// Element-wise merge of two row lists keyed by `id`.
///
/// Existing order is kept; rows only the incoming side has are appended in
/// their incoming order. Rows without a string id are kept verbatim.
pub fn merge_rows_by_id(existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let incoming_by_id: HashMap<&str, &Value> = incoming
        .iter()
        .filter_map(|row| row_id(row).map(|id| (id, row)))
        .collect();

    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    let mut seen = std::collections::HashSet::new();

    for row in existing {
        match row_id(row) {
            Some(id) => {
                seen.insert(id);
                match incoming_by_id.get(id) {
                    Some(newer) => merged.push(shallow_merge(row, newer)),
                    None => merged.push(row.clone()),
                }
            }
            None => merged.push(row.clone()),
        }
    }

    for row in incoming {
        match row_id(row) {
            Some(id) if seen.contains(id) => {}
            Some(id) => {
                seen.insert(id);
                merged.push(row.clone());
            }
            None => merged.push(row.clone()),
        }
    }

    merged
}

/// Field-by-field merge of two rows, `incoming` taking precedence.
pub fn shallow_merge(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut merged = old.clone();
            for (key, value) in new {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

pub(crate) fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}
