//! Outbound row sanitizing.
//!
//! Everything sent to the remote service passes through here: the device
//! annotation `synchronized` is stripped, `local` is forced to false and
//! nullable text fields are coerced to strings.

use crate::models::SyncEntity;
use serde_json::{Map, Value};

/// Optional text fields the remote service expects as strings.
const TEXT_FIELDS: [&str; 3] = ["description", "category", "handles"];

/// Sanitized JSON object for a row.
pub fn sanitize_for_remote<E: SyncEntity>(
    entity: &E,
) -> Result<Map<String, Value>, serde_json::Error> {
    let value = serde_json::to_value(entity)?;
    let mut row = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };

    row.remove("synchronized");
    row.insert("local".to_string(), Value::Bool(false));
    row.insert("hidden".to_string(), Value::Bool(entity.is_hidden()));

    for field in TEXT_FIELDS {
        if let Some(slot) = row.get_mut(field) {
            coerce_to_string(slot);
        }
    }
    if let Some(name) = row.get_mut("name") {
        coerce_to_string(name);
    }

    Ok(row)
}

/// Body for `POST /collection/{kind}`: the sanitized row plus the username.
pub fn sanitize_for_post<E: SyncEntity>(
    entity: &E,
    username: &str,
) -> Result<Value, serde_json::Error> {
    let mut row = sanitize_for_remote(entity)?;
    row.insert("username".to_string(), Value::String(username.to_string()));
    Ok(Value::Object(row))
}

/// Nulls become empty strings; numbers, booleans and nested JSON keep their
/// textual form.
fn coerce_to_string(slot: &mut Value) {
    let text = match &*slot {
        Value::String(_) => return,
        Value::Null => String::new(),
        _ => slot.to_string(),
    };
    *slot = Value::String(text);
}
