//! Unit tests for the library merge rule

use serde_json::{Map, Value, json};
use symbol_library_sync::services::library_merge::{
    merge_library_data, merge_rows_by_id, shallow_merge,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[test]
fn test_rows_are_merged_by_id() {
    let existing = object(json!({
        "version": 1,
        "elements": [
            {"id": "A", "name": "a", "color": "red"},
            {"id": "B", "name": "b"}
        ],
        "diagrams": []
    }));
    let incoming = object(json!({
        "version": 1,
        "elements": [
            {"id": "A", "name": "a2"},
            {"id": "C", "name": "c"}
        ],
        "diagrams": []
    }));

    let merged = merge_library_data(&existing, &incoming);

    assert_eq!(
        merged["elements"],
        json!([
            {"id": "A", "name": "a2", "color": "red"},
            {"id": "B", "name": "b"},
            {"id": "C", "name": "c"}
        ])
    );
}

#[test]
fn test_unknown_keys_are_preserved() {
    let existing = object(json!({
        "version": 1,
        "elements": [],
        "settings": {"grid": true},
        "theme": "dark"
    }));
    let incoming = object(json!({
        "version": 2,
        "elements": [],
        "diagrams": [],
        "theme": "light"
    }));

    let merged = merge_library_data(&existing, &incoming);

    assert_eq!(merged["settings"], json!({"grid": true}));
    assert_eq!(merged["theme"], json!("light"));
    assert_eq!(merged["version"], json!(2));
    assert_eq!(merged["diagrams"], json!([]));
}

#[test]
fn test_missing_collections_merge_as_empty() {
    let existing = object(json!({"diagrams": [{"id": "d1"}]}));
    let incoming = object(json!({"elements": [{"id": "g1"}]}));

    let merged = merge_library_data(&existing, &incoming);

    assert_eq!(merged["diagrams"], json!([{"id": "d1"}]));
    assert_eq!(merged["elements"], json!([{"id": "g1"}]));
}

#[test]
fn test_rows_without_id_are_kept() {
    let existing = vec![json!({"name": "orphan"}), json!({"id": "A"})];
    let incoming = vec![json!({"id": "A", "name": "a"}), json!({"name": "stray"})];

    let merged = merge_rows_by_id(&existing, &incoming);

    assert_eq!(
        merged,
        vec![
            json!({"name": "orphan"}),
            json!({"id": "A", "name": "a"}),
            json!({"name": "stray"})
        ]
    );
}

#[test]
fn test_shallow_merge_prefers_incoming_fields() {
    let merged = shallow_merge(
        &json!({"id": "A", "name": "old", "nested": {"x": 1, "y": 2}}),
        &json!({"name": "new", "nested": {"x": 3}}),
    );

    assert_eq!(
        merged,
        json!({"id": "A", "name": "new", "nested": {"x": 3}})
    );
}

#[test]
fn test_shallow_merge_with_non_objects_takes_incoming() {
    assert_eq!(shallow_merge(&json!("old"), &json!({"id": "A"})), json!({"id": "A"}));
}
