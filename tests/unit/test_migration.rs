//! Unit tests for the legacy store migration

use rusqlite::{Connection, params};
use std::path::Path;
use symbol_library_sync::models::GraphicElement;
use symbol_library_sync::storage::LocalStore;
use symbol_library_sync::storage::migration::{MIGRATION_MARKER, SCHEMA_VERSION_KEY};
use uuid::Uuid;

fn legacy_db(path: &Path, table: &str, docs: &[&str]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, doc TEXT)"
    ))
    .unwrap();
    for doc in docs {
        conn.execute(&format!("INSERT INTO {table} (doc) VALUES (?1)"), params![doc])
            .unwrap();
    }
}

fn legacy_rows(path: &Path, table: &str) -> Option<i64> {
    let conn = Connection::open(path).unwrap();
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![format!("{table}_legacy")],
            |row| row.get(0),
        )
        .unwrap();
    if exists == 0 {
        return None;
    }
    Some(
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}_legacy"), [], |row| {
            row.get(0)
        })
        .unwrap(),
    )
}

#[test]
fn test_fresh_store_records_migration_marker() {
    let store = LocalStore::open_in_memory().unwrap();

    assert_eq!(store.meta(MIGRATION_MARKER).unwrap().as_deref(), Some("1"));
    assert_eq!(store.meta(SCHEMA_VERSION_KEY).unwrap().as_deref(), Some("2"));
    assert_eq!(store.diagrams().count().unwrap(), 0);
}

#[test]
fn test_legacy_rows_get_uuid_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    legacy_db(
        &path,
        "diagrams",
        &[
            r#"{"id": 1, "name": "First", "nodes": "[]", "edges": "[]"}"#,
            r#"{"name": "Second", "hidden": true}"#,
            r#"{"id": "2", "name": "Third"}"#,
        ],
    );

    let store = LocalStore::open(&path).unwrap();

    let diagrams = store.diagrams().list_all().unwrap();
    assert_eq!(diagrams.len(), 3);
    for diagram in &diagrams {
        assert!(Uuid::parse_str(&diagram.id).is_ok(), "id {} is not a UUID", diagram.id);
        assert!(!diagram.local);
        assert!(!diagram.synchronized);
    }
    let second = diagrams.iter().find(|d| d.name == "Second").unwrap();
    assert!(second.hidden);
    assert_eq!(legacy_rows(&path, "diagrams"), None);
}

#[test]
fn test_non_boolean_flags_become_false() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    legacy_db(
        &path,
        "graphic_elements",
        &[r#"{"id": 5, "name": "Valve", "svg": "<svg/>", "local": "yes", "hidden": 1}"#],
    );

    let store = LocalStore::open(&path).unwrap();

    let elements = store.elements().list_all().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].name, "Valve");
    assert!(!elements[0].local);
    assert!(!elements[0].hidden);
}

#[test]
fn test_unreadable_rows_stay_in_legacy_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    legacy_db(
        &path,
        "diagrams",
        &[r#"{"id": 1, "name": "Good"}"#, "not json", "[1, 2, 3]"],
    );

    let store = LocalStore::open(&path).unwrap();

    assert_eq!(store.diagrams().count().unwrap(), 1);
    assert_eq!(legacy_rows(&path, "diagrams"), Some(2));
    assert_eq!(store.meta(MIGRATION_MARKER).unwrap().as_deref(), Some("1"));
}

#[test]
fn test_migration_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    legacy_db(&path, "diagrams", &[r#"{"id": 1, "name": "Good"}"#, "not json"]);

    let first_ids: Vec<String> = {
        let store = LocalStore::open(&path).unwrap();
        store.diagrams().list_all().unwrap().into_iter().map(|d| d.id).collect()
    };

    let store = LocalStore::open(&path).unwrap();
    let second_ids: Vec<String> = store
        .diagrams()
        .list_all()
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();

    assert_eq!(first_ids, second_ids);
    assert_eq!(legacy_rows(&path, "diagrams"), Some(1));
}

#[test]
fn test_current_layout_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    {
        let store = LocalStore::open(&path).unwrap();
        store
            .elements()
            .put(GraphicElement::new("Arrow", "lines", "<svg/>").with_id("g1"))
            .unwrap();
    }
    // Simulate a store from before the marker existed.
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute("DELETE FROM sync_meta", []).unwrap();
    }

    let store = LocalStore::open(&path).unwrap();

    assert_eq!(store.elements().get("g1").unwrap().unwrap().name, "Arrow");
    assert_eq!(legacy_rows(&path, "graphic_elements"), None);
}
