//! One-shot schema migration from the legacy auto-increment layout.
//!
//! Legacy tables look like `(id INTEGER PRIMARY KEY AUTOINCREMENT, doc TEXT)`
//! and their documents may carry numeric ids and lack the boolean flags.
//! Each legacy table is renamed to `<table>_legacy`, its rows are rewritten
//! into the current layout under fresh UUIDs, and the legacy table is dropped
//! once it is empty. Rows that cannot be migrated stay in the legacy table.

use super::StorageError;
use super::local_store::{create_collection_tables, write_row};
use crate::models::entity::{EntityKind, SyncEntity};
use crate::models::{Diagram, GraphicElement};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Meta key set once the UUID migration has run, successful or not.
pub const MIGRATION_MARKER: &str = "uuid_migration_done";
/// Meta key holding the current schema version.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const SCHEMA_VERSION: u32 = 2;

const FLAG_FIELDS: [&str; 3] = ["local", "synchronized", "hidden"];

/// Outcome of a migration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// False when the marker was already present
    pub ran: bool,
    pub migrated_rows: usize,
    pub failed_rows: usize,
}

pub(crate) fn create_meta_table(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub(crate) fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT value FROM sync_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Run the migration once. The marker is written even when migration fails.
pub(crate) fn migrate(conn: &mut Connection) -> Result<MigrationReport, StorageError> {
    if read_meta(conn, MIGRATION_MARKER)?.is_some() {
        return Ok(MigrationReport::default());
    }

    let result = migrate_legacy_tables(conn);

    write_meta(conn, MIGRATION_MARKER, "1")?;
    write_meta(conn, SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string())?;

    result
}

fn migrate_legacy_tables(conn: &mut Connection) -> Result<MigrationReport, StorageError> {
    for kind in EntityKind::all() {
        if is_legacy_layout(conn, kind.table())? {
            debug!("Renaming legacy table {}", kind.table());
            conn.execute_batch(&format!(
                "ALTER TABLE {table} RENAME TO {table}_legacy",
                table = kind.table()
            ))?;
        }
    }

    create_collection_tables(conn)?;

    let mut report = MigrationReport {
        ran: true,
        ..Default::default()
    };
    let (migrated, failed) = migrate_rows::<Diagram>(conn)?;
    report.migrated_rows += migrated;
    report.failed_rows += failed;
    let (migrated, failed) = migrate_rows::<GraphicElement>(conn)?;
    report.migrated_rows += migrated;
    report.failed_rows += failed;
    Ok(report)
}

/// A table is legacy when it exists but has no `synchronized` column.
fn is_legacy_layout(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(!columns.is_empty() && !columns.iter().any(|c| c == "synchronized"))
}

fn legacy_table_exists(conn: &Connection, legacy: &str) -> Result<bool, StorageError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![legacy],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn migrate_rows<E: SyncEntity>(conn: &mut Connection) -> Result<(usize, usize), StorageError> {
    let legacy = format!("{}_legacy", E::KIND.table());
    if !legacy_table_exists(conn, &legacy)? {
        return Ok((0, 0));
    }

    let rows: Vec<(i64, String)> = {
        let mut stmt = conn.prepare(&format!("SELECT rowid, doc FROM {legacy}"))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };

    let tx = conn.transaction()?;
    let mut migrated = 0;
    let mut failed = 0;
    for (rowid, doc) in rows {
        match upgrade_document::<E>(&doc) {
            Ok(entity) => {
                write_row(&tx, &entity)?;
                tx.execute(
                    &format!("DELETE FROM {legacy} WHERE rowid = ?1"),
                    params![rowid],
                )?;
                migrated += 1;
            }
            Err(e) => {
                warn!("Leaving legacy {} row {} unmigrated: {}", E::KIND, rowid, e);
                failed += 1;
            }
        }
    }

    if failed == 0 {
        tx.execute_batch(&format!("DROP TABLE {legacy}"))?;
    }
    tx.commit()?;
    Ok((migrated, failed))
}

/// Rewrite one legacy document into the current shape.
pub fn upgrade_document<E: SyncEntity>(doc: &str) -> Result<E, StorageError> {
    let mut value: Value = serde_json::from_str(doc)?;
    let map = value.as_object_mut().ok_or_else(|| {
        StorageError::Migration("legacy document is not a JSON object".to_string())
    })?;

    let has_string_id = map
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty() && id.parse::<i64>().is_err());
    if !has_string_id {
        map.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }

    for flag in FLAG_FIELDS {
        if !map.get(flag).is_some_and(Value::is_boolean) {
            map.insert(flag.to_string(), Value::Bool(false));
        }
    }

    Ok(serde_json::from_value(value)?)
}
