//! SQLite-backed local store for diagrams and graphic elements.
//!
//! Every row is kept as a JSON document plus a handful of indexed columns.
//! The `local`, `synchronized` and `hidden` columns are authoritative: they
//! are written over whatever the document says when a row is read back.

use super::{StorageError, migration};
use crate::models::entity::{SyncEntity, parse_timestamp, sortable_timestamp};
use crate::models::{Diagram, GraphicElement};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Columns every row query selects, in decode order.
const ROW_COLUMNS: &str = "doc, local, synchronized, hidden";

/// Handle to the on-device database. Cheap to clone.
#[derive(Clone)]
pub struct LocalStore {
    conn: SharedConnection,
}

impl LocalStore {
    /// Open (or create) the store at `db_path` and run the one-shot migration.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path).map_err(|e| {
            StorageError::Database(format!("Failed to open store {:?}: {}", db_path, e))
        })?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        migration::create_meta_table(&conn)?;

        // Migration problems never make the store unusable.
        match migration::migrate(&mut conn) {
            Ok(report) if report.migrated_rows > 0 || report.failed_rows > 0 => {
                info!(
                    "Store migration finished: {} rows migrated, {} rows left in legacy tables",
                    report.migrated_rows, report.failed_rows
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Store migration failed, continuing with existing data: {}", e),
        }

        create_collection_tables(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn diagrams(&self) -> EntityStore<Diagram> {
        self.collection()
    }

    pub fn elements(&self) -> EntityStore<GraphicElement> {
        self.collection()
    }

    /// Typed view over one collection table.
    pub fn collection<E: SyncEntity>(&self) -> EntityStore<E> {
        EntityStore {
            conn: Arc::clone(&self.conn),
            _entity: PhantomData,
        }
    }

    /// Read a value from the store's meta table.
    pub fn meta(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = lock(&self.conn);
        migration::read_meta(&conn, key)
    }
}

/// Create the current-schema collection tables if they do not exist yet.
pub(crate) fn create_collection_tables(conn: &Connection) -> Result<(), StorageError> {
    for table in ["diagrams", "graphic_elements"] {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                category TEXT,
                created_by TEXT,
                updated_at TEXT,
                local INTEGER NOT NULL DEFAULT 0,
                synchronized INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                doc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at);
            CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table}(category);"
        ))?;
    }
    Ok(())
}

/// Insert or replace a row exactly as given.
pub(crate) fn write_row<E: SyncEntity>(conn: &Connection, entity: &E) -> Result<(), StorageError> {
    let doc = serde_json::to_string(entity)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (
                id, name, category, created_by, updated_at, local, synchronized, hidden, doc
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            E::KIND.table()
        ),
        params![
            entity.id(),
            entity.name(),
            entity.category(),
            entity.created_by(),
            entity.updated_at().map(|at| sortable_timestamp(&at)),
            entity.is_local(),
            entity.is_synchronized(),
            entity.is_hidden(),
            doc,
        ],
    )?;
    Ok(())
}

fn decode<E: SyncEntity>(
    doc: &str,
    local: bool,
    synchronized: bool,
    hidden: bool,
) -> Result<E, StorageError> {
    let mut entity: E = serde_json::from_str(doc)?;
    entity.set_local(local);
    entity.set_synchronized(synchronized);
    entity.set_hidden(hidden);
    Ok(entity)
}

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Indexed lookups supported by [`EntityStore::list_by_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFilter {
    Category(String),
    CreatedBy(String),
    Local(bool),
    Synchronized(bool),
    Hidden(bool),
}

impl IndexFilter {
    fn column(&self) -> &'static str {
        match self {
            IndexFilter::Category(_) => "category",
            IndexFilter::CreatedBy(_) => "created_by",
            IndexFilter::Local(_) => "local",
            IndexFilter::Synchronized(_) => "synchronized",
            IndexFilter::Hidden(_) => "hidden",
        }
    }

    fn value(&self) -> SqlValue {
        match self {
            IndexFilter::Category(v) | IndexFilter::CreatedBy(v) => SqlValue::Text(v.clone()),
            IndexFilter::Local(b) | IndexFilter::Synchronized(b) | IndexFilter::Hidden(b) => {
                SqlValue::Integer(i64::from(*b))
            }
        }
    }
}

/// One collection of the local store.
pub struct EntityStore<E> {
    conn: SharedConnection,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            _entity: PhantomData,
        }
    }
}

impl<E: SyncEntity> EntityStore<E> {
    fn table(&self) -> &'static str {
        E::KIND.table()
    }

    fn query(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<E>, StorageError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (doc, local, synchronized, hidden) = row?;
            match decode::<E>(&doc, local, synchronized, hidden) {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!("Skipping unreadable {} row: {}", E::KIND, e),
            }
        }
        Ok(entities)
    }

    /// Upsert a row as a local edit.
    ///
    /// Assigns an id when missing, stamps `updated_at` with a strictly
    /// increasing "now" and clears `synchronized`.
    pub fn put(&self, mut entity: E) -> Result<E, StorageError> {
        entity.ensure_id();
        let conn = lock(&self.conn);

        let previous: Option<String> = conn
            .query_row(
                &format!("SELECT updated_at FROM {} WHERE id = ?1", self.table()),
                params![entity.id()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let mut now = Utc::now().trunc_subsecs(3);
        if let Some(prev) = previous.as_deref().and_then(parse_timestamp) {
            if prev >= now {
                now = prev + Duration::milliseconds(1);
            }
        }

        entity.set_updated_at(now);
        if entity.created_at().is_none() {
            entity.set_created_at(now);
        }
        entity.set_synchronized(false);

        write_row(&conn, &entity)?;
        Ok(entity)
    }

    /// Store a row received from the remote side, keeping its timestamps.
    pub fn import(&self, mut entity: E) -> Result<E, StorageError> {
        entity.ensure_id();
        entity.set_synchronized(true);
        let conn = lock(&self.conn);
        write_row(&conn, &entity)?;
        Ok(entity)
    }

    pub fn get(&self, id: &str) -> Result<Option<E>, StorageError> {
        let conn = lock(&self.conn);
        let rows = self.query(
            &conn,
            &format!("SELECT {ROW_COLUMNS} FROM {} WHERE id = ?1", self.table()),
            params![id],
        )?;
        Ok(rows.into_iter().next())
    }

    /// Visible rows, newest first.
    pub fn list(&self) -> Result<Vec<E>, StorageError> {
        let conn = lock(&self.conn);
        self.query(
            &conn,
            &format!(
                "SELECT {ROW_COLUMNS} FROM {} WHERE hidden = 0 ORDER BY updated_at DESC",
                self.table()
            ),
            [],
        )
    }

    /// Every row including soft-deleted ones, newest first.
    pub fn list_all(&self) -> Result<Vec<E>, StorageError> {
        let conn = lock(&self.conn);
        self.query(
            &conn,
            &format!(
                "SELECT {ROW_COLUMNS} FROM {} ORDER BY updated_at DESC",
                self.table()
            ),
            [],
        )
    }

    /// Rows matching an indexed column, newest first. Hidden rows are included.
    pub fn list_by_index(&self, filter: &IndexFilter) -> Result<Vec<E>, StorageError> {
        let conn = lock(&self.conn);
        self.query(
            &conn,
            &format!(
                "SELECT {ROW_COLUMNS} FROM {} WHERE {} = ?1 ORDER BY updated_at DESC",
                self.table(),
                filter.column()
            ),
            params![filter.value()],
        )
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = lock(&self.conn);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Soft delete (`hidden = true`) or restore a row. Counts as a local edit.
    pub fn set_hidden(&self, id: &str, hidden: bool) -> Result<E, StorageError> {
        let mut entity = self.get(id)?.ok_or_else(|| StorageError::NotFound {
            entity_type: E::KIND.to_string(),
            entity_id: id.to_string(),
        })?;
        entity.set_hidden(hidden);
        self.put(entity)
    }

    /// Hard delete. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let conn = lock(&self.conn);
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table()),
            params![id],
        )?;
        Ok(removed > 0)
    }

    /// Remove every row of the collection.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let conn = lock(&self.conn);
        let removed = conn.execute(&format!("DELETE FROM {}", self.table()), [])?;
        info!("Cleared {} {} rows", removed, E::KIND);
        Ok(removed)
    }

    /// Mark every row unsynchronized. Returns the number of rows touched.
    pub fn reset_synchronized(&self) -> Result<usize, StorageError> {
        let conn = lock(&self.conn);
        let touched = conn.execute(
            &format!("UPDATE {} SET synchronized = 0", self.table()),
            [],
        )?;
        Ok(touched)
    }

    pub fn set_synchronized(&self, id: &str, synchronized: bool) -> Result<bool, StorageError> {
        let conn = lock(&self.conn);
        let touched = conn.execute(
            &format!("UPDATE {} SET synchronized = ?1 WHERE id = ?2", self.table()),
            params![synchronized, id],
        )?;
        Ok(touched > 0)
    }

    /// Mark a row synchronized only if nobody edited it since `expected` was read.
    pub fn mark_synchronized_if_unchanged(
        &self,
        id: &str,
        expected: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let conn = lock(&self.conn);
        let touched = conn.execute(
            &format!(
                "UPDATE {} SET synchronized = 1 WHERE id = ?1 AND updated_at IS ?2",
                self.table()
            ),
            params![id, expected.map(|at| sortable_timestamp(&at))],
        )?;
        Ok(touched > 0)
    }

    /// Drop every visible, shareable row and rebuild the collection from `rows`.
    ///
    /// Hidden rows and device-local rows survive. Runs in one transaction.
    pub fn replace_visible(&self, rows: Vec<E>) -> Result<usize, StorageError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE hidden = 0 AND local = 0", self.table()),
            [],
        )?;

        let mut written = 0;
        for mut row in rows {
            row.ensure_id();
            row.set_synchronized(true);
            write_row(&tx, &row)?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }
}
