//! Storage error types for the local store and the timestamp ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage operation errors.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {entity_id}")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(String),
    /// A stored document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(String),
    /// Timestamp ledger I/O failure
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
