//! Storage module for the sync engine.
//!
//! Provides the SQLite local store, its one-shot migration and the
//! timestamp ledger kept outside the database.

pub mod error;
pub mod ledger;
pub mod local_store;
pub mod migration;

pub use error::StorageError;
pub use ledger::{LedgerKind, TimestampLedger};
pub use local_store::{EntityStore, IndexFilter, LocalStore};
pub use migration::MigrationReport;
