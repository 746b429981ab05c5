//! Sync completion events.
//!
//! The engine never touches UI state; listeners subscribe here and reload
//! whatever they display when a collection or the library changes.

use crate::models::EntityKind;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Counters for one collection sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Remote rows that were new locally
    pub inserted: usize,
    /// Local rows replaced by newer (or tied) remote rows
    pub overwritten: usize,
    /// Local rows kept over their remote counterpart (newer, or device-local)
    pub kept_local: usize,
    /// Local rows created on the remote side
    pub pushed: usize,
    /// Local rows whose push was rejected or failed
    pub push_failed: usize,
    /// True when the remote fetch failed and nothing was merged
    pub aborted: bool,
}

/// Result of a library reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// Ledger and remote blob carry the same timestamp
    UpToDate,
    /// Local was newer and the library was uploaded
    Uploaded,
    /// Remote was newer (or local never synced) and replaced local content
    Downloaded,
    /// No remote blob yet, local had synced before and was pushed up
    PushedFirstLibrary,
    /// No remote blob and no local sync history
    NothingToReconcile,
    /// The remote side could not be reached or the upload failed
    Failed,
}

/// Domain events published by the sync services.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    CollectionSynced {
        kind: EntityKind,
        user: String,
        report: SyncReport,
    },
    LibraryReconciled {
        user: String,
        outcome: ReconcileOutcome,
    },
    LibraryUploaded {
        user: String,
        updated_at: String,
    },
}

/// Broadcast bus for [`SyncEvent`]s. Cloning shares the same channel.
#[derive(Clone)]
pub struct SyncEvents {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no listeners is fine.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}
