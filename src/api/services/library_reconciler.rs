//! Whole-library (blob) synchronization keyed by username.
//!
//! The blob holds every diagram and graphic element of a user as one JSON
//! document. It is the main catch-up channel at login: the ledger's last
//! synchronized instant is compared with the blob's `updated_at` to decide
//! whether to upload, download or do nothing.

use super::debounced_uploader::LibraryUploader;
use super::error::SyncError;
use super::events::{ReconcileOutcome, SyncEvent, SyncEvents};
use super::library_merge::{merge_library_data, row_id};
use super::remote_service::RemoteService;
use super::sanitizer::sanitize_for_remote;
use crate::models::entity::{format_timestamp, parse_timestamp};
use crate::models::{
    Diagram, EntityKind, GraphicElement, LibraryDocument, LibraryUpload, SyncEntity,
};
use crate::storage::{EntityStore, IndexFilter, LedgerKind, LocalStore, TimestampLedger};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type DownloadResult = Result<Option<LibraryDocument>, SyncError>;
type SharedDownload = Shared<BoxFuture<'static, DownloadResult>>;

/// Rows gathered for an upload, plus what is needed to flag them afterwards.
struct Outbound {
    rows: Vec<Value>,
    included: Vec<(String, Option<DateTime<Utc>>)>,
}

pub struct LibraryReconciler {
    store: LocalStore,
    remote: Arc<dyn RemoteService>,
    ledger: Arc<TimestampLedger>,
    events: SyncEvents,
    in_flight: Mutex<HashMap<String, SharedDownload>>,
}

impl LibraryReconciler {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteService>,
        ledger: Arc<TimestampLedger>,
        events: SyncEvents,
    ) -> Self {
        Self {
            store,
            remote,
            ledger,
            events,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the user's library blob. `Ok(None)` when the server has none yet.
    ///
    /// Concurrent calls for the same user share one request. The shared entry
    /// is dropped as soon as any caller finishes or is cancelled, so a later
    /// call never reuses an old answer.
    pub async fn download_user_library(&self, username: &str) -> DownloadResult {
        let download = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            match in_flight.get(username) {
                Some(pending) => {
                    debug!("Joining in-flight library download for {}", username);
                    pending.clone()
                }
                None => {
                    let remote = Arc::clone(&self.remote);
                    let user = username.to_string();
                    let fresh = async move { remote.fetch_library(&user).await }
                        .boxed()
                        .shared();
                    in_flight.insert(username.to_string(), fresh.clone());
                    fresh
                }
            }
        };

        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            username,
            download,
        };
        guard.download.clone().await
    }

    /// Upload every shareable local row, merged over the current remote blob.
    ///
    /// Returns the server-confirmed timestamp now recorded in the ledger.
    pub async fn upload_full_user_library(
        &self,
        username: &str,
    ) -> Result<DateTime<Utc>, SyncError> {
        let existing = self.download_user_library(username).await?;
        self.upload_over(username, existing).await
    }

    async fn upload_over(
        &self,
        username: &str,
        existing: Option<LibraryDocument>,
    ) -> Result<DateTime<Utc>, SyncError> {
        let elements = gather(&self.store.elements())?;
        let diagrams = gather(&self.store.diagrams())?;
        let local_only = self.local_only_ids()?;

        let incoming = LibraryDocument::from_rows(elements.rows, diagrams.rows, None).data;
        let mut data = match existing {
            Some(document) => merge_library_data(&document.data, &incoming),
            None => incoming,
        };
        strip_ids(&mut data, &local_only);

        let now = Utc::now().trunc_subsecs(3);
        let upload = LibraryUpload {
            username: username.to_string(),
            updated_at: format_timestamp(&now),
            data,
        };
        let ack = self.remote.put_library(username, &upload).await?;
        let confirmed = ack
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);

        for (id, at) in elements.included {
            self.store.elements().mark_synchronized_if_unchanged(&id, at)?;
        }
        for (id, at) in diagrams.included {
            self.store.diagrams().mark_synchronized_if_unchanged(&id, at)?;
        }
        self.ledger
            .set_last_synced(username, LedgerKind::Library, confirmed)?;

        info!("Uploaded library for {} at {}", username, format_timestamp(&confirmed));
        self.events.publish(SyncEvent::LibraryUploaded {
            user: username.to_string(),
            updated_at: format_timestamp(&confirmed),
        });
        Ok(confirmed)
    }

    /// Decide the sync direction for the whole library and apply it.
    pub async fn reconcile_user_library(&self, username: &str) -> ReconcileOutcome {
        let outcome = self.reconcile(username).await;
        info!("Library reconcile for {}: {:?}", username, outcome);
        self.events.publish(SyncEvent::LibraryReconciled {
            user: username.to_string(),
            outcome,
        });
        outcome
    }

    async fn reconcile(&self, username: &str) -> ReconcileOutcome {
        let remote = match self.download_user_library(username).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Cannot reconcile library for {}: {}", username, e);
                return ReconcileOutcome::Failed;
            }
        };
        let last_synced = self.ledger.get_last_synced(username, LedgerKind::Library);

        let Some(document) = remote else {
            if last_synced.is_none() {
                return ReconcileOutcome::NothingToReconcile;
            }
            return match self.upload_over(username, None).await {
                Ok(_) => ReconcileOutcome::PushedFirstLibrary,
                Err(e) => {
                    warn!("First library upload for {} failed: {}", username, e);
                    ReconcileOutcome::Failed
                }
            };
        };

        let remote_at = document.updated_instant();
        match last_synced {
            Some(local_at) if Some(local_at) == remote_at => ReconcileOutcome::UpToDate,
            // An unreadable remote timestamp loses against any recorded local one.
            Some(local_at) if remote_at.is_none_or(|remote_at| local_at > remote_at) => {
                match self.upload_over(username, Some(document)).await {
                    Ok(_) => ReconcileOutcome::Uploaded,
                    Err(e) => {
                        warn!("Library upload for {} failed: {}", username, e);
                        ReconcileOutcome::Failed
                    }
                }
            }
            _ => match self.apply_remote(username, &document) {
                Ok(()) => ReconcileOutcome::Downloaded,
                Err(e) => {
                    warn!("Applying remote library for {} failed: {}", username, e);
                    ReconcileOutcome::Failed
                }
            },
        }
    }

    /// Remote wins: rebuild visible shareable rows from the blob.
    fn apply_remote(&self, username: &str, document: &LibraryDocument) -> Result<(), SyncError> {
        let elements = self.store.elements();
        let diagrams = self.store.diagrams();

        let element_rows = decode_rows::<GraphicElement>(document, &local_only(&elements)?);
        let diagram_rows = decode_rows::<Diagram>(document, &local_only(&diagrams)?);
        let (element_count, diagram_count) = (element_rows.len(), diagram_rows.len());

        elements.replace_visible(element_rows)?;
        diagrams.replace_visible(diagram_rows)?;

        if let Some(remote_at) = document.updated_instant() {
            self.ledger
                .set_last_synced(username, LedgerKind::Library, remote_at)?;
        } else {
            warn!("Remote library for {} has no readable timestamp", username);
        }

        info!(
            "Replaced local library for {} with {} elements and {} diagrams from remote",
            username, element_count, diagram_count
        );
        Ok(())
    }

    /// Snapshot of every local row, device-local and hidden ones included.
    ///
    /// For on-device backups only; never sent anywhere.
    pub fn export_local_backup(&self, username: &str) -> Result<LibraryDocument, SyncError> {
        let elements = self
            .store
            .elements()
            .list_all()?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let diagrams = self
            .store
            .diagrams()
            .list_all()?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let updated_at = self
            .ledger
            .get_last_synced(username, LedgerKind::Library)
            .map(|at| format_timestamp(&at));
        Ok(LibraryDocument::from_rows(elements, diagrams, updated_at))
    }

    fn local_only_ids(&self) -> Result<HashSet<String>, SyncError> {
        let mut ids = local_only(&self.store.elements())?;
        ids.extend(local_only(&self.store.diagrams())?);
        Ok(ids)
    }
}

/// Clears a user's in-flight download entry when its caller goes away.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, SharedDownload>>,
    username: &'a str,
    download: SharedDownload,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if in_flight
            .get(self.username)
            .is_some_and(|pending| pending.ptr_eq(&self.download))
        {
            in_flight.remove(self.username);
        }
    }
}

#[async_trait]
impl LibraryUploader for LibraryReconciler {
    async fn upload_library(&self, username: &str) -> Result<(), SyncError> {
        self.upload_full_user_library(username).await.map(|_| ())
    }
}

fn gather<E: SyncEntity>(store: &EntityStore<E>) -> Result<Outbound, SyncError> {
    let mut outbound = Outbound {
        rows: Vec::new(),
        included: Vec::new(),
    };
    for row in store.list_all()? {
        if row.is_local() {
            continue;
        }
        match sanitize_for_remote(&row) {
            Ok(sanitized) => {
                outbound.rows.push(Value::Object(sanitized));
                outbound.included.push((row.id().to_string(), row.updated_at()));
            }
            Err(e) => warn!("Leaving {} {} out of the library upload: {}", E::KIND, row.id(), e),
        }
    }
    Ok(outbound)
}

fn local_only<E: SyncEntity>(store: &EntityStore<E>) -> Result<HashSet<String>, SyncError> {
    Ok(store
        .list_by_index(&IndexFilter::Local(true))?
        .into_iter()
        .map(|row| row.id().to_string())
        .collect())
}

/// Remove rows whose id is device-local from both collections of `data`.
fn strip_ids(data: &mut Map<String, Value>, ids: &HashSet<String>) {
    if ids.is_empty() {
        return;
    }
    for kind in EntityKind::all() {
        if let Some(Value::Array(rows)) = data.get_mut(kind.library_key()) {
            rows.retain(|row| row_id(row).is_none_or(|id| !ids.contains(id)));
        }
    }
}

fn decode_rows<E: SyncEntity>(document: &LibraryDocument, skip: &HashSet<String>) -> Vec<E> {
    document
        .rows(E::KIND)
        .iter()
        .filter_map(|raw| match serde_json::from_value::<E>(raw.clone()) {
            Ok(mut row) if !row.id().trim().is_empty() && !skip.contains(row.id()) => {
                row.set_local(false);
                Some(row)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Skipping unreadable {} row in remote library: {}", E::KIND, e);
                None
            }
        })
        .collect()
}
