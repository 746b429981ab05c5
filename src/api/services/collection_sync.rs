//! Per-collection sync engine.
//!
//! One instance per entity kind. A run pulls the remote collection, merges it
//! row by row into the local store (newer `updated_at` wins, remote wins ties
//! and unreadable timestamps), then pushes local rows the remote side does not
//! have yet. Device-local rows are never pushed nor overwritten.

use super::error::SyncError;
use super::events::{SyncEvent, SyncEvents, SyncReport};
use super::remote_service::RemoteService;
use super::sanitizer::sanitize_for_post;
use crate::models::{EntityKind, SyncEntity};
use crate::storage::{EntityStore, LedgerKind, TimestampLedger};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sync engine for one collection.
pub struct CollectionSync<E: SyncEntity> {
    store: EntityStore<E>,
    remote: Arc<dyn RemoteService>,
    events: SyncEvents,
    retry_delay: Duration,
    ledger: Option<Arc<TimestampLedger>>,
    /// Users with a background run in flight, and whether another was requested
    background: Mutex<HashMap<String, bool>>,
}

impl<E: SyncEntity> CollectionSync<E> {
    pub fn new(
        store: EntityStore<E>,
        remote: Arc<dyn RemoteService>,
        events: SyncEvents,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            events,
            retry_delay,
            ledger: None,
            background: Mutex::new(HashMap::new()),
        }
    }

    /// Record successful diagram syncs in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<TimestampLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Run one sync cycle for `username`.
    ///
    /// Never fails: network problems abort the cycle, per-row problems leave
    /// that row unsynchronized. Completion is always published as an event.
    pub async fn sync(&self, username: &str) -> SyncReport {
        let report = match self.run(username).await {
            Ok(report) => report,
            Err(e) => {
                warn!("{} sync for {} failed: {}", E::KIND, username, e);
                SyncReport {
                    aborted: true,
                    ..Default::default()
                }
            }
        };

        if !report.aborted {
            self.record_success(username);
        }

        info!(
            "{} sync for {}: {} inserted, {} overwritten, {} kept, {} pushed, {} push failures{}",
            E::KIND,
            username,
            report.inserted,
            report.overwritten,
            report.kept_local,
            report.pushed,
            report.push_failed,
            if report.aborted { " (aborted)" } else { "" }
        );

        self.events.publish(SyncEvent::CollectionSynced {
            kind: E::KIND,
            user: username.to_string(),
            report: report.clone(),
        });
        report
    }

    /// Start a sync for `username` on the runtime without waiting for it.
    ///
    /// Triggers that arrive while a background run for the same user is in
    /// flight fold into a single follow-up run. Must be called from within a
    /// Tokio runtime.
    pub fn sync_in_background(self: &Arc<Self>, username: &str) {
        {
            let mut background = self.background.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(rerun) = background.get_mut(username) {
                debug!("{} sync for {} already running, queued a rerun", E::KIND, username);
                *rerun = true;
                return;
            }
            background.insert(username.to_string(), false);
        }

        let sync = Arc::clone(self);
        let user = username.to_string();
        tokio::spawn(async move {
            loop {
                sync.sync(&user).await;
                if !sync.take_rerun(&user) {
                    break;
                }
            }
        });
    }

    /// Consume a queued rerun, or mark the background run for `username` done.
    fn take_rerun(&self, username: &str) -> bool {
        let mut background = self.background.lock().unwrap_or_else(|p| p.into_inner());
        match background.get_mut(username) {
            Some(rerun) if *rerun => {
                *rerun = false;
                true
            }
            _ => {
                background.remove(username);
                false
            }
        }
    }

    async fn run(&self, username: &str) -> Result<SyncReport, SyncError> {
        // A crash mid-sync must never leave a stale synchronized=true behind.
        self.store.reset_synchronized()?;

        let remote_rows = match self.fetch_with_retry().await {
            Ok(rows) => rows,
            Err(SyncError::MalformedResponse(msg)) => {
                warn!("{} collection response malformed, treating as empty: {}", E::KIND, msg);
                Vec::new()
            }
            Err(e) => {
                warn!("Aborting {} sync, remote collection unavailable: {}", E::KIND, e);
                return Ok(SyncReport {
                    aborted: true,
                    ..Default::default()
                });
            }
        };

        let mut report = SyncReport::default();
        let mut remote_ids = HashSet::new();
        for raw in remote_rows {
            let Some(remote) = decode_remote::<E>(raw) else {
                continue;
            };
            remote_ids.insert(remote.id().to_string());

            match self.store.get(remote.id())? {
                None => {
                    self.store.import(remote)?;
                    report.inserted += 1;
                }
                Some(local) => self.merge_existing(local, remote, &mut report)?,
            }
        }

        for local in self.store.list_all()? {
            if local.is_local() || remote_ids.contains(local.id()) {
                continue;
            }
            self.push(username, &local, &mut report).await?;
        }

        Ok(report)
    }

    fn merge_existing(
        &self,
        local: E,
        remote: E,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if local.is_local() {
            // Device-local content never takes a server copy, whatever its age.
            debug!("{} {}: kept device-local row over remote copy", E::KIND, local.id());
            report.kept_local += 1;
        } else if remote_wins(&local, &remote) {
            debug!("{} {}: remote copy wins", E::KIND, remote.id());
            self.store.import(remote)?;
            report.overwritten += 1;
        } else {
            // Local is strictly newer. It only counts as synchronized when the
            // content really matches what the server holds.
            let matches = local.content() == remote.content();
            self.store.set_synchronized(local.id(), matches)?;
            report.kept_local += 1;
        }
        Ok(())
    }

    async fn push(
        &self,
        username: &str,
        local: &E,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let body = match sanitize_for_post(local, username) {
            Ok(body) => body,
            Err(e) => {
                warn!("Skipping {} {}: cannot serialize: {}", E::KIND, local.id(), e);
                report.push_failed += 1;
                return Ok(());
            }
        };

        match self.remote.push_row(E::KIND, &body).await {
            Ok(()) => {
                self.store
                    .mark_synchronized_if_unchanged(local.id(), local.updated_at())?;
                report.pushed += 1;
            }
            Err(e) => {
                warn!("Failed to push {} {}: {}", E::KIND, local.id(), e);
                report.push_failed += 1;
            }
        }
        Ok(())
    }

    async fn fetch_with_retry(&self) -> Result<Vec<Value>, SyncError> {
        let mut retries_left = E::KIND.fetch_retries();
        loop {
            match self.remote.fetch_collection(E::KIND).await {
                Err(e) if retries_left > 0 && !matches!(e, SyncError::MalformedResponse(_)) => {
                    warn!("Fetching {} failed, retrying in {:?}: {}", E::KIND, self.retry_delay, e);
                    retries_left -= 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    fn record_success(&self, username: &str) {
        let (Some(ledger), EntityKind::Diagram) = (&self.ledger, E::KIND) else {
            return;
        };
        if let Err(e) = ledger.set_last_synced(username, LedgerKind::Diagrams, Utc::now()) {
            warn!("Failed to record diagram sync time for {}: {}", username, e);
        }
    }
}

/// Remote wins when it is at least as new, or when either timestamp is unreadable.
pub fn remote_wins<E: SyncEntity>(local: &E, remote: &E) -> bool {
    match (local.updated_at(), remote.updated_at()) {
        (Some(local_at), Some(remote_at)) => remote_at >= local_at,
        _ => true,
    }
}

fn decode_remote<E: SyncEntity>(raw: Value) -> Option<E> {
    let mut row: E = match serde_json::from_value(raw) {
        Ok(row) => row,
        Err(e) => {
            warn!("Skipping unreadable remote {} row: {}", E::KIND, e);
            return None;
        }
    };
    if row.id().trim().is_empty() {
        warn!("Skipping remote {} row without id", E::KIND);
        return None;
    }
    // The server view never holds device-local rows.
    row.set_local(false);
    Some(row)
}
