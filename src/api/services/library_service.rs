//! Write path and wiring for the sync services.
//!
//! Editor-level mutations come in here. Each write lands in the local store
//! first, bumps the user's ledger, then kicks off the matching collection
//! sync in the background and schedules a debounced library upload. Writes
//! made while that collection sync is running share one follow-up run.

use super::collection_sync::CollectionSync;
use super::debounced_uploader::{DebouncedUploader, LibraryUploader};
use super::error::SyncError;
use super::events::{ReconcileOutcome, SyncEvents, SyncReport};
use super::library_reconciler::LibraryReconciler;
use super::remote_service::RemoteService;
use super::seeder::{Seeder, bundled_defaults};
use crate::config::SyncConfig;
use crate::models::{Diagram, EntityKind, GraphicElement};
use crate::storage::{LedgerKind, LocalStore, TimestampLedger};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a full startup pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartupSummary {
    pub seeded: usize,
    pub library: ReconcileOutcome,
    pub diagrams: SyncReport,
    pub elements: SyncReport,
}

pub struct LibraryService {
    store: LocalStore,
    ledger: Arc<TimestampLedger>,
    remote: Arc<dyn RemoteService>,
    diagram_sync: Arc<CollectionSync<Diagram>>,
    element_sync: Arc<CollectionSync<GraphicElement>>,
    reconciler: Arc<LibraryReconciler>,
    uploader: DebouncedUploader,
    events: SyncEvents,
}

impl LibraryService {
    pub fn new(
        config: &SyncConfig,
        store: LocalStore,
        ledger: Arc<TimestampLedger>,
        remote: Arc<dyn RemoteService>,
    ) -> Self {
        let events = SyncEvents::new();
        let diagram_sync = Arc::new(
            CollectionSync::new(
                store.diagrams(),
                Arc::clone(&remote),
                events.clone(),
                config.fetch_retry_delay,
            )
            .with_ledger(Arc::clone(&ledger)),
        );
        let element_sync = Arc::new(CollectionSync::new(
            store.elements(),
            Arc::clone(&remote),
            events.clone(),
            config.fetch_retry_delay,
        ));
        let reconciler = Arc::new(LibraryReconciler::new(
            store.clone(),
            Arc::clone(&remote),
            Arc::clone(&ledger),
            events.clone(),
        ));
        let uploader = DebouncedUploader::new(
            Arc::clone(&reconciler) as Arc<dyn LibraryUploader>,
            config.upload_debounce,
        );

        Self {
            store,
            ledger,
            remote,
            diagram_sync,
            element_sync,
            reconciler,
            uploader,
            events,
        }
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn ledger(&self) -> &TimestampLedger {
        &self.ledger
    }

    pub fn reconciler(&self) -> &LibraryReconciler {
        &self.reconciler
    }

    pub fn uploader(&self) -> &DebouncedUploader {
        &self.uploader
    }

    /// Save a diagram as a local edit. Must run inside a Tokio runtime.
    pub fn save_diagram(&self, username: &str, diagram: Diagram) -> Result<Diagram, SyncError> {
        let saved = self.store.diagrams().put(diagram)?;
        self.after_write(username, EntityKind::Diagram);
        Ok(saved)
    }

    /// Save a graphic element as a local edit. Must run inside a Tokio runtime.
    pub fn save_element(
        &self,
        username: &str,
        element: GraphicElement,
    ) -> Result<GraphicElement, SyncError> {
        let saved = self.store.elements().put(element)?;
        self.after_write(username, EntityKind::GraphicElement);
        Ok(saved)
    }

    pub fn hide_diagram(&self, username: &str, id: &str) -> Result<Diagram, SyncError> {
        self.set_diagram_hidden(username, id, true)
    }

    pub fn restore_diagram(&self, username: &str, id: &str) -> Result<Diagram, SyncError> {
        self.set_diagram_hidden(username, id, false)
    }

    pub fn hide_element(&self, username: &str, id: &str) -> Result<GraphicElement, SyncError> {
        self.set_element_hidden(username, id, true)
    }

    pub fn restore_element(&self, username: &str, id: &str) -> Result<GraphicElement, SyncError> {
        self.set_element_hidden(username, id, false)
    }

    fn set_diagram_hidden(
        &self,
        username: &str,
        id: &str,
        hidden: bool,
    ) -> Result<Diagram, SyncError> {
        let saved = self.store.diagrams().set_hidden(id, hidden)?;
        self.after_write(username, EntityKind::Diagram);
        Ok(saved)
    }

    fn set_element_hidden(
        &self,
        username: &str,
        id: &str,
        hidden: bool,
    ) -> Result<GraphicElement, SyncError> {
        let saved = self.store.elements().set_hidden(id, hidden)?;
        self.after_write(username, EntityKind::GraphicElement);
        Ok(saved)
    }

    /// Administrative wipe of both local collections and the user's ledger (logout).
    pub fn clear_all(&self, username: &str) -> Result<(), SyncError> {
        self.store.diagrams().clear()?;
        self.store.elements().clear()?;
        self.ledger.clear_user(username)?;
        info!("Cleared local library for {}", username);
        Ok(())
    }

    pub async fn sync_diagrams(&self, username: &str) -> SyncReport {
        self.diagram_sync.sync(username).await
    }

    pub async fn sync_elements(&self, username: &str) -> SyncReport {
        self.element_sync.sync(username).await
    }

    pub async fn reconcile(&self, username: &str) -> ReconcileOutcome {
        self.reconciler.reconcile_user_library(username).await
    }

    /// Seed defaults, reconcile the library, then sync both collections.
    pub async fn startup(&self, username: &str) -> StartupSummary {
        let seeder = Seeder::new(
            self.store.elements(),
            Arc::clone(&self.remote),
            bundled_defaults(),
        );
        let seeded = seeder.seed_if_empty().await.unwrap_or_else(|e| {
            warn!("Seeding default elements failed: {}", e);
            0
        });

        let library = self.reconcile(username).await;
        let (diagrams, elements) =
            tokio::join!(self.sync_diagrams(username), self.sync_elements(username));

        StartupSummary {
            seeded,
            library,
            diagrams,
            elements,
        }
    }

    fn after_write(&self, username: &str, kind: EntityKind) {
        let now = Utc::now();
        let mut stamps = vec![LedgerKind::Library];
        if kind == EntityKind::Diagram {
            stamps.push(LedgerKind::Diagrams);
        }
        for stamp in stamps {
            if let Err(e) = self.ledger.set_last_synced(username, stamp, now) {
                warn!("Failed to update {} ledger for {}: {}", stamp, username, e);
            }
        }

        match kind {
            EntityKind::Diagram => self.diagram_sync.sync_in_background(username),
            EntityKind::GraphicElement => self.element_sync.sync_in_background(username),
        }

        self.uploader.schedule_upload(username);
    }
}
