//! Concurrent sync integration tests

#[path = "../support/mod.rs"]
mod support;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::*;
use symbol_library_sync::models::EntityKind;
use symbol_library_sync::services::{
    CollectionSync, LibraryReconciler, ReconcileOutcome, SyncEvents,
};
use symbol_library_sync::storage::LocalStore;

type Snapshot = Vec<(String, String, bool, bool)>;

fn prepare() -> (LocalStore, Arc<FakeRemote>) {
    let store = LocalStore::open_in_memory().unwrap();
    let remote = FakeRemote::new();
    let mut scratch = element("g9", "Scratch", "2024-01-05T00:00:00.000Z");
    scratch.local = true;
    seed_elements(
        &store,
        vec![
            element("g1", "Edited", "2024-03-01T00:00:00.000Z"),
            element("g2", "Old", "2024-01-01T00:00:00.000Z"),
            element("g3", "Unsent", "2024-01-02T00:00:00.000Z"),
            scratch,
        ],
    );
    seed_diagrams(&store, vec![diagram("d1", "Unsent", "2024-01-01T00:00:00.000Z")]);
    remote.set_collection(
        EntityKind::GraphicElement,
        vec![
            element_json("g1", "Original", "2024-01-01T00:00:00.000Z"),
            element_json("g2", "New", "2024-02-01T00:00:00.000Z"),
            element_json("g4", "Remote", "2024-02-01T00:00:00.000Z"),
        ],
    );
    remote.set_collection(
        EntityKind::Diagram,
        vec![diagram_json("d2", "Remote", "2024-02-01T00:00:00.000Z")],
    );
    (store, remote)
}

fn snapshot(store: &LocalStore) -> (Snapshot, Snapshot) {
    let mut elements: Snapshot = store
        .elements()
        .list_all()
        .unwrap()
        .into_iter()
        .map(|row| (row.id, row.name, row.local, row.synchronized))
        .collect();
    let mut diagrams: Snapshot = store
        .diagrams()
        .list_all()
        .unwrap()
        .into_iter()
        .map(|row| (row.id, row.name, row.local, row.synchronized))
        .collect();
    elements.sort();
    diagrams.sort();
    (elements, diagrams)
}

fn remote_ids(remote: &FakeRemote, kind: EntityKind) -> BTreeSet<String> {
    remote.collection_ids(kind).into_iter().collect()
}

fn syncs(
    store: &LocalStore,
    remote: &Arc<FakeRemote>,
) -> (
    Arc<CollectionSync<symbol_library_sync::models::GraphicElement>>,
    Arc<CollectionSync<symbol_library_sync::models::Diagram>>,
) {
    let events = SyncEvents::new();
    let elements = CollectionSync::new(
        store.elements(),
        remote.as_remote(),
        events.clone(),
        Duration::from_millis(10),
    );
    let diagrams = CollectionSync::new(
        store.diagrams(),
        remote.as_remote(),
        events,
        Duration::from_millis(10),
    );
    (Arc::new(elements), Arc::new(diagrams))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_converge_like_sequential_runs() {
    let (sequential_store, sequential_remote) = prepare();
    let (elements, diagrams) = syncs(&sequential_store, &sequential_remote);
    elements.sync("alice").await;
    diagrams.sync("alice").await;

    let (concurrent_store, concurrent_remote) = prepare();
    let (elements, diagrams) = syncs(&concurrent_store, &concurrent_remote);
    let mut handles = Vec::new();
    for _ in 0..3 {
        let elements = Arc::clone(&elements);
        handles.push(tokio::spawn(async move {
            elements.sync("alice").await;
        }));
        let diagrams = Arc::clone(&diagrams);
        handles.push(tokio::spawn(async move {
            diagrams.sync("alice").await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(snapshot(&concurrent_store), snapshot(&sequential_store));
    for kind in EntityKind::all() {
        assert_eq!(
            remote_ids(&concurrent_remote, kind),
            remote_ids(&sequential_remote, kind)
        );
    }
    assert!(!remote_ids(&concurrent_remote, EntityKind::GraphicElement).contains("g9"));
}

#[tokio::test]
async fn test_sequential_result_matches_expected_state() {
    let (store, remote) = prepare();
    let (elements, diagrams) = syncs(&store, &remote);
    elements.sync("alice").await;
    diagrams.sync("alice").await;

    let (elements, diagrams) = snapshot(&store);
    assert_eq!(
        elements,
        vec![
            ("g1".to_string(), "Edited".to_string(), false, false),
            ("g2".to_string(), "New".to_string(), false, true),
            ("g3".to_string(), "Unsent".to_string(), false, true),
            ("g4".to_string(), "Remote".to_string(), false, true),
            ("g9".to_string(), "Scratch".to_string(), true, false),
        ]
    );
    assert_eq!(
        diagrams,
        vec![
            ("d1".to_string(), "Unsent".to_string(), false, true),
            ("d2".to_string(), "Remote".to_string(), false, true),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_reconciles_share_one_download() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger_in(&dir);
    let store = LocalStore::open_in_memory().unwrap();
    let remote = FakeRemote::new();
    remote.set_library(library_document(
        vec![element_json("g1", "Arrow", "2024-05-01T00:00:00.000Z")],
        vec![],
        "2024-05-01T00:00:00.000Z",
    ));
    remote.with_state(|s| s.library_delay = Some(Duration::from_millis(50)));
    let reconciler = LibraryReconciler::new(
        store.clone(),
        remote.as_remote(),
        ledger,
        SyncEvents::new(),
    );

    let (first, second) = tokio::join!(
        reconciler.reconcile_user_library("alice"),
        reconciler.reconcile_user_library("alice")
    );

    // Whichever applies the blob second finds the ledger already matching it.
    let mut outcomes = [first, second];
    outcomes.sort_by_key(|outcome| *outcome != ReconcileOutcome::Downloaded);
    assert_eq!(outcomes[0], ReconcileOutcome::Downloaded);
    assert!(matches!(
        outcomes[1],
        ReconcileOutcome::Downloaded | ReconcileOutcome::UpToDate
    ));
    assert_eq!(remote.library_gets.load(Ordering::SeqCst), 1);
    assert_eq!(store.elements().count().unwrap(), 1);
}

fn content(store: &LocalStore) -> Vec<(String, String, bool)> {
    let (elements, diagrams) = snapshot(store);
    elements
        .into_iter()
        .chain(diagrams)
        .map(|(id, name, local, _)| (id, name, local))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_alongside_collection_syncs_reaches_same_content() {
    let blob_at = "2024-04-01T00:00:00.000Z";
    let ledger_at = "2024-04-02T00:00:00.000Z";

    let mut stores = Vec::new();
    for concurrent in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .set_last_synced(
                "alice",
                symbol_library_sync::storage::LedgerKind::Library,
                symbol_library_sync::models::entity::parse_timestamp(ledger_at).unwrap(),
            )
            .unwrap();
        let (store, remote) = prepare();
        remote.set_library(library_document(vec![], vec![], blob_at));
        let (elements, diagrams) = syncs(&store, &remote);
        let reconciler = LibraryReconciler::new(
            store.clone(),
            remote.as_remote(),
            ledger,
            SyncEvents::new(),
        );

        if concurrent {
            let (_, _, outcome) = tokio::join!(
                elements.sync("alice"),
                diagrams.sync("alice"),
                reconciler.reconcile_user_library("alice")
            );
            assert_eq!(outcome, ReconcileOutcome::Uploaded);
        } else {
            elements.sync("alice").await;
            diagrams.sync("alice").await;
            assert_eq!(
                reconciler.reconcile_user_library("alice").await,
                ReconcileOutcome::Uploaded
            );
        }
        // No device-local row ever reaches the blob.
        let put = remote.last_put().unwrap();
        assert!(!put.data["elements"].to_string().contains("\"g9\""));
        stores.push(store);
    }

    assert_eq!(content(&stores[0]), content(&stores[1]));
}
