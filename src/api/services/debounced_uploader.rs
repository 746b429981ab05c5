//! Debounced whole-library uploads.
//!
//! Each user gets a small worker task fed through a channel. Every
//! `schedule_upload` restarts that worker's quiet-period timer; when the timer
//! runs out the library is uploaded once. A trigger arriving while an upload
//! is running starts a new quiet period afterwards; it never aborts the
//! running upload. A worker that finishes with nothing queued retires and
//! the next trigger spawns a fresh one.

use super::error::SyncError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Something that can push a user's whole library to the remote service.
#[async_trait]
pub trait LibraryUploader: Send + Sync {
    async fn upload_library(&self, username: &str) -> Result<(), SyncError>;
}

struct UploadWorker {
    trigger: mpsc::UnboundedSender<()>,
    pending: Arc<AtomicBool>,
}

type Workers = Mutex<HashMap<String, UploadWorker>>;

pub struct DebouncedUploader {
    uploader: Arc<dyn LibraryUploader>,
    delay: Duration,
    workers: Arc<Workers>,
}

impl DebouncedUploader {
    pub fn new(uploader: Arc<dyn LibraryUploader>, delay: Duration) -> Self {
        Self {
            uploader,
            delay,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the quiet period for `username`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_upload(&self, username: &str) {
        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        let worker = workers
            .entry(username.to_string())
            .or_insert_with(|| self.spawn_worker(username));

        worker.pending.store(true, Ordering::SeqCst);
        if worker.trigger.send(()).is_err() {
            // The worker is gone; replace it.
            let fresh = self.spawn_worker(username);
            fresh.pending.store(true, Ordering::SeqCst);
            let _ = fresh.trigger.send(());
            *worker = fresh;
        }
        debug!("Library upload for {} scheduled in {:?}", username, self.delay);
    }

    /// Whether a quiet-period timer is currently running for `username`.
    pub fn is_pending(&self, username: &str) -> bool {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers
            .get(username)
            .is_some_and(|worker| worker.pending.load(Ordering::SeqCst))
    }

    /// Number of users with a live upload worker.
    pub fn active_workers(&self) -> usize {
        self.workers.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn spawn_worker(&self, username: &str) -> UploadWorker {
        let (trigger, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_worker(
            username.to_string(),
            Arc::clone(&self.uploader),
            self.delay,
            receiver,
            Arc::clone(&pending),
            Arc::downgrade(&self.workers),
        ));
        UploadWorker { trigger, pending }
    }
}

async fn run_worker(
    username: String,
    uploader: Arc<dyn LibraryUploader>,
    delay: Duration,
    mut triggers: mpsc::UnboundedReceiver<()>,
    pending: Arc<AtomicBool>,
    workers: Weak<Workers>,
) {
    while triggers.recv().await.is_some() {
        let mut closed = false;
        loop {
            tokio::select! {
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        closed = true;
                        break;
                    }
                }
                () = tokio::time::sleep(delay) => break,
            }
        }

        pending.store(false, Ordering::SeqCst);
        match uploader.upload_library(&username).await {
            Ok(()) => info!("Debounced library upload for {} completed", username),
            Err(e) => warn!("Debounced library upload for {} failed: {}", username, e),
        }

        if closed || retire(&workers, &username, &pending, &triggers) {
            break;
        }
    }
    debug!("Upload worker for {} stopped", username);
}

/// Remove this worker's entry when nothing is queued.
///
/// Checked under the map lock; `schedule_upload` sends under the same lock, so
/// a trigger is either already queued here or goes to a new worker.
fn retire(
    workers: &Weak<Workers>,
    username: &str,
    pending: &Arc<AtomicBool>,
    triggers: &mpsc::UnboundedReceiver<()>,
) -> bool {
    let Some(shared) = workers.upgrade() else {
        return true;
    };
    let mut workers = shared.lock().unwrap_or_else(|p| p.into_inner());
    if !triggers.is_empty() {
        return false;
    }
    if workers
        .get(username)
        .is_some_and(|worker| Arc::ptr_eq(&worker.pending, pending))
    {
        workers.remove(username);
    }
    true
}
