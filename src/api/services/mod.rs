// Services module - sync engine, library reconciler and their collaborators

pub mod collection_sync;
pub mod debounced_uploader;
pub mod error;
pub mod events;
pub mod library_merge;
pub mod library_reconciler;
pub mod library_service;
pub mod remote_service;
pub mod sanitizer;
pub mod seeder;

pub use collection_sync::CollectionSync;
pub use debounced_uploader::{DebouncedUploader, LibraryUploader};
pub use error::SyncError;
pub use events::{ReconcileOutcome, SyncEvent, SyncEvents, SyncReport};
pub use library_reconciler::LibraryReconciler;
pub use library_service::{LibraryService, StartupSummary};
pub use remote_service::{HttpRemoteService, RemoteService};
pub use seeder::{Seeder, bundled_defaults};
