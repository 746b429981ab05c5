//! Error taxonomy for the sync services.
//!
//! None of these are fatal for the application: callers log them and leave
//! the affected rows unsynchronized.

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Connect, timeout or transport failure
    #[error("Network failure: {0}")]
    Network(String),
    /// Non-2xx response from the remote service
    #[error("Server rejected request with status {status}: {body}")]
    ServerRejection { status: u16, body: String },
    /// Response body was not the expected JSON shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::MalformedResponse(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Storage(StorageError::Serialization(e.to_string()))
    }
}
