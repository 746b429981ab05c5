//! Sync engine configuration.
//!
//! Values come from environment variables with sensible defaults; tests
//! build the struct directly.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_REMOTE_URL: &str = "http://localhost:8081/api/v1";
pub const DEFAULT_DATA_DIR: &str = "./library-data";
pub const DEFAULT_UPLOAD_DEBOUNCE_MS: u64 = 2000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FETCH_RETRY_DELAY_MS: u64 = 1000;

const DATABASE_FILE: &str = "library.db";
const LEDGER_FILE: &str = "sync-ledger.json";

/// Runtime configuration for the store, the remote client and the uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the remote service, without trailing slash
    pub remote_url: String,
    /// Directory holding the SQLite store and the ledger file
    pub data_dir: PathBuf,
    /// Quiet period before a debounced library upload fires
    pub upload_debounce: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Delay before retrying a failed collection fetch
    pub fetch_retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            upload_debounce: Duration::from_millis(DEFAULT_UPLOAD_DEBOUNCE_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            fetch_retry_delay: Duration::from_millis(DEFAULT_FETCH_RETRY_DELAY_MS),
        }
    }
}

impl SyncConfig {
    /// Load configuration from `LIBRARY_SYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let remote_url = lookup("LIBRARY_SYNC_REMOTE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.remote_url);

        let data_dir = lookup("LIBRARY_SYNC_DATA_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        Self {
            remote_url,
            data_dir,
            upload_debounce: Duration::from_millis(parse_or(
                &lookup,
                "LIBRARY_SYNC_UPLOAD_DEBOUNCE_MS",
                DEFAULT_UPLOAD_DEBOUNCE_MS,
            )),
            http_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LIBRARY_SYNC_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            fetch_retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "LIBRARY_SYNC_FETCH_RETRY_DELAY_MS",
                DEFAULT_FETCH_RETRY_DELAY_MS,
            )),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

/// Username from the ambient environment (`LIBRARY_SYNC_USERNAME`).
///
/// The engine itself always takes the username as a parameter; only the
/// binary entry point reads it from here.
pub fn ambient_username() -> Option<String> {
    env::var("LIBRARY_SYNC_USERNAME")
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
}
