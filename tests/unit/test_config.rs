//! Unit tests for configuration loading

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use symbol_library_sync::config::{
    DEFAULT_REMOTE_URL, DEFAULT_UPLOAD_DEBOUNCE_MS, SyncConfig,
};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_defaults_without_environment() {
    let config = SyncConfig::from_lookup(lookup(&[]));

    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.remote_url, DEFAULT_REMOTE_URL);
    assert_eq!(
        config.upload_debounce,
        Duration::from_millis(DEFAULT_UPLOAD_DEBOUNCE_MS)
    );
}

#[test]
fn test_values_from_environment() {
    let config = SyncConfig::from_lookup(lookup(&[
        ("LIBRARY_SYNC_REMOTE_URL", "https://sync.example.com/api/v1/"),
        ("LIBRARY_SYNC_DATA_DIR", "/tmp/library"),
        ("LIBRARY_SYNC_UPLOAD_DEBOUNCE_MS", "500"),
        ("LIBRARY_SYNC_HTTP_TIMEOUT_SECS", "10"),
        ("LIBRARY_SYNC_FETCH_RETRY_DELAY_MS", "250"),
    ]));

    assert_eq!(config.remote_url, "https://sync.example.com/api/v1");
    assert_eq!(config.data_dir, PathBuf::from("/tmp/library"));
    assert_eq!(config.upload_debounce, Duration::from_millis(500));
    assert_eq!(config.http_timeout, Duration::from_secs(10));
    assert_eq!(config.fetch_retry_delay, Duration::from_millis(250));
}

#[test]
fn test_invalid_numbers_fall_back_to_defaults() {
    let config = SyncConfig::from_lookup(lookup(&[
        ("LIBRARY_SYNC_UPLOAD_DEBOUNCE_MS", "soon"),
        ("LIBRARY_SYNC_HTTP_TIMEOUT_SECS", "-1"),
    ]));

    assert_eq!(config.upload_debounce, SyncConfig::default().upload_debounce);
    assert_eq!(config.http_timeout, SyncConfig::default().http_timeout);
}

#[test]
fn test_file_locations_live_in_data_dir() {
    let config = SyncConfig {
        data_dir: PathBuf::from("/var/lib/library"),
        ..Default::default()
    };

    assert_eq!(config.database_path(), PathBuf::from("/var/lib/library/library.db"));
    assert_eq!(
        config.ledger_path(),
        PathBuf::from("/var/lib/library/sync-ledger.json")
    );
}
