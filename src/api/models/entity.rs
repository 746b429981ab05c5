//! Shared entity contract for the synchronized collections.
//!
//! Diagrams and graphic elements are structurally parallel; the sync engine,
//! the local store and the sanitizer only talk to them through [`SyncEntity`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// The two synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Diagram,
    GraphicElement,
}

impl EntityKind {
    /// Path segment used by `/collection/{kind}` and `/defaults/{kind}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Diagram => "diagrams",
            EntityKind::GraphicElement => "graphic_elements",
        }
    }

    /// SQLite table holding this collection.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Diagram => "diagrams",
            EntityKind::GraphicElement => "graphic_elements",
        }
    }

    /// Key of this collection inside the library blob `data` object.
    pub fn library_key(&self) -> &'static str {
        match self {
            EntityKind::Diagram => "diagrams",
            EntityKind::GraphicElement => "elements",
        }
    }

    /// Number of extra attempts when fetching the remote collection.
    ///
    /// Only the diagram path retries once.
    pub fn fetch_retries(&self) -> u32 {
        match self {
            EntityKind::Diagram => 1,
            EntityKind::GraphicElement => 0,
        }
    }

    pub fn all() -> [EntityKind; 2] {
        [EntityKind::Diagram, EntityKind::GraphicElement]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour every synchronized row shares.
pub trait SyncEntity:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn name(&self) -> &str;
    fn category(&self) -> Option<&str> {
        None
    }
    fn created_by(&self) -> Option<&str>;

    fn updated_at(&self) -> Option<DateTime<Utc>>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn set_created_at(&mut self, at: DateTime<Utc>);

    fn is_local(&self) -> bool;
    fn set_local(&mut self, local: bool);
    fn is_synchronized(&self) -> bool;
    fn set_synchronized(&mut self, synchronized: bool);
    fn is_hidden(&self) -> bool;
    fn set_hidden(&mut self, hidden: bool);

    /// Fields that make up the user-visible content of the row, as JSON.
    ///
    /// Audit timestamps and the device flags are excluded, so two rows that
    /// differ only in bookkeeping compare equal.
    fn content(&self) -> serde_json::Value;

    /// Assign a fresh UUID when the row has no id yet. Returns true if one was assigned.
    fn ensure_id(&mut self) -> bool {
        if self.id().trim().is_empty() {
            self.set_id(Uuid::new_v4().to_string());
            true
        } else {
            false
        }
    }

    /// `updated_at` as an instant, with missing values at the Unix epoch.
    fn updated_instant(&self) -> DateTime<Utc> {
        self.updated_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Lenient (de)serialization for optional RFC 3339 timestamps.
///
/// `null`, a missing field, a non-string or an unparsable string all become
/// `None`; remote rows with garbage timestamps must still load.
pub mod lenient_timestamp {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&format_timestamp(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(parse_timestamp_value(&raw))
    }
}

/// Keys that never count as row content.
const BOOKKEEPING_FIELDS: [&str; 7] = [
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "local",
    "synchronized",
    "hidden",
];

/// Serialize a row and drop its audit fields and device flags.
pub fn content_of<T: Serialize>(row: &T) -> serde_json::Value {
    let mut value = serde_json::to_value(row).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        for key in BOOKKEEPING_FIELDS {
            map.remove(key);
        }
    }
    value
}

/// Parse an RFC 3339 string into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a JSON value holding a timestamp; anything but a valid string is `None`.
pub fn parse_timestamp_value(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    raw.as_str().and_then(parse_timestamp)
}

/// Canonical wire format: RFC 3339 with a `Z` suffix.
///
/// Sub-second digits are kept to whatever precision the instant carries, so a
/// server timestamp round-trips unchanged.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Fixed-width form with nanosecond digits; lexical order equals time order.
pub fn sortable_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Instant used for merge decisions; unparsable values sort at the epoch.
pub fn instant_or_epoch(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
