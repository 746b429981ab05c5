//! Whole-library document exchanged with `/user-library/{username}`.

use super::entity::{EntityKind, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format version written into `data.version`.
pub const LIBRARY_VERSION: u32 = 1;

/// Library blob as returned by `GET /user-library/{username}`.
///
/// `data` stays an untyped JSON object: keys other than `elements` and
/// `diagrams` belong to other clients and are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl LibraryDocument {
    /// Build a document from already sanitized rows.
    pub fn from_rows(
        elements: Vec<Value>,
        diagrams: Vec<Value>,
        updated_at: Option<String>,
    ) -> Self {
        let mut data = Map::new();
        data.insert("version".to_string(), Value::from(LIBRARY_VERSION));
        data.insert(
            EntityKind::GraphicElement.library_key().to_string(),
            Value::Array(elements),
        );
        data.insert(
            EntityKind::Diagram.library_key().to_string(),
            Value::Array(diagrams),
        );
        Self { data, updated_at }
    }

    /// Rows of one collection; a missing or non-array entry reads as empty.
    pub fn rows(&self, kind: EntityKind) -> &[Value] {
        self.data
            .get(kind.library_key())
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Server timestamp of the blob, `None` when missing or unparsable.
    pub fn updated_instant(&self) -> Option<DateTime<Utc>> {
        self.updated_at.as_deref().and_then(parse_timestamp)
    }
}

/// Body of `PUT /user-library/{username}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryUpload {
    pub username: String,
    pub updated_at: String,
    pub data: Map<String, Value>,
}

/// Response of `PUT /user-library/{username}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryUploadAck {
    #[serde(default)]
    pub updated_at: Option<String>,
}
