//! Diagram model.
//!
//! A diagram is a named node/edge graph produced by the editor. The graph
//! payload is opaque here: it is stored and synchronized as serialized strings.

use super::entity::{EntityKind, SyncEntity, content_of, lenient_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Diagram row as stored locally and exchanged with the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagram {
    /// Stable identifier, generated client-side when absent
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Serialized editor nodes
    pub nodes: String,
    /// Serialized editor edges
    pub edges: String,
    #[serde(with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    #[serde(with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    /// Never leaves this device when true
    pub local: bool,
    /// Content matches the last observed remote state
    pub synchronized: bool,
    /// Soft-deleted
    pub hidden: bool,
    /// Fields this build does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Diagram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: "[]".to_string(),
            edges: "[]".to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl SyncEntity for Diagram {
    const KIND: EntityKind = EntityKind::Diagram;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    fn content(&self) -> Value {
        content_of(self)
    }
}
