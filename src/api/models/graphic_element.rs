//! Graphic element model.
//!
//! Reusable symbol with its SVG markup and connection handles.

use super::entity::{EntityKind, SyncEntity, content_of, lenient_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Graphic element row as stored locally and exchanged with the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicElement {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Free-form grouping tag
    pub category: Option<String>,
    /// SVG markup
    pub svg: String,
    /// Serialized connection-point metadata
    pub handles: Option<String>,
    #[serde(with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    #[serde(with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub local: bool,
    pub synchronized: bool,
    pub hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphicElement {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        svg: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: Some(category.into()),
            svg: svg.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl SyncEntity for GraphicElement {
    const KIND: EntityKind = EntityKind::GraphicElement;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
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
