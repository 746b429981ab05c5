//! First-run seeding of default graphic elements.
//!
//! Runs only when the element collection is empty. Bundled defaults are
//! merged with the server's defaults (server entries win by id) and stored as
//! device-local rows so they never travel back through the sync paths.

use super::error::SyncError;
use super::remote_service::RemoteService;
use crate::models::{EntityKind, GraphicElement, SyncEntity};
use crate::storage::EntityStore;
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_AUTHOR: &str = "system";

pub struct Seeder {
    store: EntityStore<GraphicElement>,
    remote: Arc<dyn RemoteService>,
    bundled: Vec<GraphicElement>,
}

impl Seeder {
    pub fn new(
        store: EntityStore<GraphicElement>,
        remote: Arc<dyn RemoteService>,
        bundled: Vec<GraphicElement>,
    ) -> Self {
        Self {
            store,
            remote,
            bundled,
        }
    }

    /// Seed defaults when no element exists yet. Returns the number of rows written.
    pub async fn seed_if_empty(&self) -> Result<usize, SyncError> {
        if self.store.count()? > 0 {
            return Ok(0);
        }

        let mut defaults = self.bundled.clone();
        match self.remote.fetch_defaults(EntityKind::GraphicElement).await {
            Ok(rows) => {
                for raw in rows {
                    match serde_json::from_value::<GraphicElement>(raw) {
                        Ok(row) if !row.id.is_empty() => upsert_by_id(&mut defaults, row),
                        Ok(_) => warn!("Ignoring server default element without id"),
                        Err(e) => warn!("Ignoring unreadable server default element: {}", e),
                    }
                }
            }
            Err(e) => warn!("Server defaults unavailable, seeding bundled set only: {}", e),
        }

        let mut written = 0;
        for mut element in defaults {
            element.set_local(true);
            element.set_hidden(false);
            self.store.import(element)?;
            written += 1;
        }
        info!("Seeded {} default graphic elements", written);
        Ok(written)
    }
}

fn upsert_by_id(defaults: &mut Vec<GraphicElement>, row: GraphicElement) {
    match defaults.iter_mut().find(|existing| existing.id == row.id) {
        Some(existing) => *existing = row,
        None => defaults.push(row),
    }
}

/// Basic shapes shipped with the application.
pub fn bundled_defaults() -> Vec<GraphicElement> {
    let shape = |id: &str, name: &str, svg: &str| GraphicElement {
        created_by: Some(SYSTEM_AUTHOR.to_string()),
        ..GraphicElement::new(name, "basic", svg).with_id(id)
    };

    vec![
        shape(
            "default-rectangle",
            "Rectangle",
            r#"<svg viewBox="0 0 100 60"><rect x="1" y="1" width="98" height="58" fill="none" stroke="black"/></svg>"#,
        ),
        shape(
            "default-ellipse",
            "Ellipse",
            r#"<svg viewBox="0 0 100 60"><ellipse cx="50" cy="30" rx="49" ry="29" fill="none" stroke="black"/></svg>"#,
        ),
        shape(
            "default-diamond",
            "Diamond",
            r#"<svg viewBox="0 0 100 100"><polygon points="50,1 99,50 50,99 1,50" fill="none" stroke="black"/></svg>"#,
        ),
    ]
}
