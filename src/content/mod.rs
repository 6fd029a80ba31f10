//! Content catalogue owned by the content service

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateContentRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author: Option<String>,
}

#[derive(Default)]
struct CatalogInner {
    items: Vec<ContentItem>,
    last_sequence: u64,
}

/// Content items in creation order, ids `C001`, `C002`, ...
#[derive(Clone, Default)]
pub struct ContentCatalog {
    inner: Arc<RwLock<CatalogInner>>,
}

impl ContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue pre-filled with a few items
    pub fn with_samples() -> Self {
        let catalog = Self::new();
        for (title, body) in [
            ("Getting started", "Welcome to the content service."),
            ("Event streaming", "How content events reach analytics."),
            ("Operating Kafka", "Running the broker locally."),
        ] {
            catalog.create(CreateContentRequest {
                title: title.to_string(),
                body: body.to_string(),
                author: Some("editor".to_string()),
            });
        }
        catalog
    }

    pub fn list(&self) -> Vec<ContentItem> {
        self.inner.read().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<ContentItem> {
        self.inner.read().items.iter().find(|item| item.id == id).cloned()
    }

    /// Insert a new item. The request is expected to be validated already.
    pub fn create(&self, request: CreateContentRequest) -> ContentItem {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;

        let item = ContentItem {
            id: format!("C{:03}", inner.last_sequence),
            title: request.title,
            body: request.body,
            author: request.author,
            created_at: Utc::now(),
        };
        inner.items.push(item.clone());
        item
    }

    pub fn delete(&self, id: &str) -> Option<ContentItem> {
        let mut inner = self.inner.write();
        let index = inner.items.iter().position(|item| item.id == id)?;
        Some(inner.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
