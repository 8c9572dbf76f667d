//! In-memory document backend for tests and local development.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use right_water_core::authz::Collection;

use super::{Document, DocumentBackend, Query, StoreError, compare_field};

type Key = (Collection, String);

/// A [`DocumentBackend`] holding everything in a map.
pub struct MemoryBackend {
    documents: RwLock<BTreeMap<Key, Document>>,
    changes: broadcast::Sender<Collection>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            documents: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    fn notify(&self, collection: Collection) {
        // No subscribers is fine.
        let _ = self.changes.send(collection);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object(data: &Value) -> Result<(), StoreError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(
            "document body must be an object".to_owned(),
        ))
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(collection, id.to_owned())).cloned())
    }

    async fn list(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut matched: Vec<Document> = documents
            .values()
            .filter(|doc| doc.collection == query.collection && query.matches(&doc.data))
            .cloned()
            .collect();
        drop(documents);

        if let Some(order) = &query.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_field(a.data.get(&order.field), b.data.get(&order.field))
                    .then_with(|| a.id.cmp(&b.id));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        ensure_object(&data)?;
        let mut documents = self.documents.write().await;
        let key = (collection, id.to_owned());
        if documents.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let document = Document {
            collection,
            id: id.to_owned(),
            data,
            created_at: now,
            updated_at: now,
        };
        documents.insert(key, document.clone());
        drop(documents);
        self.notify(collection);
        Ok(document)
    }

    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        expected: &Value,
        data: Value,
    ) -> Result<Document, StoreError> {
        ensure_object(&data)?;
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&(collection, id.to_owned()))
            .ok_or(StoreError::NotFound)?;
        if document.data != *expected {
            return Err(StoreError::Conflict);
        }
        document.data = data;
        document.updated_at = Utc::now();
        let document = document.clone();
        drop(documents);
        self.notify(collection);
        Ok(document)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let removed = self
            .documents
            .write()
            .await
            .remove(&(collection, id.to_owned()))
            .is_some();
        if removed {
            self.notify(collection);
        }
        Ok(removed)
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }
}
