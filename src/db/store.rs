use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// A schemaless document. Stored documents carry their id under `_id`.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// Minimal document-store client: equality filters and `$set`/`$inc` updates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents of `collection` whose fields equal every field of `filter`.
    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError>;

    /// Stores `document` under a generated id and returns that id.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    /// Applies `update` to the first match of `filter`. Returns whether anything matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<bool, StoreError>;
}

pub fn id_filter(id: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    filter
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

fn operator_fields<'a>(op: &str, value: &'a Value) -> Result<&'a Document, StoreError> {
    value
        .as_object()
        .ok_or_else(|| StoreError::InvalidDocument(format!("{} expects an object", op)))
}

fn apply_update(document: &mut Document, update: &Document) -> Result<(), StoreError> {
    // Validate everything first so a bad update leaves the document untouched.
    for (op, fields) in update {
        match op.as_str() {
            "$set" => {
                let fields = operator_fields(op, fields)?;
                if fields.contains_key(ID_FIELD) {
                    return Err(StoreError::InvalidDocument("_id is immutable".to_string()));
                }
            }
            "$inc" => {
                for (key, delta) in operator_fields(op, fields)? {
                    if !delta.is_number() {
                        return Err(StoreError::InvalidDocument(format!("$inc on {} needs a number", key)));
                    }
                    if let Some(current) = document.get(key) {
                        if !current.is_number() {
                            return Err(StoreError::InvalidDocument(format!("{} is not numeric", key)));
                        }
                    }
                }
            }
            other if other.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(other.to_string()));
            }
            other => {
                return Err(StoreError::InvalidDocument(format!(
                    "update field {} is not an operator",
                    other
                )));
            }
        }
    }

    for (op, fields) in update {
        let fields = operator_fields(op, fields)?;
        match op.as_str() {
            "$set" => {
                for (key, value) in fields {
                    document.insert(key.clone(), value.clone());
                }
            }
            _ => {
                for (key, delta) in fields {
                    let current = document.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                    let sum = current + delta.as_f64().unwrap_or(0.0);
                    let number = Number::from_f64(sum)
                        .ok_or_else(|| StoreError::InvalidDocument(format!("{} overflowed", key)))?;
                    document.insert(key.clone(), Value::Number(number));
                }
            }
        }
    }
    Ok(())
}

/// Process-local store used by the server and the tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| matches(doc, &filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        if document.contains_key(ID_FIELD) {
            return Err(StoreError::InvalidDocument("_id is assigned by the store".to_string()));
        }
        let id = Uuid::new_v4().to_string();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);

        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| matches(doc, &filter)));

        match target {
            Some(document) => {
                apply_update(document, &update)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
