//! Physical document store underneath the tenant-routed models.
//!
//! A collection is a named bag of JSON documents. Backends never know about
//! tenants: routing is finished before a collection name reaches them.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AppConfig, StoreBackend};
use crate::filter::{FilterData, FilterError};

pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Create the collection if it does not exist yet. Idempotent.
    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Insert a document; assigns `id` when absent. Duplicate ids conflict.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Document, StoreError>;

    async fn find(&self, collection: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError>;

    /// Apply `patch` to the first match (creation order) and return the new document
    async fn update_one(
        &self,
        collection: &str,
        where_clause: &Value,
        patch: &Value,
    ) -> Result<Option<Document>, StoreError>;

    /// Replace the stored document with the same `id`
    async fn replace_one(&self, collection: &str, doc: Document) -> Result<Option<Document>, StoreError>;

    /// Remove the first match and return it
    async fn delete_one(&self, collection: &str, where_clause: &Value) -> Result<Option<Document>, StoreError>;

    async fn delete_many(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError>;

    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;
}

/// Build the configured backend
pub async fn connect(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
            let store = PostgresStore::connect(
                url,
                config.store.max_connections,
                Duration::from_secs(config.store.connection_timeout),
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ensure the document carries a string `id`, returning it
pub fn ensure_id(doc: &mut Document) -> Result<String, StoreError> {
    match doc.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        None | Some(Value::Null) => {
            let id = Uuid::new_v4().to_string();
            doc.insert("id".to_string(), Value::String(id.clone()));
            Ok(id)
        }
        Some(other) => Err(StoreError::InvalidDocument(format!("id must be a string, got {}", other))),
    }
}

pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Apply an update patch in place.
///
/// Supports `$set`, `$unset`, `$inc` and `$push`; plain keys are treated as
/// `$set`. `id` can never change.
pub fn apply_patch(doc: &mut Document, patch: &Value) -> Result<(), StoreError> {
    let patch = patch
        .as_object()
        .ok_or_else(|| StoreError::InvalidDocument("update must be an object".to_string()))?;

    for (key, value) in patch {
        match key.as_str() {
            "$set" => {
                for (field, v) in as_object(key, value)? {
                    set_field(doc, field, v.clone());
                }
            }
            "$unset" => {
                for field in as_object(key, value)?.keys() {
                    if field != "id" {
                        doc.remove(field);
                    }
                }
            }
            "$inc" => {
                for (field, v) in as_object(key, value)? {
                    let by = v
                        .as_f64()
                        .ok_or_else(|| StoreError::InvalidDocument(format!("$inc on '{}' needs a number", field)))?;
                    let next = match doc.get(field) {
                        None | Some(Value::Null) => v.clone(),
                        Some(Value::Number(n)) => match (n.as_i64(), v.as_i64()) {
                            (Some(a), Some(b)) => match a.checked_add(b) {
                                Some(sum) => Value::from(sum),
                                None => Value::from(a as f64 + b as f64),
                            },
                            _ => Value::from(n.as_f64().unwrap_or(0.0) + by),
                        },
                        Some(other) => {
                            return Err(StoreError::InvalidDocument(format!(
                                "$inc on non-numeric field '{}' ({})",
                                field, other
                            )))
                        }
                    };
                    set_field(doc, field, next);
                }
            }
            "$push" => {
                for (field, v) in as_object(key, value)? {
                    match doc.entry(field.clone()).or_insert_with(|| Value::Array(vec![])) {
                        Value::Array(items) => items.push(v.clone()),
                        other => {
                            return Err(StoreError::InvalidDocument(format!(
                                "$push on non-array field '{}' ({})",
                                field, other
                            )))
                        }
                    }
                }
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidDocument(format!("unsupported update operator {}", op)))
            }
            field => set_field(doc, field, value.clone()),
        }
    }
    Ok(())
}

fn as_object<'a>(op: &str, value: &'a Value) -> Result<&'a Map<String, Value>, StoreError> {
    value
        .as_object()
        .ok_or_else(|| StoreError::InvalidDocument(format!("{} requires an object", op)))
}

fn set_field(doc: &mut Document, field: &str, value: Value) {
    if field == "id" {
        tracing::warn!("Attempted to change document id via update - ignoring");
        return;
    }
    doc.insert(field.to_string(), value);
}
