use serde_json::Value;
use std::sync::Arc;

use super::{ModelError, ModelRegistry, TenantModel};
use crate::filter::FilterData;
use crate::query::{self, Paginated, QueryDescriptor};
use crate::store::Document;

/// Caller-facing entity handle.
///
/// Holds no binding: every operation asks the registry for the model routed
/// to the ambient tenant of the task making the call, so one handle can
/// serve any number of tenants.
#[derive(Clone)]
pub struct Model {
    registry: Arc<ModelRegistry>,
    entity: String,
}

impl Model {
    pub(crate) fn new(registry: Arc<ModelRegistry>, entity: String) -> Self {
        Self { registry, entity }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    async fn bound(&self) -> Result<Arc<TenantModel>, ModelError> {
        self.registry.get_model(&self.entity).await
    }

    /// Physical collection the next call would use
    pub async fn collection_name(&self) -> Result<String, ModelError> {
        Ok(self.bound().await?.collection().to_string())
    }

    pub async fn create(&self, doc: Document) -> Result<Document, ModelError> {
        self.bound().await?.create(doc).await
    }

    /// Convenience for `create` with a JSON object literal
    pub async fn create_value(&self, doc: Value) -> Result<Document, ModelError> {
        match doc {
            Value::Object(map) => self.create(map).await,
            other => Err(ModelError::InvalidDocument(format!("expected an object, got {}", other))),
        }
    }

    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, ModelError> {
        self.bound().await?.insert_many(docs).await
    }

    pub async fn save(&self, doc: Document) -> Result<Document, ModelError> {
        self.bound().await?.save(doc).await
    }

    pub async fn find(&self, where_clause: Value) -> Result<Vec<Document>, ModelError> {
        self.bound().await?.find(&FilterData::matching(where_clause)).await
    }

    pub async fn find_with(&self, filter: &FilterData) -> Result<Vec<Document>, ModelError> {
        self.bound().await?.find(filter).await
    }

    pub async fn find_one(&self, where_clause: Value) -> Result<Option<Document>, ModelError> {
        self.bound().await?.find_one(where_clause).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.bound().await?.find_by_id(id).await
    }

    pub async fn count_documents(&self, where_clause: Value) -> Result<u64, ModelError> {
        self.bound().await?.count(&where_clause).await
    }

    pub async fn find_one_and_update(&self, where_clause: Value, patch: Value) -> Result<Option<Document>, ModelError> {
        self.bound().await?.find_one_and_update(where_clause, patch).await
    }

    pub async fn find_by_id_and_update(&self, id: &str, patch: Value) -> Result<Option<Document>, ModelError> {
        self.bound().await?.find_by_id_and_update(id, patch).await
    }

    pub async fn delete_one(&self, where_clause: Value) -> Result<Option<Document>, ModelError> {
        self.bound().await?.delete_one(where_clause).await
    }

    pub async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.bound().await?.find_by_id_and_delete(id).await
    }

    pub async fn delete_many(&self, where_clause: Value) -> Result<u64, ModelError> {
        self.bound().await?.delete_many(where_clause).await
    }

    pub async fn advanced_results(&self, descriptor: &QueryDescriptor) -> Result<Paginated<Document>, ModelError> {
        let model = self.bound().await?;
        query::advanced_results(&self.registry, &model, descriptor).await
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("entity", &self.entity).finish()
    }
}
