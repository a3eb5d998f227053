use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{EntitySchema, ModelError};
use crate::filter::FilterData;
use crate::plugins::{HookContext, PluginOptions, PluginPipeline};
use crate::store::{document_id, ensure_id, now_timestamp, Document, DocumentStore};
use crate::tenant::TenantId;

/// An entity schema bound to one physical collection.
///
/// Bindings are compiled and cached by the registry; callers normally reach
/// them through [`super::Model`], which re-resolves the binding per call.
pub struct TenantModel {
    schema: Arc<EntitySchema>,
    collection: String,
    tenant: Option<TenantId>,
    store: Arc<dyn DocumentStore>,
    pipeline: PluginPipeline,
    options: Arc<PluginOptions>,
}

impl TenantModel {
    pub(crate) fn new(
        schema: Arc<EntitySchema>,
        tenant: Option<TenantId>,
        store: Arc<dyn DocumentStore>,
        options: Arc<PluginOptions>,
    ) -> Self {
        let collection = schema.collection_for(tenant.as_ref());
        let pipeline = PluginPipeline::new(schema.plugins().to_vec(), options.hook_timeout);
        Self { schema, collection, tenant, store, pipeline, options }
    }

    pub fn entity(&self) -> &str {
        self.schema.name()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    fn hooks(&self) -> HookContext<'_> {
        HookContext {
            entity: self.schema.name(),
            collection: &self.collection,
            tenant: self.tenant.as_ref(),
            store: &self.store,
            options: &self.options,
        }
    }

    pub async fn create(&self, doc: Document) -> Result<Document, ModelError> {
        let mut doc = doc;
        ensure_id(&mut doc)?;
        let now = now_timestamp();
        doc.entry("created_at").or_insert_with(|| Value::String(now.clone()));
        doc.insert("updated_at".to_string(), Value::String(now));

        let hooks = self.hooks();
        self.pipeline.before_save(&hooks, &mut doc, None).await?;
        let stored = self.store.insert_one(&self.collection, doc).await?;
        debug!("Created {} {:?} in {}", self.entity(), document_id(&stored), self.collection);

        let out = self.pipeline.transform(stored);
        self.pipeline.after_save(&hooks, &out, true).await;
        Ok(out)
    }

    /// Create each document in order; stops at the first failure
    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, ModelError> {
        let mut created = Vec::with_capacity(docs.len());
        for doc in docs {
            created.push(self.create(doc).await?);
        }
        Ok(created)
    }

    /// Insert a new document or replace the stored one with the same `id`
    pub async fn save(&self, doc: Document) -> Result<Document, ModelError> {
        let previous = match document_id(&doc) {
            Some(id) => self.raw_by_id(id).await?,
            None => None,
        };
        let Some(previous) = previous else {
            return self.create(doc).await;
        };

        let mut doc = doc;
        if let Some(created_at) = previous.get("created_at") {
            doc.insert("created_at".to_string(), created_at.clone());
        }
        doc.insert("updated_at".to_string(), Value::String(now_timestamp()));

        let hooks = self.hooks();
        self.pipeline.before_save(&hooks, &mut doc, Some(&previous)).await?;
        let stored = self
            .store
            .replace_one(&self.collection, doc)
            .await?
            .ok_or_else(|| ModelError::InvalidDocument("document vanished during save".to_string()))?;

        let out = self.pipeline.transform(stored);
        self.pipeline.after_save(&hooks, &out, false).await;
        Ok(out)
    }

    pub async fn find(&self, filter: &FilterData) -> Result<Vec<Document>, ModelError> {
        let docs = self.store.find(&self.collection, filter).await?;
        Ok(docs.into_iter().map(|d| self.pipeline.transform(d)).collect())
    }

    pub async fn find_one(&self, where_clause: Value) -> Result<Option<Document>, ModelError> {
        let filter = FilterData { limit: Some(1), ..FilterData::matching(where_clause) };
        Ok(self.find(&filter).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.find_one(json!({ "id": id })).await
    }

    pub async fn count(&self, where_clause: &Value) -> Result<u64, ModelError> {
        Ok(self.store.count(&self.collection, where_clause).await?)
    }

    /// Patch the first match; returns the updated document
    pub async fn find_one_and_update(&self, where_clause: Value, patch: Value) -> Result<Option<Document>, ModelError> {
        let mut patch = patch;
        let hooks = self.hooks();
        self.pipeline.before_update(&hooks, &mut patch).await?;
        stamp_updated_at(&mut patch)?;

        let Some(updated) = self.store.update_one(&self.collection, &where_clause, &patch).await? else {
            return Ok(None);
        };
        let out = self.pipeline.transform(updated);
        self.pipeline.after_update(&hooks, &out).await;
        Ok(Some(out))
    }

    pub async fn find_by_id_and_update(&self, id: &str, patch: Value) -> Result<Option<Document>, ModelError> {
        self.find_one_and_update(json!({ "id": id }), patch).await
    }

    /// Remove the first match; returns the removed document
    pub async fn delete_one(&self, where_clause: Value) -> Result<Option<Document>, ModelError> {
        let Some(removed) = self.store.delete_one(&self.collection, &where_clause).await? else {
            return Ok(None);
        };
        let out = self.pipeline.transform(removed);
        self.pipeline.after_delete(&self.hooks(), &out).await;
        Ok(Some(out))
    }

    pub async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.delete_one(json!({ "id": id })).await
    }

    /// Bulk delete; per-document hooks do not run
    pub async fn delete_many(&self, where_clause: Value) -> Result<u64, ModelError> {
        Ok(self.store.delete_many(&self.collection, &where_clause).await?)
    }

    async fn raw_by_id(&self, id: &str) -> Result<Option<Document>, ModelError> {
        let filter = FilterData { limit: Some(1), ..FilterData::matching(json!({ "id": id })) };
        Ok(self.store.find(&self.collection, &filter).await?.into_iter().next())
    }
}

impl std::fmt::Debug for TenantModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantModel")
            .field("entity", &self.schema.name())
            .field("collection", &self.collection)
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Add `updated_at` to the patch's `$set`, folding plain keys into it
fn stamp_updated_at(patch: &mut Value) -> Result<(), ModelError> {
    let Some(ops) = patch.as_object_mut() else {
        return Err(ModelError::InvalidDocument("update must be an object".to_string()));
    };

    let plain: Vec<String> = ops.keys().filter(|k| !k.starts_with('$')).cloned().collect();
    let mut set = match ops.remove("$set") {
        Some(Value::Object(set)) => set,
        Some(other) => return Err(ModelError::InvalidDocument(format!("$set requires an object, got {}", other))),
        None => Map::new(),
    };
    for key in plain {
        if let Some(value) = ops.remove(&key) {
            set.insert(key, value);
        }
    }
    set.insert("updated_at".to_string(), Value::String(now_timestamp()));
    ops.insert("$set".to_string(), Value::Object(set));
    Ok(())
}
