use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{display_name, HookContext, PluginError, PluginStage, SchemaPlugin};
use crate::context;
use crate::store::{document_id, now_timestamp, Document, StoreError};

pub type DetailsFn = Arc<dyn Fn(&Document, bool) -> String + Send + Sync>;

/// Immutable activity-log entry in the shared audit collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub entity_name: String,
    pub performed_by: Option<String>,
    pub details: String,
    pub timestamp: String,
}

/// Records create/update/delete of an entity in the shared audit
/// collection, whatever tenant the entity itself is routed to.
pub struct AuditPlugin {
    entity_type: String,
    details: DetailsFn,
}

impl AuditPlugin {
    pub fn new(entity_type: impl Into<String>, details: impl Fn(&Document, bool) -> String + Send + Sync + 'static) -> Self {
        Self { entity_type: entity_type.into(), details: Arc::new(details) }
    }

    async fn record(&self, ctx: &HookContext<'_>, action: &str, doc: &Document, details: String) -> Result<(), PluginError> {
        let record = ActivityRecord {
            action_type: action.to_string(),
            entity_type: self.entity_type.clone(),
            entity_id: document_id(doc).map(str::to_string),
            entity_name: display_name(doc),
            performed_by: context::current_actor(),
            details,
            timestamp: now_timestamp(),
        };
        let serde_json::Value::Object(map) = serde_json::to_value(&record).map_err(StoreError::from)? else {
            return Err(PluginError::Validation("activity record is not an object".to_string()));
        };
        ctx.store.insert_one(&ctx.options.audit_collection, map).await?;
        tracing::debug!("Audit {} {} {:?}", action, self.entity_type, record.entity_id);
        Ok(())
    }
}

#[async_trait]
impl SchemaPlugin for AuditPlugin {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Audit
    }

    async fn after_save(&self, ctx: &HookContext<'_>, doc: &Document, is_new: bool) -> Result<(), PluginError> {
        let action = if is_new { "create" } else { "update" };
        self.record(ctx, action, doc, (self.details)(doc, is_new)).await
    }

    async fn after_update(&self, ctx: &HookContext<'_>, doc: &Document) -> Result<(), PluginError> {
        self.record(ctx, "update", doc, (self.details)(doc, false)).await
    }

    async fn after_delete(&self, ctx: &HookContext<'_>, doc: &Document) -> Result<(), PluginError> {
        let details = format!("Deleted {} {}", self.entity_type, display_name(doc));
        self.record(ctx, "delete", doc, details).await
    }
}
