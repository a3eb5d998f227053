//! Schema plugins: ordered lifecycle hooks attached to an entity schema.

pub mod audit;
pub mod creator;
pub mod normalize;
pub mod notification;
pub mod pipeline;

pub use audit::{ActivityRecord, AuditPlugin};
pub use creator::CreatorPlugin;
pub use normalize::NormalizePlugin;
pub use notification::{NotificationAction, NotificationPlugin, NotificationRule};
pub use pipeline::PluginPipeline;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::PluginConfig;
use crate::store::{Document, DocumentStore, StoreError};
use crate::tenant::TenantId;

/// Plugin stages in application order. Stages 2 and 5 are capabilities of
/// the model layer rather than hook handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PluginStage {
    Normalize = 1,     // Output serialization, private fields
    AdvancedQuery = 2, // Paginated query engine
    Creator = 3,       // created_by stamping
    Notification = 4,  // Notification records (side effect)
    TenantRouting = 5, // Collection routing
    Audit = 6,         // Activity log (side effect)
}

impl PluginStage {
    /// Side-effect stages never fail the primary write
    pub fn is_side_effect(&self) -> bool {
        matches!(self, PluginStage::Notification | PluginStage::Audit)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Shared settings handed to every hook
#[derive(Debug, Clone)]
pub struct PluginOptions {
    pub hook_timeout: Duration,
    pub audit_collection: String,
    pub notification_collection: String,
}

impl PluginOptions {
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            hook_timeout: Duration::from_millis(config.hook_timeout_ms),
            audit_collection: config.audit_collection.clone(),
            notification_collection: config.notification_collection.clone(),
        }
    }
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            hook_timeout: Duration::from_secs(5),
            audit_collection: "activity_logs".to_string(),
            notification_collection: "notifications".to_string(),
        }
    }
}

/// What a hook knows about the binding it runs for
pub struct HookContext<'a> {
    pub entity: &'a str,
    pub collection: &'a str,
    pub tenant: Option<&'a TenantId>,
    pub store: &'a Arc<dyn DocumentStore>,
    pub options: &'a PluginOptions,
}

/// Lifecycle hooks. Every hook defaults to a no-op.
///
/// `before_*` hooks may reject the write; `after_*` hooks run once the
/// primary write is stored and their failures are only logged.
#[async_trait]
pub trait SchemaPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> PluginStage;

    /// Overrides the pipeline's hook timeout
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// `previous` is the stored document when saving an existing one, `None` for new documents
    async fn before_save(
        &self,
        _ctx: &HookContext<'_>,
        _doc: &mut Document,
        _previous: Option<&Document>,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn before_update(&self, _ctx: &HookContext<'_>, _patch: &mut Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn after_save(&self, _ctx: &HookContext<'_>, _doc: &Document, _is_new: bool) -> Result<(), PluginError> {
        Ok(())
    }

    async fn after_update(&self, _ctx: &HookContext<'_>, _doc: &Document) -> Result<(), PluginError> {
        Ok(())
    }

    async fn after_delete(&self, _ctx: &HookContext<'_>, _doc: &Document) -> Result<(), PluginError> {
        Ok(())
    }

    /// Output normalization for documents returned to callers
    fn transform(&self, _doc: &mut Document) {}
}

/// Best-effort display name for audit and notification records
pub(crate) fn display_name(doc: &Document) -> String {
    ["name", "title", "full_name", "email"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| doc.get("id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}
