use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use super::{display_name, HookContext, PluginError, PluginStage, SchemaPlugin};
use crate::context;
use crate::store::{document_id, now_timestamp, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationAction::Create => "create",
            NotificationAction::Update => "update",
            NotificationAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

pub type TitleFn = Arc<dyn Fn(&Document) -> String + Send + Sync>;

/// One `{ action, title }` entry of the plugin configuration
#[derive(Clone)]
pub struct NotificationRule {
    pub action: NotificationAction,
    pub title: TitleFn,
}

impl NotificationRule {
    pub fn new(action: NotificationAction, title: impl Fn(&Document) -> String + Send + Sync + 'static) -> Self {
        Self { action, title: Arc::new(title) }
    }

    pub fn on_create(title: impl Fn(&Document) -> String + Send + Sync + 'static) -> Self {
        Self::new(NotificationAction::Create, title)
    }

    pub fn on_update(title: impl Fn(&Document) -> String + Send + Sync + 'static) -> Self {
        Self::new(NotificationAction::Update, title)
    }

    pub fn on_delete(title: impl Fn(&Document) -> String + Send + Sync + 'static) -> Self {
        Self::new(NotificationAction::Delete, title)
    }
}

/// Writes a notification record to the shared notification collection for
/// each rule matching the lifecycle point.
pub struct NotificationPlugin {
    rules: Vec<NotificationRule>,
}

impl NotificationPlugin {
    pub fn new(rules: Vec<NotificationRule>) -> Self {
        Self { rules }
    }

    async fn notify(&self, ctx: &HookContext<'_>, action: NotificationAction, doc: &Document) -> Result<(), PluginError> {
        for rule in self.rules.iter().filter(|r| r.action == action) {
            let record = json!({
                "title": (rule.title)(doc),
                "action": action,
                "entity_type": ctx.entity,
                "entity_id": document_id(doc),
                "entity_name": display_name(doc),
                "tenant": ctx.tenant.map(|t| t.as_str()),
                "created_by": context::current_actor(),
                "read": false,
                "created_at": now_timestamp(),
            });
            let Value::Object(record) = record else {
                continue;
            };
            ctx.store.insert_one(&ctx.options.notification_collection, record).await?;
            tracing::debug!("Notification '{}' recorded for {} {}", action, ctx.entity, display_name(doc));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaPlugin for NotificationPlugin {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Notification
    }

    async fn after_save(&self, ctx: &HookContext<'_>, doc: &Document, is_new: bool) -> Result<(), PluginError> {
        let action = if is_new { NotificationAction::Create } else { NotificationAction::Update };
        self.notify(ctx, action, doc).await
    }

    async fn after_update(&self, ctx: &HookContext<'_>, doc: &Document) -> Result<(), PluginError> {
        self.notify(ctx, NotificationAction::Update, doc).await
    }

    async fn after_delete(&self, ctx: &HookContext<'_>, doc: &Document) -> Result<(), PluginError> {
        self.notify(ctx, NotificationAction::Delete, doc).await
    }
}
