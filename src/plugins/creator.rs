use async_trait::async_trait;
use serde_json::Value;

use super::{HookContext, PluginError, PluginStage, SchemaPlugin};
use crate::context;
use crate::store::Document;

pub const CREATED_BY: &str = "created_by";

/// Sets `created_by` from the ambient actor once, when a document is first
/// saved. Later saves and updates cannot change it.
pub struct CreatorPlugin;

#[async_trait]
impl SchemaPlugin for CreatorPlugin {
    fn name(&self) -> &'static str {
        "creator"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Creator
    }

    async fn before_save(
        &self,
        _ctx: &HookContext<'_>,
        doc: &mut Document,
        previous: Option<&Document>,
    ) -> Result<(), PluginError> {
        match previous {
            None => {
                if let Some(actor) = context::current_actor() {
                    doc.insert(CREATED_BY.to_string(), Value::String(actor));
                }
            }
            Some(stored) => match stored.get(CREATED_BY) {
                Some(creator) => {
                    doc.insert(CREATED_BY.to_string(), creator.clone());
                }
                None => {
                    doc.remove(CREATED_BY);
                }
            },
        }
        Ok(())
    }

    async fn before_update(&self, _ctx: &HookContext<'_>, patch: &mut Value) -> Result<(), PluginError> {
        let Some(patch) = patch.as_object_mut() else {
            return Ok(());
        };
        if patch.remove(CREATED_BY).is_some() {
            tracing::debug!("Stripped {} from update patch", CREATED_BY);
        }
        for op in ["$set", "$unset", "$inc", "$push"] {
            if let Some(Value::Object(fields)) = patch.get_mut(op) {
                fields.remove(CREATED_BY);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TaskContext;
    use crate::plugins::PluginOptions;
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn stamps_new_documents_with_actor() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let options = PluginOptions::default();
        let ctx = HookContext { entity: "Post", collection: "posts", tenant: None, store: &store, options: &options };

        let mut fresh = doc(json!({ "title": "hello", "created_by": "spoofed" }));
        context::run_with(TaskContext::new(None, Some("teacher-1".to_string())), async {
            CreatorPlugin.before_save(&ctx, &mut fresh, None).await.unwrap();
        })
        .await;
        assert_eq!(fresh["created_by"], json!("teacher-1"));

        // No actor: nothing stamped
        let mut anonymous = doc(json!({ "title": "anon" }));
        CreatorPlugin.before_save(&ctx, &mut anonymous, None).await.unwrap();
        assert!(anonymous.get("created_by").is_none());
    }

    #[tokio::test]
    async fn existing_creator_is_never_overwritten() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let options = PluginOptions::default();
        let ctx = HookContext { entity: "Post", collection: "posts", tenant: None, store: &store, options: &options };

        let stored = doc(json!({ "id": "p1", "created_by": "teacher-1" }));
        let mut edited = doc(json!({ "id": "p1", "created_by": "teacher-2" }));
        context::with_actor("teacher-2", CreatorPlugin.before_save(&ctx, &mut edited, Some(&stored)))
            .await
            .unwrap();
        assert_eq!(edited["created_by"], json!("teacher-1"));

        let mut patch = json!({ "created_by": "x", "$set": { "created_by": "y", "title": "t" } });
        CreatorPlugin.before_update(&ctx, &mut patch).await.unwrap();
        assert_eq!(patch, json!({ "$set": { "title": "t" } }));
    }
}
