use async_trait::async_trait;

use super::{HookContext, PluginError, PluginStage, SchemaPlugin};
use crate::store::Document;

/// Strips internal (`__`-prefixed) and private fields from documents
/// returned to callers. Stored documents keep them: saving a document read
/// back through the model carries the hidden fields over from the stored copy.
pub struct NormalizePlugin {
    private_fields: Vec<String>,
}

impl NormalizePlugin {
    pub fn new(private_fields: Vec<String>) -> Self {
        Self { private_fields }
    }

    fn is_hidden(&self, key: &str) -> bool {
        key.starts_with("__") || self.private_fields.iter().any(|p| p == key)
    }
}

#[async_trait]
impl SchemaPlugin for NormalizePlugin {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Normalize
    }

    async fn before_save(
        &self,
        _ctx: &HookContext<'_>,
        doc: &mut Document,
        previous: Option<&Document>,
    ) -> Result<(), PluginError> {
        let Some(previous) = previous else {
            return Ok(());
        };
        for (key, value) in previous {
            if self.is_hidden(key) && !doc.contains_key(key) {
                doc.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn transform(&self, doc: &mut Document) {
        doc.retain(|key, _| !self.is_hidden(key));
    }
}
