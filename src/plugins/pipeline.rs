use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::{HookContext, PluginError, SchemaPlugin};
use crate::store::Document;

/// Plugins of one schema, kept in stage order. Hooks run inline in the
/// calling task so they observe its ambient context.
#[derive(Clone)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn SchemaPlugin>>,
    hook_timeout: Duration,
}

impl PluginPipeline {
    pub fn new(mut plugins: Vec<Arc<dyn SchemaPlugin>>, hook_timeout: Duration) -> Self {
        // Stable: plugins sharing a stage keep registration order
        plugins.sort_by_key(|p| p.stage());
        for plugin in &plugins {
            tracing::debug!("Registered plugin '{}' at stage {:?}", plugin.name(), plugin.stage());
        }
        Self { plugins, hook_timeout }
    }

    pub async fn before_save(
        &self,
        ctx: &HookContext<'_>,
        doc: &mut Document,
        previous: Option<&Document>,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            let limit = plugin.timeout().unwrap_or(self.hook_timeout);
            guarded(plugin.name(), "before_save", limit, plugin.before_save(ctx, doc, previous)).await?;
        }
        Ok(())
    }

    pub async fn before_update(&self, ctx: &HookContext<'_>, patch: &mut Value) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            let limit = plugin.timeout().unwrap_or(self.hook_timeout);
            guarded(plugin.name(), "before_update", limit, plugin.before_update(ctx, patch)).await?;
        }
        Ok(())
    }

    pub async fn after_save(&self, ctx: &HookContext<'_>, doc: &Document, is_new: bool) {
        for plugin in &self.plugins {
            let limit = plugin.timeout().unwrap_or(self.hook_timeout);
            let result = guarded(plugin.name(), "after_save", limit, plugin.after_save(ctx, doc, is_new)).await;
            swallow(plugin.as_ref(), ctx, "after_save", result);
        }
    }

    pub async fn after_update(&self, ctx: &HookContext<'_>, doc: &Document) {
        for plugin in &self.plugins {
            let limit = plugin.timeout().unwrap_or(self.hook_timeout);
            let result = guarded(plugin.name(), "after_update", limit, plugin.after_update(ctx, doc)).await;
            swallow(plugin.as_ref(), ctx, "after_update", result);
        }
    }

    pub async fn after_delete(&self, ctx: &HookContext<'_>, doc: &Document) {
        for plugin in &self.plugins {
            let limit = plugin.timeout().unwrap_or(self.hook_timeout);
            let result = guarded(plugin.name(), "after_delete", limit, plugin.after_delete(ctx, doc)).await;
            swallow(plugin.as_ref(), ctx, "after_delete", result);
        }
    }

    pub fn transform(&self, mut doc: Document) -> Document {
        for plugin in &self.plugins {
            plugin.transform(&mut doc);
        }
        doc
    }
}

/// Run one hook with timeout protection
async fn guarded<F>(name: &'static str, hook: &'static str, limit: Duration, fut: F) -> Result<(), PluginError>
where
    F: Future<Output = Result<(), PluginError>>,
{
    let started = Instant::now();
    match timeout(limit, fut).await {
        Ok(result) => {
            tracing::trace!("Plugin {}::{} finished in {:?}", name, hook, started.elapsed());
            result
        }
        Err(_) => Err(PluginError::Timeout(format!("Plugin {}::{} timed out after {:?}", name, hook, limit))),
    }
}

/// After-hooks run once the write is stored; a failure is logged and dropped
fn swallow(plugin: &dyn SchemaPlugin, ctx: &HookContext<'_>, hook: &str, result: Result<(), PluginError>) {
    if let Err(error) = result {
        tracing::warn!(
            plugin = plugin.name(),
            entity = ctx.entity,
            collection = ctx.collection,
            "Plugin {} failed, primary write kept: {}",
            hook,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{PluginOptions, PluginStage};
    use crate::store::{DocumentStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        stage: PluginStage,
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SchemaPlugin for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn stage(&self) -> PluginStage {
            self.stage
        }

        async fn before_save(
            &self,
            _ctx: &HookContext<'_>,
            doc: &mut Document,
            _previous: Option<&Document>,
        ) -> Result<(), PluginError> {
            self.log.lock().unwrap().push(self.label);
            doc.insert(self.label.to_string(), json!(true));
            Ok(())
        }

        async fn after_save(&self, _ctx: &HookContext<'_>, _doc: &Document, _is_new: bool) -> Result<(), PluginError> {
            Err(PluginError::Validation("after hooks cannot fail the write".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl SchemaPlugin for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn stage(&self) -> PluginStage {
            PluginStage::Creator
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(10))
        }

        async fn before_update(&self, _ctx: &HookContext<'_>, _patch: &mut Value) -> Result<(), PluginError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    fn context<'a>(store: &'a Arc<dyn DocumentStore>, options: &'a PluginOptions) -> HookContext<'a> {
        HookContext { entity: "User", collection: "users", tenant: None, store, options }
    }

    #[tokio::test]
    async fn hooks_run_in_stage_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let pipeline = PluginPipeline::new(
            vec![
                Arc::new(Recorder { stage: PluginStage::Audit, label: "audit", log: log.clone() }),
                Arc::new(Recorder { stage: PluginStage::Normalize, label: "normalize", log: log.clone() }),
                Arc::new(Recorder { stage: PluginStage::Creator, label: "creator", log: log.clone() }),
            ],
            Duration::from_secs(1),
        );
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let options = PluginOptions::default();
        let ctx = context(&store, &options);

        let mut doc = Document::new();
        pipeline.before_save(&ctx, &mut doc, None).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["normalize", "creator", "audit"]);

        // Failing after-hooks are swallowed
        pipeline.after_save(&ctx, &doc, true).await;
    }

    #[tokio::test]
    async fn slow_hook_times_out() {
        let pipeline = PluginPipeline::new(vec![Arc::new(Slow)], Duration::from_secs(5));
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let options = PluginOptions::default();
        let ctx = context(&store, &options);

        let mut patch = json!({});
        let err = pipeline.before_update(&ctx, &mut patch).await.unwrap_err();
        assert!(matches!(err, PluginError::Timeout(_)));
    }
}
