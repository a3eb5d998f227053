use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cache::{CacheKey, ModelCache};
use super::{EntitySchema, Model, ModelError, Routing, TenantModel};
use crate::config::AppConfig;
use crate::context;
use crate::plugins::PluginOptions;
use crate::query::QueryOptions;
use crate::store::DocumentStore;
use crate::tenant::TenantId;

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub max_models: usize,
    pub plugins: PluginOptions,
    pub query: QueryOptions,
}

impl RegistryOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_models: config.cache.max_models,
            plugins: PluginOptions::from_config(&config.plugins),
            query: QueryOptions::from_config(&config.query),
        }
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self { max_models: 256, plugins: PluginOptions::default(), query: QueryOptions::default() }
    }
}

/// Entity schemas plus the `(entity, tenant)` binding cache.
///
/// Schemas are registered during startup, before the registry is shared.
pub struct ModelRegistry {
    store: Arc<dyn DocumentStore>,
    schemas: HashMap<String, Arc<EntitySchema>>,
    cache: ModelCache,
    plugin_options: Arc<PluginOptions>,
    query_options: QueryOptions,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, options: RegistryOptions) -> Self {
        Self {
            store,
            schemas: HashMap::new(),
            cache: ModelCache::new(options.max_models),
            plugin_options: Arc::new(options.plugins),
            query_options: options.query,
        }
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<(), ModelError> {
        schema.validate()?;
        let name = schema.name().to_string();
        if self.schemas.contains_key(&name) {
            return Err(ModelError::DuplicateEntity(name));
        }
        info!("Registered entity {} ({:?}, stages {:?})", name, schema.routing(), schema.stages());
        self.schemas.insert(name, Arc::new(schema));
        Ok(())
    }

    /// Look up a schema by entity name, falling back to a case-insensitive
    /// match on the name or its collection plural
    pub fn schema(&self, entity: &str) -> Result<&Arc<EntitySchema>, ModelError> {
        if let Some(schema) = self.schemas.get(entity) {
            return Ok(schema);
        }
        let wanted = entity.to_ascii_lowercase();
        self.schemas
            .values()
            .find(|s| s.name().to_ascii_lowercase() == wanted || super::pluralize(s.name()) == wanted)
            .ok_or_else(|| ModelError::UnknownEntity(entity.to_string()))
    }

    pub fn entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Binding for `entity` under the ambient tenant, compiled on first use
    pub async fn get_model(&self, entity: &str) -> Result<Arc<TenantModel>, ModelError> {
        let schema = self.schema(entity)?;
        let tenant = match schema.routing() {
            Routing::Tenant => context::current_tenant(),
            Routing::Shared => None,
        };
        let key: CacheKey = (schema.name().to_string(), tenant.clone());
        self.cache.get_or_compile(key, || self.compile(schema.clone(), tenant)).await
    }

    async fn compile(&self, schema: Arc<EntitySchema>, tenant: Option<TenantId>) -> Result<TenantModel, ModelError> {
        let model = TenantModel::new(schema, tenant, self.store.clone(), self.plugin_options.clone());
        self.store.ensure_collection(model.collection()).await?;
        info!(
            "Compiled model {} -> {} ({} backend)",
            model.entity(),
            model.collection(),
            self.store.backend()
        );
        Ok(model)
    }

    /// Entity handle that resolves its binding on every call
    pub fn model(self: &Arc<Self>, entity: &str) -> Result<Model, ModelError> {
        let schema = self.schema(entity)?;
        Ok(Model::new(self.clone(), schema.name().to_string()))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query_options
    }

    pub fn plugin_options(&self) -> &PluginOptions {
        &self.plugin_options
    }

    pub async fn cached_models(&self) -> usize {
        self.cache.len().await
    }

    /// Compilations started since startup; stays flat while the cache is warm
    pub fn compilations(&self) -> u64 {
        self.cache.compilations()
    }

    pub fn evictions(&self) -> u64 {
        self.cache.evictions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry(max_models: usize) -> Arc<ModelRegistry> {
        let mut registry = ModelRegistry::new(
            Arc::new(MemoryStore::new()),
            RegistryOptions { max_models, ..Default::default() },
        );
        registry.register(EntitySchema::builder("Absence").build()).unwrap();
        registry.register(EntitySchema::builder("Classroom").build()).unwrap();
        registry.register(EntitySchema::builder("Customer").shared().build()).unwrap();
        Arc::new(registry)
    }

    fn tenant(raw: &str) -> TenantId {
        TenantId::sanitize(raw).unwrap()
    }

    #[tokio::test]
    async fn duplicate_entity_is_rejected() {
        let mut registry = ModelRegistry::new(Arc::new(MemoryStore::new()), RegistryOptions::default());
        registry.register(EntitySchema::builder("User").build()).unwrap();
        assert!(matches!(
            registry.register(EntitySchema::builder("User").build()),
            Err(ModelError::DuplicateEntity(_))
        ));
    }

    #[tokio::test]
    async fn resolves_by_name_or_plural() {
        let registry = registry(8);
        assert_eq!(registry.schema("absences").unwrap().name(), "Absence");
        assert_eq!(registry.schema("classroom").unwrap().name(), "Classroom");
        assert!(matches!(registry.schema("Nope"), Err(ModelError::UnknownEntity(_))));
    }

    #[tokio::test]
    async fn same_key_returns_identical_binding() {
        let registry = registry(8);
        let (a, b) = context::run(Some(tenant("school-a")), async {
            (registry.get_model("Absence").await.unwrap(), registry.get_model("Absence").await.unwrap())
        })
        .await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.collection(), "school-a_absences");
        assert_eq!(registry.compilations(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_compiles_once() {
        let registry = registry(8);
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(context::run(Some(tenant("school-b")), async move {
                    registry.get_model("Absence").await.unwrap()
                }))
            })
            .collect();
        let models: Vec<Arc<TenantModel>> = futures::future::try_join_all(tasks).await.unwrap();
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.compilations(), 1);
    }

    #[tokio::test]
    async fn shared_entities_ignore_tenant() {
        let registry = registry(8);
        let routed = context::run(Some(tenant("school-a")), registry.get_model("Customer")).await.unwrap();
        let plain = registry.get_model("Customer").await.unwrap();
        assert!(Arc::ptr_eq(&routed, &plain));
        assert_eq!(plain.collection(), "customers");
    }

    #[tokio::test]
    async fn eviction_skips_bindings_in_use() {
        let registry = registry(2);
        let held = context::run(Some(tenant("t1")), registry.get_model("Absence")).await.unwrap();
        for t in ["t2", "t3", "t4"] {
            context::run(Some(tenant(t)), registry.get_model("Absence")).await.unwrap();
        }
        assert!(registry.cached_models().await <= 2);
        assert!(registry.evictions() >= 2);

        // The held binding survived eviction: resolving it again returns the same Arc
        let again = context::run(Some(tenant("t1")), registry.get_model("Absence")).await.unwrap();
        assert!(Arc::ptr_eq(&held, &again));
    }
}
