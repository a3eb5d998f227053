use std::sync::Arc;

use super::{collection_name, ModelError};
use crate::plugins::{
    AuditPlugin, CreatorPlugin, NormalizePlugin, NotificationPlugin, NotificationRule, PluginStage, SchemaPlugin,
};
use crate::store::Document;
use crate::tenant::TenantId;

/// Whether an entity follows the ambient tenant or always uses the shared collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Tenant,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    /// Entity this field references by id; enables population
    pub reference: Option<String>,
    /// Hidden from documents returned to callers
    pub private: bool,
}

/// Descriptor of one entity, immutable once registered
pub struct EntitySchema {
    name: String,
    fields: Vec<FieldDef>,
    routing: Routing,
    plugins: Vec<Arc<dyn SchemaPlugin>>,
}

impl EntitySchema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: vec![],
            routing: Routing::Tenant,
            creator: true,
            notifications: vec![],
            audit: None,
            extra: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    pub fn plugins(&self) -> &[Arc<dyn SchemaPlugin>] {
        &self.plugins
    }

    /// Target entity of a reference field
    pub fn reference(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.reference.as_deref())
    }

    /// Applied plugin stages, in application order
    pub fn stages(&self) -> Vec<PluginStage> {
        let mut stages: Vec<PluginStage> = self.plugins.iter().map(|p| p.stage()).collect();
        stages.push(PluginStage::AdvancedQuery);
        if self.routing == Routing::Tenant {
            stages.push(PluginStage::TenantRouting);
        }
        stages.sort();
        stages.dedup();
        stages
    }

    /// Physical collection for the given tenant; shared entities ignore it
    pub fn collection_for(&self, tenant: Option<&TenantId>) -> String {
        match self.routing {
            Routing::Tenant => collection_name(&self.name, tenant),
            Routing::Shared => collection_name(&self.name, None),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ModelError::InvalidSchema(format!("Invalid entity name: '{}'", self.name)));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ModelError::InvalidSchema(format!(
                    "Field '{}' declared twice on {}",
                    field.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("routing", &self.routing)
            .field("stages", &self.stages())
            .finish()
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDef>,
    routing: Routing,
    creator: bool,
    notifications: Vec<NotificationRule>,
    audit: Option<AuditPlugin>,
    extra: Vec<Arc<dyn SchemaPlugin>>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef { name: name.into(), reference: None, private: false });
        self
    }

    /// Field holding the id (or ids) of another entity
    pub fn reference(mut self, name: impl Into<String>, entity: impl Into<String>) -> Self {
        self.fields.push(FieldDef { name: name.into(), reference: Some(entity.into()), private: false });
        self
    }

    pub fn private_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef { name: name.into(), reference: None, private: true });
        self
    }

    /// Keep the entity in its shared collection regardless of tenant
    pub fn shared(mut self) -> Self {
        self.routing = Routing::Shared;
        self
    }

    pub fn without_creator(mut self) -> Self {
        self.creator = false;
        self
    }

    pub fn notify(mut self, rule: NotificationRule) -> Self {
        self.notifications.push(rule);
        self
    }

    pub fn audit(
        mut self,
        entity_type: impl Into<String>,
        details: impl Fn(&Document, bool) -> String + Send + Sync + 'static,
    ) -> Self {
        self.audit = Some(AuditPlugin::new(entity_type, details));
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn SchemaPlugin>) -> Self {
        self.extra.push(plugin);
        self
    }

    pub fn build(self) -> EntitySchema {
        let private_fields = self.fields.iter().filter(|f| f.private).map(|f| f.name.clone()).collect();

        let mut plugins: Vec<Arc<dyn SchemaPlugin>> = vec![Arc::new(NormalizePlugin::new(private_fields))];
        if self.creator {
            plugins.push(Arc::new(CreatorPlugin));
        }
        if !self.notifications.is_empty() {
            plugins.push(Arc::new(NotificationPlugin::new(self.notifications)));
        }
        if let Some(audit) = self.audit {
            plugins.push(Arc::new(audit));
        }
        plugins.extend(self.extra);
        plugins.sort_by_key(|p| p.stage());

        EntitySchema { name: self.name, fields: self.fields, routing: self.routing, plugins }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_has_all_always_on_stages() {
        let schema = EntitySchema::builder("Absence")
            .field("student")
            .reference("classroom", "Classroom")
            .build();
        assert_eq!(
            schema.stages(),
            vec![PluginStage::Normalize, PluginStage::AdvancedQuery, PluginStage::Creator, PluginStage::TenantRouting]
        );
        assert_eq!(schema.reference("classroom"), Some("Classroom"));
        assert_eq!(schema.reference("student"), None);
    }

    #[test]
    fn configured_side_effects_follow_fixed_order() {
        let schema = EntitySchema::builder("Post")
            .audit("post", |_, _| String::new())
            .notify(NotificationRule::on_create(|_| "new post".to_string()))
            .build();
        assert_eq!(
            schema.stages(),
            vec![
                PluginStage::Normalize,
                PluginStage::AdvancedQuery,
                PluginStage::Creator,
                PluginStage::Notification,
                PluginStage::TenantRouting,
                PluginStage::Audit,
            ]
        );
    }

    #[test]
    fn shared_schema_ignores_tenant() {
        let tenant = TenantId::sanitize("school-a").unwrap();
        let shared = EntitySchema::builder("Customer").shared().without_creator().build();
        assert_eq!(shared.collection_for(Some(&tenant)), "customers");
        assert!(!shared.stages().contains(&PluginStage::TenantRouting));

        let routed = EntitySchema::builder("User").build();
        assert_eq!(routed.collection_for(Some(&tenant)), "school-a_users");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(EntitySchema::builder("bad name").build().validate().is_err());
        assert!(EntitySchema::builder("User").field("a").field("a").build().validate().is_err());
    }
}
