use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{TenantError, TenantId};
use crate::filter::FilterData;
use crate::store::{Document, DocumentStore, StoreError};

/// Shared collection holding one record per customer (tenant)
pub const CUSTOMER_COLLECTION: &str = "customers";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    /// Raw slug as supplied at registration; what clients send in the header
    pub slug: String,
    /// Sanitized slug; the physical collection-name prefix
    pub collection_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn tenant_id(&self) -> Result<TenantId, TenantError> {
        TenantId::sanitize(&self.collection_prefix)
    }

    fn from_document(doc: Document) -> Result<Self, TenantError> {
        serde_json::from_value(Value::Object(doc)).map_err(|e| TenantError::Store(StoreError::from(e)))
    }

    fn to_document(&self) -> Result<Document, TenantError> {
        match serde_json::to_value(self).map_err(StoreError::from)? {
            Value::Object(map) => Ok(map),
            _ => Err(TenantError::Store(StoreError::InvalidDocument(
                "customer did not serialize to an object".to_string(),
            ))),
        }
    }
}

/// Customer records and the slug → tenant mapping.
///
/// Registration is serialized so two concurrent registrations cannot both
/// claim the same collection prefix.
pub struct CustomerRegistry {
    store: Arc<dyn DocumentStore>,
    register_lock: Mutex<()>,
}

impl CustomerRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, register_lock: Mutex::new(()) }
    }

    /// Register a customer. Fails when the slug is invalid, already taken, or
    /// sanitizes to a prefix another customer already owns.
    pub async fn register(&self, name: &str, slug: &str) -> Result<Customer, TenantError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TenantError::InvalidSlug("Customer name cannot be empty".to_string()));
        }
        let slug = slug.trim();
        let tenant = TenantId::sanitize(slug)?;

        let _guard = self.register_lock.lock().await;
        self.store.ensure_collection(CUSTOMER_COLLECTION).await?;

        if self.find_one(json!({ "slug": slug })).await?.is_some() {
            return Err(TenantError::AlreadyExists(slug.to_string()));
        }
        if let Some(existing) = self.find_one(json!({ "collection_prefix": tenant.as_str() })).await? {
            return Err(TenantError::SlugCollision {
                slug: slug.to_string(),
                existing: existing.slug,
                prefix: tenant.to_string(),
            });
        }

        let customer = Customer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            collection_prefix: tenant.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_one(CUSTOMER_COLLECTION, customer.to_document()?).await?;

        info!("Registered customer '{}' with collection prefix '{}'", customer.slug, customer.collection_prefix);
        Ok(customer)
    }

    /// Exact match on the registered slug. The sanitized prefix is never an
    /// alias: "my.school" does not find the customer registered as "My School".
    pub async fn find_by_slug(&self, raw: &str) -> Result<Option<Customer>, TenantError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        self.find_one(json!({ "slug": raw })).await
    }

    /// Resolve a header-supplied slug to the tenant to run under
    pub async fn resolve(&self, raw: &str) -> Result<TenantId, TenantError> {
        let customer = self
            .find_by_slug(raw)
            .await?
            .ok_or_else(|| TenantError::NotFound(raw.to_string()))?;
        if !customer.is_active {
            return Err(TenantError::Inactive(customer.slug));
        }
        customer.tenant_id()
    }

    pub async fn set_active(&self, slug: &str, active: bool) -> Result<Customer, TenantError> {
        let updated = self
            .store
            .update_one(CUSTOMER_COLLECTION, &json!({ "slug": slug }), &json!({ "$set": { "is_active": active } }))
            .await?
            .ok_or_else(|| TenantError::NotFound(slug.to_string()))?;
        Customer::from_document(updated)
    }

    pub async fn list(&self) -> Result<Vec<Customer>, TenantError> {
        let filter = FilterData { order: Some(json!("slug")), ..Default::default() };
        self.store
            .find(CUSTOMER_COLLECTION, &filter)
            .await?
            .into_iter()
            .map(Customer::from_document)
            .collect()
    }

    async fn find_one(&self, where_clause: Value) -> Result<Option<Customer>, TenantError> {
        let filter = FilterData { limit: Some(1), ..FilterData::matching(where_clause) };
        let mut docs = self.store.find(CUSTOMER_COLLECTION, &filter).await?;
        docs.pop().map(Customer::from_document).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> CustomerRegistry {
        CustomerRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let registry = registry();
        let customer = registry.register("School A", "School-A").await.unwrap();
        assert_eq!(customer.collection_prefix, "school-a");

        assert_eq!(registry.resolve("School-A").await.unwrap().as_str(), "school-a");
        assert!(matches!(registry.resolve("school-a").await, Err(TenantError::NotFound(_))));
        assert!(matches!(registry.resolve("school-b").await, Err(TenantError::NotFound(_))));
    }

    #[tokio::test]
    async fn sanitized_form_is_not_an_alias() {
        let registry = registry();
        registry.register("My School", "My School").await.unwrap();
        assert_eq!(registry.resolve(" My School ").await.unwrap().as_str(), "my_school");
        assert!(matches!(registry.resolve("my.school").await, Err(TenantError::NotFound(_))));
        assert!(matches!(registry.resolve("my_school").await, Err(TenantError::NotFound(_))));
    }

    #[tokio::test]
    async fn colliding_slug_is_rejected() {
        let registry = registry();
        registry.register("My School", "My School").await.unwrap();
        let err = registry.register("Other", "my.school").await.unwrap_err();
        match err {
            TenantError::SlugCollision { existing, prefix, .. } => {
                assert_eq!(existing, "My School");
                assert_eq!(prefix, "my_school");
            }
            other => panic!("expected collision, got {:?}", other),
        }
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let registry = registry();
        registry.register("A", "school-a").await.unwrap();
        assert!(matches!(
            registry.register("A again", "school-a").await,
            Err(TenantError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn inactive_customer_does_not_resolve() {
        let registry = registry();
        registry.register("A", "school-a").await.unwrap();
        registry.set_active("school-a", false).await.unwrap();
        assert!(matches!(registry.resolve("school-a").await, Err(TenantError::Inactive(_))));
    }

    #[tokio::test]
    async fn unusable_slug_is_rejected() {
        let registry = registry();
        assert!(matches!(registry.register("X", "...").await, Err(TenantError::InvalidSlug(_))));
        assert!(registry.find_by_slug("...").await.unwrap().is_none());
    }
}
