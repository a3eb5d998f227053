//! Entity schemas, tenant-bound models and the routed model registry.

pub mod binding;
pub mod cache;
pub mod handle;
pub mod registry;
pub mod schema;

pub use binding::TenantModel;
pub use cache::ModelCache;
pub use handle::Model;
pub use registry::{ModelRegistry, RegistryOptions};
pub use schema::{EntitySchema, FieldDef, Routing, SchemaBuilder};

use thiserror::Error;

use crate::filter::FilterError;
use crate::plugins::PluginError;
use crate::store::StoreError;
use crate::tenant::{TenantError, TenantId};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity already registered: {0}")]
    DuplicateEntity(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Tenant(#[from] TenantError),
}

const UNCOUNTABLE: &[&str] = &[
    "data", "equipment", "feedback", "information", "media", "news", "series", "species", "staff", "status",
];

/// Collection-style plural of an entity name: `Absence` → `absences`,
/// `Activity` → `activities`, `Class` → `classes`.
pub fn pluralize(entity: &str) -> String {
    let word = entity.to_ascii_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&word.as_str()) {
        return word;
    }

    let mut chars = word.chars().rev();
    let last = chars.next();
    let before_last = chars.next();

    match (before_last, last) {
        (Some(prev), Some('y')) if !"aeiou".contains(prev) => format!("{}ies", &word[..word.len() - 1]),
        _ if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) => format!("{}es", word),
        _ => format!("{}s", word),
    }
}

/// Collection used when no tenant is active (or the entity is shared)
pub fn default_collection_name(entity: &str) -> String {
    pluralize(entity)
}

/// `<tenant>_<plural>` for an active tenant, else the default collection
pub fn collection_name(entity: &str, tenant: Option<&TenantId>) -> String {
    match tenant {
        Some(tenant) => format!("{}_{}", tenant.as_str(), pluralize(entity)),
        None => default_collection_name(entity),
    }
}
