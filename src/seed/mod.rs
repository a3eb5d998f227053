//! Idempotent per-tenant seeding from a fixture file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::context;
use crate::model::{ModelError, ModelRegistry};
use crate::store::Document;
use crate::tenant::{CustomerRegistry, TenantError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read fixtures {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fixture file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Documents for one entity, inserted in file order
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureSet {
    pub entity: String,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Fixture file: a list of entity sets, seeded in order so referenced
/// entities can come first. YAML or JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Fixtures(pub Vec<FixtureSet>);

impl Fixtures {
    pub fn parse(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySeed {
    pub entity: String,
    pub collection: String,
    pub inserted: usize,
    /// Collection already had documents
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedReport {
    pub tenant: String,
    pub entities: Vec<EntitySeed>,
}

/// Seed `slug`'s collections. Each entity whose routed collection already
/// holds documents is left alone, so re-running is harmless.
pub async fn seed_tenant(
    registry: &ModelRegistry,
    customers: &CustomerRegistry,
    slug: &str,
    fixtures: &Fixtures,
) -> Result<SeedReport, SeedError> {
    let tenant = customers.resolve(slug).await?;
    let label = tenant.to_string();

    context::run(Some(tenant), async {
        let mut entities = Vec::with_capacity(fixtures.0.len());
        for set in &fixtures.0 {
            let model = registry.get_model(&set.entity).await?;
            let existing = model.count(&Value::Null).await?;
            if existing > 0 {
                info!("Seed skipped {}: {} already has {} documents", set.entity, model.collection(), existing);
                entities.push(EntitySeed {
                    entity: set.entity.clone(),
                    collection: model.collection().to_string(),
                    inserted: 0,
                    skipped: true,
                });
                continue;
            }

            let created = model.insert_many(set.documents.clone()).await?;
            info!("Seeded {} {} documents into {}", created.len(), set.entity, model.collection());
            entities.push(EntitySeed {
                entity: set.entity.clone(),
                collection: model.collection().to_string(),
                inserted: created.len(),
                skipped: false,
            });
        }
        Ok::<_, SeedError>(SeedReport { tenant: label, entities })
    })
    .await
}
