//! Advanced query engine: one descriptor in, one paginated envelope out.

pub mod descriptor;
pub mod populate;

pub use descriptor::QueryDescriptor;
pub use populate::PopulatePath;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::QueryConfig;
use crate::filter::{FilterData, Projection};
use crate::model::{ModelError, ModelRegistry, TenantModel};
use crate::store::Document;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl QueryOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self { default_limit: config.default_limit.max(1), max_limit: config.max_limit.max(1) }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { default_limit: 10, max_limit: 1000 }
    }
}

/// `{ results, page, limit, totalPages, totalResults }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub results: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_results: u64,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, page: u64, limit: u64, total_results: u64) -> Self {
        let limit = limit.max(1);
        Self {
            results,
            page: page.max(1),
            limit,
            total_pages: total_results.div_ceil(limit).max(1),
            total_results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

/// Run `descriptor` against `model`.
///
/// Count and page are two independent store reads issued concurrently; under
/// concurrent writes they may observe slightly different snapshots.
pub async fn advanced_results(
    registry: &ModelRegistry,
    model: &TenantModel,
    descriptor: &QueryDescriptor,
) -> Result<Paginated<Document>, ModelError> {
    let (page, limit) = descriptor.pagination(registry.query_options());
    let where_clause = descriptor.overrides.clone().filter(|w| !w.is_null());
    let projection = match &descriptor.select {
        Some(select) => Projection::parse(select)?,
        None => None,
    };

    let filter = FilterData {
        select: None,
        where_clause: where_clause.clone(),
        order: descriptor.sort.clone().filter(|s| !s.is_null()),
        limit: Some(limit),
        offset: Some((page - 1).saturating_mul(limit)),
    };
    let count_where = where_clause.unwrap_or(Value::Null);

    debug!(
        "advanced_results on {}: page={} limit={} filter={}",
        model.collection(),
        page,
        limit,
        count_where
    );

    let (total, docs) = tokio::try_join!(model.count(&count_where), model.find(&filter))?;

    let paths = descriptor.populate_paths();
    let docs = populate::populate(registry, model.schema(), docs, &paths).await?;
    let docs = match projection {
        Some(p) => docs.into_iter().map(|d| p.apply(d)).collect(),
        None => docs,
    };

    Ok(Paginated::new(docs, page, limit, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_page_math() {
        let p: Paginated<u8> = Paginated::new(vec![], 1, 10, 0);
        assert_eq!(p.total_pages, 1);
        let p: Paginated<u8> = Paginated::new(vec![], 3, 10, 21);
        assert_eq!(p.total_pages, 3);
        let p: Paginated<u8> = Paginated::new(vec![], 1, 10, 20);
        assert_eq!(p.total_pages, 2);
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let p = Paginated::new(vec![json!({ "id": "1" })], 1, 10, 1);
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({ "results": [{ "id": "1" }], "page": 1, "limit": 10, "totalPages": 1, "totalResults": 1 })
        );
    }
}
