use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{apply_patch, document_id, ensure_id, Document, DocumentStore, StoreError};
use crate::filter::matcher;
use crate::filter::{validate_collection_name, FilterData, FilterNode, FilterOrder, FilterWhere, Projection};

/// In-process store. Collections keep insertion order, which is the
/// creation order the query engine sorts by default.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_where(where_clause: &Value) -> Result<Option<FilterNode>, StoreError> {
        Ok(FilterWhere::parse(where_clause)?)
    }

    fn is_match(node: &Option<FilterNode>, doc: &Document) -> bool {
        node.as_ref().map_or(true, |n| matcher::matches(n, doc))
    }

    fn check_name(collection: &str) -> Result<(), StoreError> {
        validate_collection_name(collection).map_err(|e| StoreError::InvalidCollection(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        Self::check_name(collection)?;
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Document, StoreError> {
        Self::check_name(collection)?;
        let id = ensure_id(&mut doc)?;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| document_id(d) == Some(id.as_str())) {
            return Err(StoreError::Conflict(format!("duplicate id {} in {}", id, collection)));
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn find(&self, collection: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError> {
        Self::check_name(collection)?;
        let node = match &filter.where_clause {
            Some(w) => Self::parse_where(w)?,
            None => None,
        };
        let order = match &filter.order {
            Some(o) => FilterOrder::validate_and_parse(o)?,
            None => vec![],
        };
        let projection = match &filter.select {
            Some(fields) => Projection::from_fields(fields)?,
            None => None,
        };

        let mut matched: Vec<Document> = {
            let collections = self.collections.read().await;
            collections
                .get(collection)
                .map(|docs| docs.iter().filter(|d| Self::is_match(&node, d)).cloned().collect())
                .unwrap_or_default()
        };

        FilterOrder::sort_documents(&mut matched, &order);

        let offset = usize::try_from(filter.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = filter.limit.map(|l| usize::try_from(l).unwrap_or(usize::MAX)).unwrap_or(usize::MAX);
        let page = matched.into_iter().skip(offset).take(limit);

        Ok(match projection {
            Some(p) => page.map(|d| p.apply(d)).collect(),
            None => page.collect(),
        })
    }

    async fn count(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        Self::check_name(collection)?;
        let node = Self::parse_where(where_clause)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| Self::is_match(&node, d)).count() as u64)
            .unwrap_or(0))
    }

    async fn update_one(
        &self,
        collection: &str,
        where_clause: &Value,
        patch: &Value,
    ) -> Result<Option<Document>, StoreError> {
        Self::check_name(collection)?;
        let node = Self::parse_where(where_clause)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(doc) = docs.iter_mut().find(|d| Self::is_match(&node, d)) else {
            return Ok(None);
        };

        // Patch a copy so a failing operator leaves the stored document untouched
        let mut updated = doc.clone();
        apply_patch(&mut updated, patch)?;
        *doc = updated.clone();
        Ok(Some(updated))
    }

    async fn replace_one(&self, collection: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        Self::check_name(collection)?;
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("replace requires an id".to_string()))?
            .to_string();
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        match docs.iter_mut().find(|d| document_id(d) == Some(id.as_str())) {
            Some(existing) => {
                *existing = doc.clone();
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    async fn delete_one(&self, collection: &str, where_clause: &Value) -> Result<Option<Document>, StoreError> {
        Self::check_name(collection)?;
        let node = Self::parse_where(where_clause)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|d| Self::is_match(&node, d))
            .map(|index| docs.remove(index)))
    }

    async fn delete_many(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        Self::check_name(collection)?;
        let node = Self::parse_where(where_clause)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !Self::is_match(&node, d));
        Ok((before - docs.len()) as u64)
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
