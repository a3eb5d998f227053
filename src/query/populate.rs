//! Reference population: replaces id references with the referenced
//! documents, resolved through the referenced entity's routed model.

use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::filter::{FilterData, Projection};
use crate::model::{EntitySchema, ModelError, ModelRegistry};
use crate::store::{document_id, Document};

/// One expansion instruction, possibly with nested expansions
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatePath {
    pub path: String,
    pub select: Option<Value>,
    pub populate: Vec<PopulatePath>,
}

impl PopulatePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), select: None, populate: vec![] }
    }

    /// Accepts `"a b"`, `"a,b"`, dotted `"a.b"` (nested), `{ path, select?, populate? }`
    /// or an array of any of these. Anything else yields no paths.
    pub fn parse(value: &Value) -> Vec<PopulatePath> {
        match value {
            Value::String(s) => s
                .split([',', ' '])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(Self::dotted)
                .collect(),
            Value::Array(items) => items.iter().flat_map(Self::parse).collect(),
            Value::Object(obj) => {
                let Some(path) = obj.get("path").and_then(Value::as_str) else {
                    debug!("Ignoring populate entry without a path");
                    return vec![];
                };
                let mut entry = Self::dotted(path);
                let leaf = entry.leaf_mut();
                leaf.select = obj.get("select").cloned();
                if let Some(nested) = obj.get("populate") {
                    leaf.populate.extend(Self::parse(nested));
                }
                vec![entry]
            }
            _ => vec![],
        }
    }

    fn dotted(path: &str) -> PopulatePath {
        match path.split_once('.') {
            Some((head, rest)) => PopulatePath { path: head.to_string(), select: None, populate: vec![Self::dotted(rest)] },
            None => PopulatePath::new(path),
        }
    }

    fn leaf_mut(&mut self) -> &mut PopulatePath {
        if self.populate.len() == 1 {
            // Only dotted() builds single-child chains here
            return self.populate[0].leaf_mut();
        }
        self
    }
}

/// Expand `paths` on `docs`. Paths that are not reference fields of
/// `schema` are ignored; missing targets become `null`.
pub fn populate<'a>(
    registry: &'a ModelRegistry,
    schema: &'a EntitySchema,
    docs: Vec<Document>,
    paths: &'a [PopulatePath],
) -> BoxFuture<'a, Result<Vec<Document>, ModelError>> {
    Box::pin(async move {
        let mut docs = docs;
        for path in paths {
            let Some(target_entity) = schema.reference(&path.path) else {
                debug!("Ignoring unknown populate path '{}' on {}", path.path, schema.name());
                continue;
            };

            let ids = collect_ids(&docs, &path.path);
            if ids.is_empty() {
                continue;
            }

            let target = registry.get_model(target_entity).await?;
            let related = target.find(&FilterData::matching(json!({ "id": { "$in": ids } }))).await?;
            let related = populate(registry, target.schema(), related, &path.populate).await?;

            let projection = match &path.select {
                Some(select) => Projection::parse(select)?,
                None => None,
            };
            let by_id: HashMap<String, Value> = related
                .into_iter()
                .filter_map(|doc| {
                    let id = document_id(&doc)?.to_string();
                    let doc = match &projection {
                        Some(p) => p.apply(doc),
                        None => doc,
                    };
                    Some((id, Value::Object(doc)))
                })
                .collect();

            for doc in docs.iter_mut() {
                if let Some(value) = doc.get_mut(&path.path) {
                    substitute(value, &by_id);
                }
            }
        }
        Ok(docs)
    })
}

fn collect_ids(docs: &[Document], field: &str) -> Vec<String> {
    let mut ids: Vec<String> = docs
        .iter()
        .filter_map(|doc| doc.get(field))
        .flat_map(|value| match value {
            Value::String(id) => vec![id.clone()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => vec![],
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

fn substitute(value: &mut Value, by_id: &HashMap<String, Value>) {
    match value {
        Value::String(id) => {
            *value = by_id.get(id.as_str()).cloned().unwrap_or(Value::Null);
        }
        Value::Array(items) => {
            let expanded: Vec<Value> = items
                .iter()
                .filter_map(|item| item.as_str().and_then(|id| by_id.get(id)).cloned())
                .collect();
            *items = expanded;
        }
        _ => {}
    }
}
