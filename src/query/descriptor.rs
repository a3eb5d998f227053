use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::populate::PopulatePath;
use super::QueryOptions;

/// Generic list-endpoint input: filter, sort, projection, population and paging.
///
/// `page` and `limit` are kept as raw JSON so malformed values can fall back
/// to the defaults instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "sortBy")]
    pub sort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate: Option<Value>,
    /// Filter fragment used verbatim as the where clause
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "filter")]
    pub overrides: Option<Value>,
}

const RESERVED_PARAMS: &[&str] = &["page", "limit", "sort", "sortBy", "select", "fields", "populate", "filter"];

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: impl Into<Value>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<Value>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<Value>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn select(mut self, select: impl Into<Value>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn populate(mut self, populate: impl Into<Value>) -> Self {
        self.populate = Some(populate.into());
        self
    }

    pub fn overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Effective `(page, limit)`: non-numeric or non-positive input falls back
    /// to the defaults, and the limit is capped at `max_limit`. The page is
    /// capped so that `page * limit` fits a signed 64-bit SQL offset.
    pub fn pagination(&self, options: &QueryOptions) -> (u64, u64) {
        let limit = self
            .limit
            .as_ref()
            .and_then(positive_integer)
            .unwrap_or(options.default_limit)
            .clamp(1, options.max_limit.max(1));
        let page = self
            .page
            .as_ref()
            .and_then(positive_integer)
            .unwrap_or(1)
            .min(i64::MAX as u64 / limit);
        (page, limit)
    }

    pub fn populate_paths(&self) -> Vec<PopulatePath> {
        self.populate.as_ref().map(PopulatePath::parse).unwrap_or_default()
    }

    /// Build a descriptor from raw query-string parameters.
    ///
    /// `page`, `limit`, `sort`/`sortBy`, `select`/`fields` and `populate` are
    /// recognised; `filter` may carry a JSON filter object; every other
    /// `key=value` pair becomes an equality in `overrides`.
    pub fn from_query_params(params: &HashMap<String, String>) -> Self {
        let text = |key: &str| params.get(key).map(|v| Value::String(v.clone()));

        let mut overrides = match params.get("filter").map(|raw| serde_json::from_str::<Value>(raw)) {
            Some(Ok(Value::Object(map))) => map,
            Some(_) => {
                tracing::debug!("Ignoring malformed filter query parameter");
                Map::new()
            }
            None => Map::new(),
        };

        let mut keys: Vec<&String> = params.keys().filter(|k| !RESERVED_PARAMS.contains(&k.as_str())).collect();
        keys.sort();
        for key in keys {
            overrides.insert(key.clone(), coerce_scalar(&params[key]));
        }

        Self {
            page: text("page"),
            limit: text("limit"),
            sort: text("sortBy").or_else(|| text("sort")),
            select: text("select").or_else(|| text("fields")),
            populate: text("populate"),
            overrides: (!overrides.is_empty()).then_some(Value::Object(overrides)),
        }
    }
}

fn positive_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                (u > 0).then_some(u)
            } else {
                n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f.floor() as u64)
            }
        }
        Value::String(s) => s.trim().parse::<u64>().ok().filter(|n| *n > 0),
        _ => None,
    }
}

/// Query-string values are text; numbers and booleans are compared typed
fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}
