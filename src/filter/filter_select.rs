use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_where::validate_field_path;
use crate::store::Document;

/// Field projection applied to documents after they leave the store
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// `["name", "grade"]` includes, `["-password"]` excludes; mixing is an error.
    pub fn from_fields(fields: &[String]) -> Result<Option<Self>, FilterError> {
        let fields: Vec<&str> = fields.iter().map(|f| f.trim()).filter(|f| !f.is_empty() && *f != "*").collect();
        if fields.is_empty() {
            return Ok(None);
        }

        let excluded = fields.iter().filter(|f| f.starts_with('-')).count();
        if excluded != 0 && excluded != fields.len() {
            return Err(FilterError::InvalidSelect(
                "Cannot mix inclusion and exclusion in select".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(fields.len());
        for field in &fields {
            let column = field.trim_start_matches(['-', '+']);
            validate_field_path(column)?;
            columns.push(column.to_string());
        }

        Ok(Some(if excluded == 0 {
            Projection::Include(columns)
        } else {
            Projection::Exclude(columns)
        }))
    }

    /// Parse the descriptor form: `"name grade"`, `"name,grade"` or an array
    pub fn parse(select: &Value) -> Result<Option<Self>, FilterError> {
        let fields: Vec<String> = match select {
            Value::Null => return Ok(None),
            Value::String(s) => s.split([',', ' ']).map(str::to_string).collect(),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| FilterError::InvalidSelect(format!("select entries must be strings, got {}", v)))
                })
                .collect::<Result<_, _>>()?,
            other => return Err(FilterError::InvalidSelect(format!("unsupported select {}", other))),
        };
        Self::from_fields(&fields)
    }

    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Projection::Include(columns) => {
                let mut out = Map::new();
                if let Some(id) = doc.get("id") {
                    out.insert("id".to_string(), id.clone());
                }
                for column in columns {
                    copy_path(&doc, &mut out, column);
                }
                out
            }
            Projection::Exclude(columns) => {
                let mut doc = doc;
                for column in columns {
                    remove_path(&mut doc, column);
                }
                doc
            }
        }
    }
}

fn copy_path(source: &Document, target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(v) = source.get(path) {
                target.insert(path.to_string(), v.clone());
            }
        }
        Some((head, rest)) => {
            let Some(Value::Object(inner_source)) = source.get(head) else {
                return;
            };
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(inner_target) = entry {
                copy_path(inner_source, inner_target, rest);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}
