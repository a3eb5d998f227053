use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_where::{json_path_expr, validate_field_path};
use super::types::{FilterOrderInfo, SortDirection};
use crate::store::Document;

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts every sort spelling the list endpoints send:
    /// `"created_at:desc,name"`, `"-created_at name"`, `"created_at desc"`,
    /// `["name asc", "-grade"]` and `{ "created_at": "desc", "name": 1 }`.
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => return Err(FilterError::InvalidSort(format!("unexpected sort entry {}", other))),
                    }
                }
                out
            }
            Value::Object(obj) => {
                let mut out = Vec::new();
                for (k, v) in obj {
                    let sort = match v {
                        Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                        Value::Number(_) => SortDirection::Asc,
                        Value::String(s) => Self::parse_direction(s)
                            .ok_or_else(|| FilterError::InvalidSort(format!("unknown direction '{}'", s)))?,
                        other => return Err(FilterError::InvalidSort(format!("unknown direction {}", other))),
                    };
                    out.push(FilterOrderInfo { column: k.clone(), sort });
                }
                out
            }
            other => return Err(FilterError::InvalidSort(format!("unsupported sort spec {}", other))),
        };

        for info in &infos {
            validate_field_path(&info.column)?;
        }
        Ok(infos)
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            match tokens.as_slice() {
                [] => continue,
                // "created_at desc"
                [column, dir] if Self::parse_direction(dir).is_some() => {
                    let sort = Self::parse_direction(dir).unwrap_or(SortDirection::Asc);
                    out.push(FilterOrderInfo { column: column.to_string(), sort });
                }
                tokens => {
                    for token in tokens {
                        out.push(Self::parse_token(token)?);
                    }
                }
            }
        }
        Ok(out)
    }

    /// `-field`, `+field`, `field:desc`, `field`
    fn parse_token(token: &str) -> Result<FilterOrderInfo, FilterError> {
        if let Some((column, dir)) = token.split_once(':') {
            let sort = Self::parse_direction(dir)
                .ok_or_else(|| FilterError::InvalidSort(format!("unknown direction '{}'", dir)))?;
            return Ok(FilterOrderInfo { column: column.to_string(), sort });
        }
        if let Some(column) = token.strip_prefix('-') {
            return Ok(FilterOrderInfo { column: column.to_string(), sort: SortDirection::Desc });
        }
        let column = token.strip_prefix('+').unwrap_or(token);
        Ok(FilterOrderInfo { column: column.to_string(), sort: SortDirection::Asc })
    }

    fn parse_direction(dir: &str) -> Option<SortDirection> {
        match dir.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(SortDirection::Asc),
            "desc" | "descending" | "-1" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    /// ORDER BY clause; `seq` keeps creation order as the final tiebreaker
    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        let mut parts: Vec<String> = infos
            .iter()
            .map(|i| format!("{} {}", json_path_expr(&i.column), i.sort.to_sql()))
            .collect();
        parts.push("\"seq\" ASC".to_string());
        format!("ORDER BY {}", parts.join(", "))
    }

    /// Stable in-memory sort with the same ordering rules as the SQL backend
    pub fn sort_documents(docs: &mut [Document], infos: &[FilterOrderInfo]) {
        if infos.is_empty() {
            return;
        }
        docs.sort_by(|a, b| {
            for info in infos {
                let left = super::matcher::lookup(a, &info.column);
                let right = super::matcher::lookup(b, &info.column);
                let ord = compare_for_sort(left, right);
                let ord = match info.sort {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

/// Missing values first, then JSONB type order: null < string < number <
/// boolean < array < object.
fn compare_for_sort(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => {
            let rank = type_rank(l).cmp(&type_rank(r));
            if rank != Ordering::Equal {
                return rank;
            }
            super::matcher::compare_values(l, r).unwrap_or(Ordering::Equal)
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
