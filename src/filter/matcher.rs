//! In-memory evaluation of parsed filters, used by the memory store.
//! Semantics follow the SQL compiled by `FilterWhere` over JSONB.

use serde_json::Value;
use std::cmp::Ordering;

use super::types::{FilterNode, FilterOp, FilterWhereInfo};
use crate::store::Document;

pub fn matches(node: &FilterNode, doc: &Document) -> bool {
    match node {
        FilterNode::And(children) => children.iter().all(|c| matches(c, doc)),
        FilterNode::Or(children) => children.iter().any(|c| matches(c, doc)),
        FilterNode::Nor(children) => !children.iter().any(|c| matches(c, doc)),
        FilterNode::Not(child) => !matches(child, doc),
        FilterNode::Condition(condition) => matches_condition(condition, doc),
    }
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn matches_condition(condition: &FilterWhereInfo, doc: &Document) -> bool {
    let value = lookup(doc, &condition.column);
    let data = &condition.data;

    match condition.operator {
        FilterOp::Eq => match value {
            None => data.is_null(),
            Some(v) => values_equal(v, data),
        },
        FilterOp::Ne => match value {
            None => !data.is_null(),
            Some(v) => !values_equal(v, data),
        },
        FilterOp::Gt => compare_same_type(value, data) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare_same_type(value, data), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare_same_type(value, data) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare_same_type(value, data), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like | FilterOp::ILike => {
            let (Some(text), Some(pattern)) = (value.and_then(as_text), data.as_str()) else {
                return false;
            };
            if condition.operator == FilterOp::ILike {
                like_match(&pattern.to_lowercase(), &text.to_lowercase())
            } else {
                like_match(pattern, &text)
            }
        }
        FilterOp::In => match (value, data) {
            (None, _) => false,
            (Some(v), Value::Array(candidates)) => candidates.iter().any(|c| values_equal(v, c)),
            (Some(v), single) => values_equal(v, single),
        },
        FilterOp::NIn => match (value, data) {
            (None, _) => true,
            (Some(v), Value::Array(candidates)) => !candidates.iter().any(|c| values_equal(v, c)),
            (Some(v), single) => !values_equal(v, single),
        },
        FilterOp::Between => match data.as_array().map(|v| v.as_slice()) {
            Some([low, high]) => {
                matches!(compare_same_type(value, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare_same_type(value, high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        },
        FilterOp::Exists => value.is_some() == data.as_bool().unwrap_or(true),
        FilterOp::Size => match (value, data.as_u64()) {
            (Some(Value::Array(items)), Some(size)) => items.len() as u64 == size,
            _ => false,
        },
    }
}

/// JSON equality that treats `1` and `1.0` as the same number
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn compare_same_type(value: Option<&Value>, data: &Value) -> Option<Ordering> {
    compare_values(value?, data)
}

/// Ordering between two values of the same JSON type; `None` across types
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                Some(l.cmp(&r))
            } else {
                l.as_f64()?.partial_cmp(&r.as_f64()?)
            }
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Text form used by `$like`, mirroring Postgres' `#>>` extraction
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// SQL LIKE: `%` any run, `_` any single char, `\` escapes
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    like_from(&pattern, &text)
}

fn like_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(rest, &text[skip..])),
        Some(('_', rest)) => !text.is_empty() && like_from(rest, &text[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && like_from(&rest[1..], &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && like_from(rest, &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter_where::FilterWhere;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn check(where_data: Value, d: &Document) -> bool {
        let node = FilterWhere::parse(&where_data).unwrap().unwrap();
        matches(&node, d)
    }

    #[test]
    fn comparison_operators() {
        let d = doc(json!({ "grade": 7, "name": "Ada", "address": { "city": "Oslo" } }));
        assert!(check(json!({ "grade": 7 }), &d));
        assert!(check(json!({ "grade": 7.0 }), &d));
        assert!(check(json!({ "grade": { "$gte": 7, "$lt": 8 } }), &d));
        assert!(!check(json!({ "grade": { "$gt": "6" } }), &d));
        assert!(check(json!({ "address.city": "Oslo" }), &d));
        assert!(check(json!({ "grade": { "$between": [5, 9] } }), &d));
        assert!(check(json!({ "missing": { "$exists": false } }), &d));
        assert!(check(json!({ "missing": null }), &d));
        assert!(check(json!({ "missing": { "$ne": 3 } }), &d));
    }

    #[test]
    fn logical_operators() {
        let d = doc(json!({ "status": "open", "tags": ["a", "b"] }));
        assert!(check(json!({ "$or": [{ "status": "closed" }, { "tags": { "$size": 2 } }] }), &d));
        assert!(check(json!({ "$nor": [{ "status": "closed" }] }), &d));
        assert!(!check(json!({ "$not": { "status": "open" } }), &d));
        assert!(check(json!({ "status": { "$in": ["open", "pending"] } }), &d));
        assert!(check(json!({ "status": { "$nin": ["closed"] } }), &d));
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("a%", "abc"));
        assert!(like_match("%b%", "abc"));
        assert!(like_match("a_c", "abc"));
        assert!(!like_match("a_c", "abbc"));
        assert!(like_match("100\\%", "100%"));
        assert!(!like_match("100\\%", "1000"));
        let d = doc(json!({ "name": "Grace Hopper" }));
        assert!(check(json!({ "name": { "$ilike": "grace%" } }), &d));
        assert!(!check(json!({ "name": { "$like": "grace%" } }), &d));
    }
}
