use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterNode, FilterOp, FilterWhereInfo};

/// Maximum `$and`/`$or`/`$not` nesting accepted in a WHERE clause
pub const MAX_NESTED_DEPTH: usize = 16;

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Compile a WHERE object to a SQL predicate over the `data` JSONB column.
    /// Every parameter is bound as JSONB.
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let node = Self::parse(where_data)?;
        let mut filter_where = Self::new(starting_param_index);
        let sql = match node {
            Some(node) => filter_where.build_node(&node)?,
            None => "1=1".to_string(),
        };
        Ok((sql, filter_where.param_values))
    }

    /// Parse a WHERE object. `null` and `{}` mean "match everything".
    pub fn parse(where_data: &Value) -> Result<Option<FilterNode>, FilterError> {
        match where_data {
            Value::Null => Ok(None),
            Value::Object(obj) if obj.is_empty() => Ok(None),
            Value::Object(obj) => Self::parse_object(obj, 0).map(Some),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        Self::parse(where_data).map(|_| ())
    }

    fn parse_object(obj: &Map<String, Value>, depth: usize) -> Result<FilterNode, FilterError> {
        if depth > MAX_NESTED_DEPTH {
            return Err(FilterError::TooDeep(MAX_NESTED_DEPTH));
        }

        let mut nodes = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if key.starts_with('$') {
                nodes.push(Self::parse_logical_operator(key, value, depth)?);
            } else {
                nodes.push(Self::parse_field_condition(key, value)?);
            }
        }

        Ok(if nodes.len() == 1 { nodes.remove(0) } else { FilterNode::And(nodes) })
    }

    fn parse_logical_operator(op: &str, value: &Value, depth: usize) -> Result<FilterNode, FilterError> {
        match op {
            "$and" | "$or" | "$nor" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut children = Vec::with_capacity(arr.len());
                for v in arr {
                    let obj = v
                        .as_object()
                        .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} entries must be objects", op)))?;
                    if obj.is_empty() {
                        continue;
                    }
                    children.push(Self::parse_object(obj, depth + 1)?);
                }
                Ok(match op {
                    "$and" => FilterNode::And(children),
                    "$or" => FilterNode::Or(children),
                    _ => FilterNode::Nor(children),
                })
            }
            "$not" => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$not requires object".to_string()))?;
                Ok(FilterNode::Not(Box::new(Self::parse_object(obj, depth + 1)?)))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<FilterNode, FilterError> {
        validate_field_path(field)?;

        let operators = match value {
            Value::Object(obj) if obj.keys().next().map_or(false, |k| k.starts_with('$')) => obj,
            // Implicit equality: { field: value }
            _ => {
                return Ok(FilterNode::Condition(FilterWhereInfo {
                    column: field.to_string(),
                    operator: FilterOp::Eq,
                    data: value.clone(),
                }))
            }
        };

        let mut nodes = Vec::with_capacity(operators.len());
        for (op_key, op_val) in operators {
            if op_key == "$not" {
                let inner = Self::parse_field_condition(field, op_val)?;
                nodes.push(FilterNode::Not(Box::new(inner)));
                continue;
            }
            let operator = FilterOp::from_key(op_key)
                .ok_or_else(|| FilterError::UnsupportedOperator(op_key.to_string()))?;
            Self::validate_operator_data(operator, op_val)?;
            nodes.push(FilterNode::Condition(FilterWhereInfo {
                column: field.to_string(),
                operator,
                data: op_val.clone(),
            }));
        }

        Ok(if nodes.len() == 1 { nodes.remove(0) } else { FilterNode::And(nodes) })
    }

    fn validate_operator_data(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => Ok(()),
                _ => Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())),
            },
            FilterOp::Like | FilterOp::ILike if !data.is_string() => {
                Err(FilterError::InvalidOperatorData("$like/$ilike require a string pattern".to_string()))
            }
            FilterOp::Exists if !data.is_boolean() => {
                Err(FilterError::InvalidOperatorData("$exists requires a boolean".to_string()))
            }
            FilterOp::Size if !data.is_u64() => {
                Err(FilterError::InvalidOperatorData("$size requires a non-negative integer".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn build_node(&mut self, node: &FilterNode) -> Result<String, FilterError> {
        match node {
            FilterNode::And(children) => self.build_group(children, " AND ", "1=1"),
            FilterNode::Or(children) => self.build_group(children, " OR ", "1=0"),
            FilterNode::Nor(children) => {
                let inner = self.build_group(children, " OR ", "1=0")?;
                Ok(format!("NOT {}", inner))
            }
            FilterNode::Not(child) => Ok(format!("NOT ({})", self.build_node(child)?)),
            FilterNode::Condition(condition) => self.build_sql_condition(condition),
        }
    }

    fn build_group(&mut self, children: &[FilterNode], joiner: &str, empty: &str) -> Result<String, FilterError> {
        if children.is_empty() {
            return Ok(empty.to_string());
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(format!("({})", self.build_node(child)?));
        }
        Ok(format!("({})", parts.join(joiner)))
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let column = json_path_expr(&condition.column);
        let text_column = json_text_expr(&condition.column);
        let data = &condition.data;

        Ok(match condition.operator {
            FilterOp::Eq => {
                if data.is_null() {
                    format!("({col} IS NULL OR {col} = 'null'::jsonb)", col = column)
                } else {
                    format!("{} = {}", column, self.param(data.clone()))
                }
            }
            FilterOp::Ne => {
                if data.is_null() {
                    format!("({col} IS NOT NULL AND {col} <> 'null'::jsonb)", col = column)
                } else {
                    format!("({col} IS NULL OR {col} <> {p})", col = column, p = self.param(data.clone()))
                }
            }
            FilterOp::Gt => self.typed_comparison(&column, ">", data),
            FilterOp::Gte => self.typed_comparison(&column, ">=", data),
            FilterOp::Lt => self.typed_comparison(&column, "<", data),
            FilterOp::Lte => self.typed_comparison(&column, "<=", data),
            FilterOp::Like => format!("{} LIKE ({} #>> '{{}}')", text_column, self.param(data.clone())),
            FilterOp::ILike => format!("{} ILIKE ({} #>> '{{}}')", text_column, self.param(data.clone())),
            FilterOp::In => match data {
                Value::Array(values) if values.is_empty() => "1=0".to_string(),
                Value::Array(values) => {
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    format!("{} IN ({})", column, params.join(", "))
                }
                _ => format!("{} = {}", column, self.param(data.clone())),
            },
            FilterOp::NIn => match data {
                Value::Array(values) if values.is_empty() => "1=1".to_string(),
                Value::Array(values) => {
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    format!("({col} IS NULL OR {col} NOT IN ({ps}))", col = column, ps = params.join(", "))
                }
                _ => format!("({col} IS NULL OR {col} <> {p})", col = column, p = self.param(data.clone())),
            },
            FilterOp::Between => {
                let (low, high) = match data.as_array().map(|v| v.as_slice()) {
                    Some([low, high]) => (low.clone(), high.clone()),
                    _ => {
                        return Err(FilterError::InvalidOperatorData(
                            "$between requires exactly 2 values".to_string(),
                        ))
                    }
                };
                let low = self.param(low);
                let high = self.param(high);
                format!(
                    "(jsonb_typeof({col}) = jsonb_typeof({low}) AND {col} BETWEEN {low} AND {high})",
                    col = column,
                    low = low,
                    high = high
                )
            }
            FilterOp::Exists => {
                if data.as_bool().unwrap_or(true) {
                    format!("{} IS NOT NULL", column)
                } else {
                    format!("{} IS NULL", column)
                }
            }
            FilterOp::Size => format!(
                "(jsonb_typeof({col}) = 'array' AND jsonb_array_length({col}) = ({p} #>> '{{}}')::int)",
                col = column,
                p = self.param(data.clone())
            ),
        })
    }

    fn typed_comparison(&mut self, column: &str, op: &str, data: &Value) -> String {
        let p = self.param(data.clone());
        format!(
            "(jsonb_typeof({col}) = jsonb_typeof({p}) AND {col} {op} {p})",
            col = column,
            p = p,
            op = op
        )
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// Field paths are dot-separated identifiers: `name`, `address.city`
pub fn validate_field_path(field: &str) -> Result<(), FilterError> {
    if field.is_empty() {
        return Err(FilterError::InvalidColumn("Column name cannot be empty".to_string()));
    }
    let valid = field.split('.').all(|segment| {
        !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if !valid {
        return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", field)));
    }
    Ok(())
}

/// `"data" #> '{a,b}'` (JSONB value at path). Callers validate the path first.
pub fn json_path_expr(field: &str) -> String {
    format!("\"data\" #> '{{{}}}'", field.replace('.', ","))
}

/// `"data" #>> '{a,b}'` (text value at path)
pub fn json_text_expr(field: &str) -> String {
    format!("\"data\" #>> '{{{}}}'", field.replace('.', ","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality() {
        let (sql, params) = FilterWhere::generate(&json!({ "status": "active" }), 0).unwrap();
        assert_eq!(sql, "\"data\" #> '{status}' = $1");
        assert_eq!(params, vec![json!("active")]);
    }

    #[test]
    fn empty_where_matches_everything() {
        assert_eq!(FilterWhere::generate(&json!({}), 0).unwrap().0, "1=1");
        assert_eq!(FilterWhere::generate(&Value::Null, 0).unwrap().0, "1=1");
    }

    #[test]
    fn params_number_across_nested_groups() {
        let where_data = json!({
            "$or": [
                { "grade": { "$gte": 5 } },
                { "name": { "$ilike": "a%" }, "address.city": "Oslo" }
            ]
        });
        let (sql, params) = FilterWhere::generate(&where_data, 0).unwrap();
        assert!(sql.contains("$1"));
        assert!(sql.contains("$2"));
        assert!(sql.contains("$3"));
        assert!(!sql.contains("$4"));
        // serde_json maps iterate keys in sorted order
        assert!(sql.contains("\"data\" #> '{address,city}' = $2"));
        assert!(sql.contains(" OR "));
        assert_eq!(params, vec![json!(5), json!("Oslo"), json!("a%")]);
    }

    #[test]
    fn starting_index_is_respected() {
        let (sql, _) = FilterWhere::generate(&json!({ "a": 1 }), 3).unwrap();
        assert_eq!(sql, "\"data\" #> '{a}' = $4");
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) = FilterWhere::generate(&json!({ "id": { "$in": [] } }), 0).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(FilterWhere::generate(&json!("status = 'x'"), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "a": { "$regex": "x" } }), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "a; DROP": 1 }), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "a": { "$between": [1] } }), 0).is_err());
        assert!(FilterWhere::generate(&json!({ "$or": {} }), 0).is_err());
    }

    #[test]
    fn field_level_not() {
        let node = FilterWhere::parse(&json!({ "age": { "$not": { "$gt": 3 } } })).unwrap().unwrap();
        assert!(matches!(node, FilterNode::Not(_)));
    }
}
