use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_select::Projection;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, SqlResult};

/// A validated query against one collection, compilable to SQL
pub struct Filter {
    collection: String,
    projection: Option<Projection>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Filter {
    pub fn new(collection: impl Into<String>) -> Result<Self, FilterError> {
        let collection = collection.into();
        validate_collection_name(&collection)?;
        Ok(Self {
            collection,
            projection: None,
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    pub fn assign(&mut self, data: &FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = &data.select { self.select(select)?; }
        if let Some(where_clause) = &data.where_clause { self.where_clause(where_clause.clone())?; }
        if let Some(order) = &data.order { self.order(order)?; }
        self.limit(data.limit, data.offset);
        Ok(self)
    }

    pub fn select(&mut self, columns: &[String]) -> Result<&mut Self, FilterError> {
        self.projection = Projection::from_fields(columns)?;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: Option<u64>, offset: Option<u64>) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql()?;
        let order_clause = FilterOrder::generate(&self.order_data);
        let limit_clause = self.build_limit_clause();

        let query = [
            "SELECT \"data\"".to_string(),
            format!("FROM \"{}\"", self.collection),
            format!("WHERE {}", where_clause),
            order_clause,
            limit_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql()?;
        let query = format!(
            "SELECT COUNT(*) AS count FROM \"{}\" WHERE {}",
            self.collection, where_clause
        );
        Ok(SqlResult { query, params })
    }

    fn where_sql(&self) -> Result<(String, Vec<Value>), FilterError> {
        match &self.where_data {
            Some(where_data) => FilterWhere::generate(where_data, 0),
            None => Ok(("1=1".to_string(), vec![])),
        }
    }

    /// Postgres LIMIT and OFFSET are bigint
    fn build_limit_clause(&self) -> String {
        let bigint = |n: u64| n.min(i64::MAX as u64);
        match (self.limit.map(bigint), self.offset.map(bigint)) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

/// Collection names become quoted Postgres identifiers: ASCII alphanumerics,
/// `_` and `-`, not starting with `-`, at most 63 bytes.
pub fn validate_collection_name(name: &str) -> Result<(), FilterError> {
    if name.is_empty() {
        return Err(FilterError::InvalidCollection("Collection name cannot be empty".to_string()));
    }
    if name.len() > 63
        || name.starts_with('-')
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(FilterError::InvalidCollection(format!("Invalid collection name format: {}", name)));
    }
    Ok(())
}
