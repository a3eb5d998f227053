//! Postgres backend: one table per collection, documents stored as JSONB.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{apply_patch, document_id, ensure_id, Document, DocumentStore, StoreError};
use crate::filter::{validate_collection_name, Filter, FilterData, FilterWhere};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

pub struct PostgresStore {
    pool: PgPool,
    known: RwLock<HashSet<String>>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32, connect_timeout: Duration) -> Result<Self, StoreError> {
        url::Url::parse(database_url).map_err(|_| StoreError::InvalidDatabaseUrl)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        info!("Connected Postgres store (max {} connections)", max_connections);
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, known: RwLock::new(HashSet::new()) }
    }

    /// Create the backing table once per process
    async fn ensure_table(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection_name(collection).map_err(|e| StoreError::InvalidCollection(e.to_string()))?;

        // Fast path: try read lock
        {
            let known = self.known.read().await;
            if known.contains(collection) {
                return Ok(());
            }
        }

        sqlx::query(&create_table_sql(collection)).execute(&self.pool).await?;

        let mut known = self.known.write().await;
        if known.insert(collection.to_string()) {
            debug!("Ensured collection table: {}", collection);
        }
        Ok(())
    }

    fn where_sql(where_clause: &Value, start: usize) -> Result<(String, Vec<Value>), StoreError> {
        Ok(FilterWhere::generate(where_clause, start)?)
    }
}

fn create_table_sql(collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"id\" TEXT PRIMARY KEY, \
         \"data\" JSONB NOT NULL, \
         \"seq\" BIGSERIAL, \
         \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now())",
        quote_identifier(collection)
    )
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Every filter parameter is compared against JSONB, so bind it as JSONB
fn bind_params<'q>(mut q: PgQuery<'q>, params: &'q [Value]) -> PgQuery<'q> {
    for p in params {
        q = q.bind(sqlx::types::Json(p));
    }
    q
}

fn row_document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let data: Value = row.try_get("data")?;
    match data {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!("stored data is not an object: {}", other))),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl DocumentStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.ensure_table(collection).await
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Document, StoreError> {
        self.ensure_table(collection).await?;
        let id = ensure_id(&mut doc)?;
        let query = format!("INSERT INTO {} (\"id\", \"data\") VALUES ($1, $2)", quote_identifier(collection));

        sqlx::query(&query)
            .bind(&id)
            .bind(sqlx::types::Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("duplicate id {} in {}", id, collection))
                } else {
                    StoreError::Sqlx(e)
                }
            })?;

        Ok(doc)
    }

    async fn find(&self, collection: &str, filter_data: &FilterData) -> Result<Vec<Document>, StoreError> {
        self.ensure_table(collection).await?;
        let mut filter = Filter::new(collection)?;
        filter.assign(filter_data)?;
        let sql = filter.to_sql()?;
        debug!("find {}: {}", collection, sql.query);

        let rows = bind_params(sqlx::query(&sql.query), &sql.params)
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = row_document(row)?;
            docs.push(match filter.projection() {
                Some(p) => p.apply(doc),
                None => doc,
            });
        }
        Ok(docs)
    }

    async fn count(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        self.ensure_table(collection).await?;
        let mut filter = Filter::new(collection)?;
        filter.where_clause(where_clause.clone())?;
        let sql = filter.to_count_sql()?;

        let row = bind_params(sqlx::query(&sql.query), &sql.params)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        where_clause: &Value,
        patch: &Value,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_table(collection).await?;
        let (where_sql, params) = Self::where_sql(where_clause, 0)?;
        let table = quote_identifier(collection);
        let select = format!(
            "SELECT \"id\", \"data\" FROM {} WHERE {} ORDER BY \"seq\" ASC LIMIT 1 FOR UPDATE",
            table, where_sql
        );

        let mut tx = self.pool.begin().await?;
        let Some(row) = bind_params(sqlx::query(&select), &params).fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };
        let id: String = row.try_get("id")?;
        let mut doc = row_document(&row)?;
        apply_patch(&mut doc, patch)?;

        sqlx::query(&format!("UPDATE {} SET \"data\" = $1 WHERE \"id\" = $2", table))
            .bind(sqlx::types::Json(&doc))
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(doc))
    }

    async fn replace_one(&self, collection: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        self.ensure_table(collection).await?;
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("replace requires an id".to_string()))?
            .to_string();
        let result = sqlx::query(&format!(
            "UPDATE {} SET \"data\" = $1 WHERE \"id\" = $2",
            quote_identifier(collection)
        ))
        .bind(sqlx::types::Json(&doc))
        .bind(&id)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(doc))
    }

    async fn delete_one(&self, collection: &str, where_clause: &Value) -> Result<Option<Document>, StoreError> {
        self.ensure_table(collection).await?;
        let (where_sql, params) = Self::where_sql(where_clause, 0)?;
        let table = quote_identifier(collection);
        let query = format!(
            "DELETE FROM {t} WHERE \"id\" = (SELECT \"id\" FROM {t} WHERE {w} ORDER BY \"seq\" ASC LIMIT 1) RETURNING \"data\"",
            t = table,
            w = where_sql
        );
        let row = bind_params(sqlx::query(&query), &params)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_document).transpose()
    }

    async fn delete_many(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        self.ensure_table(collection).await?;
        let (where_sql, params) = Self::where_sql(where_clause, 0)?;
        let query = format!("DELETE FROM {} WHERE {}", quote_identifier(collection), where_sql);
        let result = bind_params(sqlx::query(&query), &params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(StoreError::from))
            .collect()
    }
}
