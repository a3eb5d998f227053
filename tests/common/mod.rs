#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use campus_store::api::{self, AppState};
use campus_store::filter::FilterData;
use campus_store::model::{ModelRegistry, RegistryOptions};
use campus_store::schemas;
use campus_store::store::{Document, DocumentStore, MemoryStore, StoreError};
use campus_store::tenant::{CustomerRegistry, TenantId};

pub const TENANT_HEADER: &str = "x-tenant-slug";

/// Registries over one in-memory store with the full entity catalogue
pub struct Harness {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<ModelRegistry>,
    pub customers: Arc<CustomerRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), options)
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, options: RegistryOptions) -> Self {
        let mut registry = ModelRegistry::new(store.clone(), options);
        schemas::register_all(&mut registry).expect("catalogue registers");
        Self {
            customers: Arc::new(CustomerRegistry::new(store.clone())),
            registry: Arc::new(registry),
            store,
        }
    }

    pub async fn register(&self, slug: &str) -> TenantId {
        let customer = self.customers.register(&format!("School {}", slug), slug).await.expect("register customer");
        customer.tenant_id().expect("valid tenant id")
    }

    /// Raw documents in a physical collection, bypassing routing and plugins
    pub async fn raw(&self, collection: &str) -> Vec<Document> {
        self.store.find(collection, &FilterData::default()).await.expect("raw find")
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.registry.clone(), self.customers.clone(), TENANT_HEADER)
    }
}

pub fn tenant(raw: &str) -> TenantId {
    TenantId::sanitize(raw).expect("valid slug")
}

/// Store whose inserts into the named collections always fail
pub struct FailingStore {
    inner: Arc<dyn DocumentStore>,
    failing: HashSet<String>,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn DocumentStore>, failing: &[&str]) -> Self {
        Self { inner, failing: failing.iter().map(|c| c.to_string()).collect() }
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.inner.ensure_collection(collection).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Document, StoreError> {
        if self.failing.contains(collection) {
            return Err(StoreError::QueryError(format!("insert into {} refused", collection)));
        }
        self.inner.insert_one(collection, doc).await
    }

    async fn find(&self, collection: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError> {
        self.inner.find(collection, filter).await
    }

    async fn count(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        self.inner.count(collection, where_clause).await
    }

    async fn update_one(&self, collection: &str, where_clause: &Value, patch: &Value) -> Result<Option<Document>, StoreError> {
        self.inner.update_one(collection, where_clause, patch).await
    }

    async fn replace_one(&self, collection: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        self.inner.replace_one(collection, doc).await
    }

    async fn delete_one(&self, collection: &str, where_clause: &Value) -> Result<Option<Document>, StoreError> {
        self.inner.delete_one(collection, where_clause).await
    }

    async fn delete_many(&self, collection: &str, where_clause: &Value) -> Result<u64, StoreError> {
        self.inner.delete_many(collection, where_clause).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_collections().await
    }
}

/// Router served on a free local port for the lifetime of one test runtime
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
}

impl TestServer {
    pub async fn start(state: AppState) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind {}", base_url))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, api::router(state)).await;
        });

        let server = Self { port, base_url };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
