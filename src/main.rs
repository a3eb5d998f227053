use std::sync::Arc;

use anyhow::Context;
use campus_store::api::{self, AppState};
use campus_store::config::config;
use campus_store::model::{ModelRegistry, RegistryOptions};
use campus_store::schemas;
use campus_store::store;
use campus_store::tenant::CustomerRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, STORE_BACKEND, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    tracing::info!("Starting campus store in {:?} mode", config.environment);

    let store = store::connect(config).await.context("connecting document store")?;
    let mut registry = ModelRegistry::new(store.clone(), RegistryOptions::from_config(config));
    schemas::register_all(&mut registry).context("registering entity schemas")?;

    let state = AppState::new(
        Arc::new(registry),
        Arc::new(CustomerRegistry::new(store)),
        config.tenant.header.clone(),
    );

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Campus store listening on http://{}", bind_addr);

    let app = if config.api.enable_request_logging {
        api::traced_router(state)
    } else {
        api::router(state)
    };

    axum::serve(listener, app).await?;
    Ok(())
}
