use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware::tenant_context_middleware;
use crate::model::ModelRegistry;
use crate::tenant::CustomerRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub customers: Arc<CustomerRegistry>,
    /// Lowercase request header carrying the tenant slug
    pub tenant_header: String,
}

impl AppState {
    pub fn new(registry: Arc<ModelRegistry>, customers: Arc<CustomerRegistry>, tenant_header: impl Into<String>) -> Self {
        Self { registry, customers, tenant_header: tenant_header.into().to_ascii_lowercase() }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/health", get(handlers::health))
        // Tenant-scoped API
        .merge(find_routes(state.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Router with per-request trace spans
pub fn traced_router(state: AppState) -> Router {
    router(state).layer(TraceLayer::new_for_http())
}

fn find_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/find/:entity", get(handlers::find_get).post(handlers::find_post))
        .route_layer(middleware::from_fn_with_state(state, tenant_context_middleware))
}
