use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::AppState;

/// GET /health - probes the document store
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let store = state.registry.store();

    match store.list_collections().await {
        Ok(collections) => {
            let cached_models = state.registry.cached_models().await;
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": {
                        "status": "ok",
                        "timestamp": now,
                        "store": store.backend(),
                        "collections": collections.len(),
                        "cached_models": cached_models,
                    }
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "store unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
