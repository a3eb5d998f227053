use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use std::collections::HashMap;

use crate::api::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::query::{Paginated, QueryDescriptor};
use crate::store::Document;

/// POST /api/find/:entity - advanced query with a JSON descriptor body
pub async fn find_post(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Result<Json<QueryDescriptor>, JsonRejection>,
) -> ApiResult<Paginated<Document>> {
    let Json(descriptor) = body.map_err(|e| ApiError::invalid_json(e.body_text()))?;
    run_query(&state, &entity, descriptor).await
}

/// GET /api/find/:entity?page=&limit=&sortBy=&select=&populate=&<field>=
pub async fn find_get(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Paginated<Document>> {
    run_query(&state, &entity, QueryDescriptor::from_query_params(&params)).await
}

async fn run_query(state: &AppState, entity: &str, descriptor: QueryDescriptor) -> ApiResult<Paginated<Document>> {
    let model = state.registry.model(entity)?;
    let page = model.advanced_results(&descriptor).await?;
    tracing::debug!(
        "find {} -> {} of {} results (page {}/{})",
        model.entity(),
        page.results.len(),
        page.total_results,
        page.page,
        page.total_pages
    );
    Ok(ApiResponse::success(page))
}
