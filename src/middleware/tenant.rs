use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::context::{self, TaskContext};
use crate::error::ApiError;

/// Authenticated actor, inserted as a request extension by an upstream
/// authentication layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor(pub String);

/// Establishes the ambient context for the rest of the request.
///
/// - tenant header absent: the handler runs without a tenant (shared collections)
/// - header names an active customer: the handler runs under that tenant
/// - header names no customer: 404 `TENANT_NOT_FOUND`, the handler never runs
pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = request.extensions().get::<Actor>().map(|a| a.0.clone());

    let tenant = match request.headers().get(state.tenant_header.as_str()) {
        None => None,
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Tenant header is not valid UTF-8"))?
                .trim();
            if raw.is_empty() {
                return Err(ApiError::bad_request("Tenant header is empty"));
            }
            let tenant = state.customers.resolve(raw).await.map_err(|e| {
                tracing::warn!("Tenant resolution failed for '{}': {}", raw, e);
                ApiError::from(e)
            })?;
            tracing::debug!("Request routed to tenant {}", tenant);
            Some(tenant)
        }
    };

    Ok(context::run_with(TaskContext::new(tenant, actor), next.run(request)).await)
}
