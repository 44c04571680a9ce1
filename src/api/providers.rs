//! Provider CRUD endpoints.

use super::{authorize, AppError, AppState};
use crate::codec::ProviderInfo;
use crate::providers::{ListRequest, ProviderPage};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Response for POST /api/providers
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CreateProviderResponse {
    pub id: i64,
}

/// Response for PUT /api/providers/:id
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct UpdateProviderResponse {
    pub success: bool,
}

/// Create provider API router
pub fn create_provider_router(state: AppState) -> Router {
    Router::new()
        .route("/api/providers", get(list_providers).post(create_provider))
        .route("/api/providers/:id", get(get_provider).put(update_provider))
        .with_state(Arc::new(state))
}

/// POST /api/providers
async fn create_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<ProviderInfo>,
) -> Result<(StatusCode, Json<CreateProviderResponse>), AppError> {
    authorize(&headers, &state)?;

    let id = state.providers.create(input)?;
    Ok((StatusCode::CREATED, Json(CreateProviderResponse { id })))
}

/// GET /api/providers?name=&page=&pageSize=
///
/// Secrets are always masked in the listing.
async fn list_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(request): Query<ListRequest>,
) -> Result<Json<ProviderPage>, AppError> {
    authorize(&headers, &state)?;

    debug!(name = ?request.name, page = request.page, page_size = request.page_size, "Listing providers");
    Ok(Json(state.providers.list(&request)?))
}

/// GET /api/providers/:id - full view with the secret decrypted
async fn get_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ProviderInfo>, AppError> {
    authorize(&headers, &state)?;

    Ok(Json(state.providers.read(id)?))
}

/// PUT /api/providers/:id - partial update; the path id wins over any body id
async fn update_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut input): Json<ProviderInfo>,
) -> Result<Json<UpdateProviderResponse>, AppError> {
    authorize(&headers, &state)?;

    input.id = Some(id);
    state.providers.update(input)?;
    Ok(Json(UpdateProviderResponse { success: true }))
}
