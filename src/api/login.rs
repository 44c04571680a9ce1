//! Public login redirect endpoints.
//!
//! The caller owns the anti-forgery `state`; it is passed through to the
//! provider untouched. Token exchange happens elsewhere.

use super::{AppError, AppState};
use axum::{
    extract::{Path, Query, State},
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Request body for POST /api/login/redirect
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRequest {
    pub provider_name: String,
    #[serde(default)]
    pub state: String,
}

/// Response for POST /api/login/redirect
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectResponse {
    pub redirect_url: String,
}

/// Query parameters for GET /api/login/:name
#[derive(Deserialize, Debug)]
pub struct LoginQuery {
    #[serde(default)]
    pub state: String,
}

pub fn create_login_router(state: AppState) -> Router {
    Router::new()
        // The static path shadows `/:name`, so GET serves the provider named "redirect"
        .route(
            "/api/login/redirect",
            post(login_redirect_url).get(login_redirect_reserved),
        )
        .route("/api/login/:name", get(login_redirect))
        .with_state(Arc::new(state))
}

/// POST /api/login/redirect - returns the authorization URL as JSON
async fn login_redirect_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RedirectRequest>,
) -> Result<Json<RedirectResponse>, AppError> {
    let redirect_url = build(&state, &request.provider_name, &request.state)?;
    Ok(Json(RedirectResponse { redirect_url }))
}

/// GET /api/login/:name?state= - 307 to the provider's authorization page
async fn login_redirect(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let url = build(&state, &name, &query.state)?;
    Ok(Redirect::temporary(&url))
}

/// GET /api/login/redirect?state= - same as `/api/login/:name` for a
/// provider called `redirect`
async fn login_redirect_reserved(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let url = build(&state, "redirect", &query.state)?;
    Ok(Redirect::temporary(&url))
}

fn build(state: &AppState, name: &str, csrf_state: &str) -> Result<String, AppError> {
    debug!(provider = %name, "Login redirect requested");
    state
        .resolver
        .build_redirect(name, csrf_state)
        .map_err(|e| {
            warn!(provider = %name, error = %e, "Login redirect failed");
            AppError::from(e)
        })
}
