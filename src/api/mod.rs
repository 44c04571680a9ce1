//! HTTP API.
//!
//! Provider management and secret maintenance routes are guarded by the
//! admin bearer token. Login redirects are public.

mod error;

pub mod admin;
pub mod login;
pub mod providers;

pub use admin::create_admin_router;
pub use error::AppError;
pub use login::create_login_router;
pub use providers::create_provider_router;

use crate::migration::SecretMigrator;
use crate::providers::ProviderService;
use crate::redirect::RedirectResolver;
use axum::{http::HeaderMap, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state for all routers
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<ProviderService>,
    pub migrator: Arc<SecretMigrator>,
    pub resolver: Arc<RedirectResolver>,
    /// Required bearer token for provider and admin routes. None = unrestricted.
    pub admin_token: Option<String>,
    /// Cancelled on shutdown; running batches stop before their next record.
    pub shutdown: CancellationToken,
}

/// Create the full API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(create_provider_router(state.clone()))
        .merge(create_admin_router(state.clone()))
        .merge(create_login_router(state))
}

/// Rejects the request unless it carries the configured admin token.
pub(crate) fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), AppError> {
    if validate_admin_token(headers, &state.admin_token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Unauthorized".to_string()))
    }
}

/// Returns true if the bearer token in `Authorization` matches the expected admin token.
/// Returns true (no restriction) when `expected` is None.
fn validate_admin_token(headers: &HeaderMap, expected: &Option<String>) -> bool {
    let Some(expected_token) = expected else {
        // No admin token configured → unrestricted (dev mode)
        return true;
    };

    let Some(auth_header) = headers.get("Authorization") else {
        return false;
    };
    let Ok(value) = auth_header.to_str() else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };

    token == expected_token
}
