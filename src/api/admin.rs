//! Secret maintenance endpoints: migration, coverage, rotation and
//! single-record re-encryption.
//!
//! Batches run on the blocking pool. A batch with failures answers 500 with
//! the full report so the caller can see which records to retry.

use super::{authorize, AppError, AppState};
use crate::migration::{BatchReport, EncryptionCoverage};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Response for POST /api/admin/providers/:id/reencrypt
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ReencryptResponse {
    pub success: bool,
}

pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/secrets/migrate", post(migrate_secrets))
        .route("/api/admin/secrets/coverage", get(secret_coverage))
        .route("/api/admin/secrets/rotate", post(rotate_secrets))
        .route("/api/admin/providers/:id/reencrypt", post(reencrypt_provider))
        .with_state(Arc::new(state))
}

/// POST /api/admin/secrets/migrate - encrypt all legacy plaintext secrets.
async fn migrate_secrets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&headers, &state)?;

    let migrator = Arc::clone(&state.migrator);
    let cancel = state.shutdown.clone();
    let report = tokio::task::spawn_blocking(move || migrator.migrate(&cancel))
        .await
        .map_err(|e| AppError::ServerError(format!("Migration task failed: {}", e)))??;

    info!(succeeded = report.succeeded, failed = report.failed(), "Migration requested via API");
    Ok(batch_response(report))
}

/// GET /api/admin/secrets/coverage - read-only encryption audit.
async fn secret_coverage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<EncryptionCoverage>, AppError> {
    authorize(&headers, &state)?;

    Ok(Json(state.migrator.validate()?))
}

/// POST /api/admin/secrets/rotate - re-encrypt every ciphertext under the active key.
async fn rotate_secrets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&headers, &state)?;

    let migrator = Arc::clone(&state.migrator);
    let cancel = state.shutdown.clone();
    let report = tokio::task::spawn_blocking(move || migrator.rotate_all(&cancel))
        .await
        .map_err(|e| AppError::ServerError(format!("Rotation task failed: {}", e)))??;

    info!(succeeded = report.succeeded, failed = report.failed(), "Rotation requested via API");
    Ok(batch_response(report))
}

/// POST /api/admin/providers/:id/reencrypt
async fn reencrypt_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ReencryptResponse>, AppError> {
    authorize(&headers, &state)?;

    state.migrator.reencrypt(id)?;
    Ok(Json(ReencryptResponse { success: true }))
}

fn batch_response(report: BatchReport) -> Response {
    let status = if report.ensure_complete().is_ok() {
        StatusCode::OK
    } else {
        warn!(failed = report.failed(), total = report.total, "Batch finished with failures");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report)).into_response()
}
