use crate::error::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

/// Application error types for the HTTP API
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    ServerError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unprocessable(msg)
            | AppError::ServerError(msg) => msg,
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        let msg = e.to_string();
        match e {
            ProviderError::NotFound(_) => AppError::NotFound(msg),
            ProviderError::NameConflict(_) | ProviderError::Changed(_) => AppError::Conflict(msg),
            ProviderError::InvalidInput(_) => AppError::BadRequest(msg),
            ProviderError::Disabled(_) => AppError::Forbidden(msg),
            ProviderError::NoSecret(_) => AppError::Unprocessable(msg),
            ProviderError::Encrypt(_)
            | ProviderError::Decrypt(_)
            | ProviderError::Storage(_)
            | ProviderError::BatchIncomplete { .. } => {
                error!(error = %msg, "Request failed");
                AppError::ServerError(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_status_mapping() {
        let cases = [
            (ProviderError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ProviderError::NameConflict("x".into()), StatusCode::CONFLICT),
            (ProviderError::Changed(4), StatusCode::CONFLICT),
            (ProviderError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ProviderError::Disabled("x".into()), StatusCode::FORBIDDEN),
            (ProviderError::NoSecret(3), StatusCode::UNPROCESSABLE_ENTITY),
            (ProviderError::Encrypt("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ProviderError::Decrypt("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ProviderError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ProviderError::BatchIncomplete { failed: 1, total: 2 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_message_is_preserved() {
        let err = AppError::from(ProviderError::NameConflict("github".into()));
        match err {
            AppError::Conflict(msg) => assert!(msg.contains("github")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
