//! Domain errors for provider management.

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the provider lifecycle, redirect and batch operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("provider name already in use: {0}")]
    NameConflict(String),

    #[error("invalid provider input: {0}")]
    InvalidInput(String),

    /// The cipher gateway refused to encrypt. Nothing was persisted.
    #[error("failed to encrypt client secret: {0}")]
    Encrypt(String),

    #[error("failed to decrypt client secret: {0}")]
    Decrypt(String),

    #[error("no secret found for provider {0}")]
    NoSecret(i64),

    /// The stored secret was replaced after it was read; nothing was written.
    #[error("provider {0} changed concurrently")]
    Changed(i64),

    #[error("provider is disabled: {0}")]
    Disabled(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// At least one record in a batch failed; the successful ones are applied.
    #[error("{failed} of {total} records failed")]
    BatchIncomplete { failed: usize, total: usize },
}

impl From<StoreError> for ProviderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ProviderError::NotFound(what),
            StoreError::Conflict(name) => ProviderError::NameConflict(name),
            StoreError::Backend(e) => ProviderError::Storage(format!("{:#}", e)),
        }
    }
}

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
