//! Provider record storage.
//!
//! [`ProviderRepository`] is the boundary the rest of the crate talks to;
//! [`SqliteProviderStore`] is the bundled implementation.

use crate::crypto::Sealed;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

mod sqlite;

pub use sqlite::SqliteProviderStore;

#[cfg(test)]
mod tests;

/// How client credentials are sent during the token exchange.
///
/// Values outside the known constants are carried through untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuthStyle(pub i32);

impl AuthStyle {
    /// Try both styles and remember which one the provider accepts
    pub const AUTO_DETECT: AuthStyle = AuthStyle(0);
    /// `client_id` / `client_secret` in the form body
    pub const IN_PARAMS: AuthStyle = AuthStyle(1);
    /// HTTP Basic authorization header
    pub const IN_HEADER: AuthStyle = AuthStyle(2);
}

/// Provider status flag. Values outside the known constants are kept as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProviderStatus(pub i32);

impl ProviderStatus {
    pub const INACTIVE: ProviderStatus = ProviderStatus(0);
    pub const ACTIVE: ProviderStatus = ProviderStatus(1);
}

impl Default for ProviderStatus {
    fn default() -> Self {
        ProviderStatus::ACTIVE
    }
}

/// One configured OAuth identity provider, as stored.
///
/// `encrypted_secret` and `encryption_key_id` are either both empty or both
/// set. Once they are set, `legacy_secret` is empty.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRecord {
    pub id: i64,
    /// Unique lookup key used by the login flow
    pub name: String,
    pub display_name: String,
    pub kind: String,
    pub provider_type: String,
    pub client_id: String,
    /// Pre-encryption plaintext secret, empty once migrated
    pub legacy_secret: String,
    pub encrypted_secret: String,
    pub encryption_key_id: String,
    pub redirect_url: String,
    /// Space-delimited scopes
    pub scopes: String,
    pub auth_url: String,
    pub token_url: String,
    pub info_url: String,
    pub auth_style: AuthStyle,
    pub extra_config: Option<Map<String, Value>>,
    pub enabled: bool,
    pub sort: i32,
    pub remark: String,
    pub support_pkce: bool,
    pub icon_url: String,
    /// Advisory, in seconds
    pub cache_ttl: i64,
    pub webhook_url: String,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub status: ProviderStatus,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderRecord {
    /// A blank, enabled record with the given name.
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.to_string(),
            display_name: String::new(),
            kind: String::new(),
            provider_type: String::new(),
            client_id: String::new(),
            legacy_secret: String::new(),
            encrypted_secret: String::new(),
            encryption_key_id: String::new(),
            redirect_url: String::new(),
            scopes: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            info_url: String::new(),
            auth_style: AuthStyle::default(),
            extra_config: None,
            enabled: true,
            sort: 0,
            remark: String::new(),
            support_pkce: false,
            icon_url: String::new(),
            cache_ttl: 0,
            webhook_url: String::new(),
            success_count: 0,
            failure_count: 0,
            last_used_at: None,
            status: ProviderStatus::default(),
            tenant_id: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Ciphertext and key id are both present.
    pub fn has_ciphertext(&self) -> bool {
        !self.encrypted_secret.is_empty() && !self.encryption_key_id.is_empty()
    }

    /// Only the pre-encryption plaintext is present.
    pub fn is_legacy_only(&self) -> bool {
        !self.legacy_secret.is_empty() && self.encrypted_secret.is_empty()
    }

    pub fn seal(&mut self, sealed: Sealed) {
        self.encrypted_secret = sealed.ciphertext;
        self.encryption_key_id = sealed.key_id;
        self.legacy_secret.clear();
    }
}

/// Partial update. `None` leaves the column untouched.
///
/// Secret columns can only be written through `sealed`, which stores the
/// ciphertext and key id and clears the legacy plaintext in the same write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub kind: Option<String>,
    pub provider_type: Option<String>,
    pub client_id: Option<String>,
    pub sealed: Option<Sealed>,
    pub redirect_url: Option<String>,
    pub scopes: Option<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub info_url: Option<String>,
    pub auth_style: Option<AuthStyle>,
    pub extra_config: Option<Map<String, Value>>,
    pub enabled: Option<bool>,
    pub sort: Option<i32>,
    pub remark: Option<String>,
    pub support_pkce: Option<bool>,
    pub icon_url: Option<String>,
    pub cache_ttl: Option<i64>,
    pub webhook_url: Option<String>,
    pub success_count: Option<i64>,
    pub failure_count: Option<i64>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub status: Option<ProviderStatus>,
    pub tenant_id: Option<String>,
}

impl ProviderPatch {
    /// Patch that only replaces the secret.
    pub fn sealed(sealed: Sealed) -> Self {
        Self {
            sealed: Some(sealed),
            ..Self::default()
        }
    }
}

/// Which secret columns a record must have populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretState {
    /// Legacy plaintext present, no ciphertext yet
    LegacyOnly,
    /// Ciphertext present
    Encrypted,
}

/// Record selection. All set conditions must hold.
#[derive(Clone, Debug, Default)]
pub struct ProviderFilter {
    /// Exact name match
    pub name: Option<String>,
    /// Substring match on name
    pub name_contains: Option<String>,
    pub secret_state: Option<SecretState>,
    /// Ignored by `count`
    pub offset: Option<u64>,
    /// Ignored by `count`
    pub limit: Option<u64>,
}

impl ProviderFilter {
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_secret_state(state: SecretState) -> Self {
        Self {
            secret_state: Some(state),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("name already exists: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistent provider records.
///
/// Implementations must be safe for concurrent use; callers take no locks.
pub trait ProviderRepository: Send + Sync {
    /// Inserts a record and returns its new id. `record.id` is ignored.
    fn create(&self, record: &ProviderRecord) -> Result<i64, StoreError>;

    fn get(&self, id: i64) -> Result<ProviderRecord, StoreError>;

    fn query(&self, filter: &ProviderFilter) -> Result<Vec<ProviderRecord>, StoreError>;

    /// Applies `patch` as a single write. Fails with `NotFound` for unknown ids.
    fn update(&self, id: i64, patch: &ProviderPatch) -> Result<(), StoreError>;

    /// Stores `sealed` and clears the legacy plaintext, but only while the
    /// record's secret columns still match what `expected` was read with.
    ///
    /// Returns `Ok(false)` when the secret changed in the meantime and
    /// nothing was written. Fails with `NotFound` for unknown ids.
    fn seal_if_unchanged(
        &self,
        id: i64,
        expected: &ProviderRecord,
        sealed: &Sealed,
    ) -> Result<bool, StoreError>;

    fn count(&self, filter: &ProviderFilter) -> Result<u64, StoreError>;

    fn get_by_name(&self, name: &str) -> Result<ProviderRecord, StoreError> {
        self.query(&ProviderFilter::by_name(name))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("provider '{}'", name)))
    }
}
