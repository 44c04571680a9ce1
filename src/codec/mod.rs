//! Wire ⇄ storage mapping for provider records.
//!
//! The wire shape ([`ProviderInfo`]) has every field optional, and absence is
//! significant: on update an absent field means "leave as is", on create it
//! means "use the default". The stored shape ([`ProviderRecord`]) is fully
//! typed.
//!
//! Conversions here never fail:
//! - enum-like integers (`authStyle`, `status`) are carried through even when
//!   they match no known constant
//! - timestamps are milliseconds since the epoch on the wire; `0` or an
//!   out-of-range value reads as absent, never as 1970-01-01
//! - `extraConfig` is a JSON object serialized as a string; input that does
//!   not parse to an object is treated as absent, and an object that cannot
//!   be serialized is emitted as an empty string
//!
//! Secrets are not mapped here. The lifecycle service decides what secret
//! value, if any, appears in a response.

use crate::store::{AuthStyle, ProviderPatch, ProviderRecord, ProviderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;


/// Rendered in place of any secret in list responses.
pub const SECRET_MASK: &str = "******";

/// Rendered on single reads when the stored ciphertext cannot be decrypted.
pub const SECRET_UNAVAILABLE: &str = "***SECRET_ENCRYPTED***";

/// String whose `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Placeholder values clients echo back; they never mean "new secret".
    pub fn is_placeholder(&self) -> bool {
        self.0 == SECRET_MASK || self.0 == SECRET_UNAVAILABLE
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Provider as seen by API clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Plaintext on input; decrypted, masked or absent on output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SecretString>,
    /// Output only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_secret: Option<String>,
    /// Output only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_style: Option<i32>,
    /// JSON object as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_pkce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<i64>,
    /// Milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Builds a new record from create input. Absent fields take record defaults.
///
/// The secret is left empty; the caller seals it.
pub fn record_from_info(info: &ProviderInfo) -> ProviderRecord {
    let mut record = ProviderRecord::new(info.name.as_deref().unwrap_or_default());

    macro_rules! take {
        ($($field:ident),* $(,)?) => {
            $(if let Some(v) = &info.$field {
                record.$field = v.clone();
            })*
        };
    }
    take!(
        display_name,
        kind,
        provider_type,
        client_id,
        redirect_url,
        scopes,
        auth_url,
        token_url,
        info_url,
        enabled,
        sort,
        remark,
        support_pkce,
        icon_url,
        cache_ttl,
        webhook_url,
        success_count,
        failure_count,
        tenant_id,
    );

    if let Some(style) = info.auth_style {
        record.auth_style = AuthStyle(style);
    }
    if let Some(status) = info.status {
        record.status = ProviderStatus(status);
    }
    record.extra_config = extra_config_from_wire(info.extra_config.as_deref());
    record.last_used_at = timestamp_from_millis(info.last_used_at);

    record
}

/// Builds a partial update from update input. Absent fields stay `None`.
///
/// The secret is not part of the patch; the caller seals it.
pub fn patch_from_info(info: &ProviderInfo) -> ProviderPatch {
    ProviderPatch {
        name: info.name.clone(),
        display_name: info.display_name.clone(),
        kind: info.kind.clone(),
        provider_type: info.provider_type.clone(),
        client_id: info.client_id.clone(),
        sealed: None,
        redirect_url: info.redirect_url.clone(),
        scopes: info.scopes.clone(),
        auth_url: info.auth_url.clone(),
        token_url: info.token_url.clone(),
        info_url: info.info_url.clone(),
        auth_style: info.auth_style.map(AuthStyle),
        extra_config: extra_config_from_wire(info.extra_config.as_deref()),
        enabled: info.enabled,
        sort: info.sort,
        remark: info.remark.clone(),
        support_pkce: info.support_pkce,
        icon_url: info.icon_url.clone(),
        cache_ttl: info.cache_ttl,
        webhook_url: info.webhook_url.clone(),
        success_count: info.success_count,
        failure_count: info.failure_count,
        last_used_at: timestamp_from_millis(info.last_used_at),
        status: info.status.map(ProviderStatus),
        tenant_id: info.tenant_id.clone(),
    }
}

/// Maps a stored record to its wire view, without any secret fields.
pub fn info_from_record(record: &ProviderRecord) -> ProviderInfo {
    ProviderInfo {
        id: Some(record.id),
        name: Some(record.name.clone()),
        display_name: Some(record.display_name.clone()),
        kind: Some(record.kind.clone()),
        provider_type: Some(record.provider_type.clone()),
        client_id: Some(record.client_id.clone()),
        client_secret: None,
        encrypted_secret: None,
        encryption_key_id: None,
        redirect_url: Some(record.redirect_url.clone()),
        scopes: Some(record.scopes.clone()),
        auth_url: Some(record.auth_url.clone()),
        token_url: Some(record.token_url.clone()),
        info_url: Some(record.info_url.clone()),
        auth_style: Some(record.auth_style.0),
        extra_config: extra_config_to_wire(record.extra_config.as_ref()),
        enabled: Some(record.enabled),
        sort: Some(record.sort),
        remark: Some(record.remark.clone()),
        support_pkce: Some(record.support_pkce),
        icon_url: Some(record.icon_url.clone()),
        cache_ttl: Some(record.cache_ttl),
        webhook_url: Some(record.webhook_url.clone()),
        success_count: Some(record.success_count),
        failure_count: Some(record.failure_count),
        last_used_at: timestamp_to_millis(record.last_used_at),
        status: Some(record.status.0),
        tenant_id: Some(record.tenant_id.clone()),
        created_at: timestamp_to_millis(Some(record.created_at)),
        updated_at: timestamp_to_millis(Some(record.updated_at)),
    }
}

/// `None`, `0` and out-of-range values all map to `None`.
pub fn timestamp_from_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    match millis {
        Some(0) | None => None,
        Some(ms) => DateTime::from_timestamp_millis(ms),
    }
}

/// The zero timestamp maps to `None`.
pub fn timestamp_to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis()).filter(|ms| *ms != 0)
}

/// Parses wire `extraConfig`. Anything but a JSON object reads as absent.
pub fn extra_config_from_wire(raw: Option<&str>) -> Option<Map<String, Value>> {
    let raw = raw?;
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(map) => Some(map),
        Err(e) => {
            debug!(error = %e, "Dropping malformed extraConfig");
            None
        }
    }
}

/// Serializes `extraConfig` for the wire. Encoding failure yields `""`.
pub fn extra_config_to_wire(config: Option<&Map<String, Value>>) -> Option<String> {
    config.map(|map| serde_json::to_string(map).unwrap_or_default())
}
