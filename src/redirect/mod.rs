//! Authorization redirect cache.
//!
//! Login requests need a provider's client configuration with the secret
//! decrypted. Decrypting on every login is wasteful, so resolved
//! configurations are cached per provider name until the provider is
//! updated.
//!
//! Each name carries an epoch that `invalidate` bumps. A lookup takes a
//! ticket holding the epoch before it reads the record and only caches its
//! result if the epoch is unchanged, so a lookup racing an update cannot park
//! pre-update data in the cache.

mod client;

pub use client::{resolve_placeholders, split_scopes, ClientConfig};

use crate::codec::SecretString;
use crate::crypto::SecretCipher;
use crate::error::{ProviderError, Result};
use crate::store::ProviderRepository;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};


#[derive(Default)]
struct Slot {
    epoch: u64,
    /// Lookups that have read `epoch` and not finished yet
    pending: usize,
    config: Option<Arc<ClientConfig>>,
    info_url: Option<String>,
}

impl Slot {
    fn is_idle(&self) -> bool {
        self.pending == 0 && self.config.is_none()
    }
}

/// Per-name cache of resolved client configurations and user-info URLs.
///
/// A slot lives only while it holds a configuration or a lookup for its name
/// is in flight, so names that are invalidated and never looked up again
/// (renamed providers, for one) do not accumulate.
#[derive(Default)]
pub struct RedirectCache {
    slots: DashMap<String, Slot>,
}

impl RedirectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClientConfig>> {
        self.slots.get(name).and_then(|slot| slot.config.clone())
    }

    /// User-info endpoint recorded when `name` was last resolved.
    pub fn info_url(&self, name: &str) -> Option<String> {
        self.slots.get(name).and_then(|slot| slot.info_url.clone())
    }

    /// Starts a lookup for `name`. The returned ticket can store a result
    /// only if `name` is not invalidated before it does.
    pub fn begin(&self, name: &str) -> LookupTicket<'_> {
        let epoch = {
            let mut slot = self.slots.entry(name.to_string()).or_default();
            slot.pending += 1;
            slot.epoch
        };
        LookupTicket {
            cache: self,
            name: name.to_string(),
            epoch,
        }
    }

    /// Drops the cached entry for `name`; the next lookup rebuilds it.
    pub fn invalidate(&self, name: &str) {
        if let Some(mut slot) = self.slots.get_mut(name) {
            slot.epoch += 1;
            slot.config = None;
            slot.info_url = None;
        }
        self.slots.remove_if(name, |_, slot| slot.is_idle());
    }

    /// Number of cached configurations.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.config.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn finish(&self, name: &str) {
        if let Some(mut slot) = self.slots.get_mut(name) {
            slot.pending = slot.pending.saturating_sub(1);
        }
        self.slots.remove_if(name, |_, slot| slot.is_idle());
    }
}

/// An in-flight lookup, from [`RedirectCache::begin`]. Dropping it ends the
/// lookup.
pub struct LookupTicket<'a> {
    cache: &'a RedirectCache,
    name: String,
    epoch: u64,
}

impl LookupTicket<'_> {
    /// Stores the resolved configuration unless the name was invalidated
    /// since the ticket was taken. Returns whether it was stored.
    pub fn insert(&self, config: Arc<ClientConfig>, info_url: String) -> bool {
        match self.cache.slots.get_mut(&self.name) {
            Some(mut slot) if slot.epoch == self.epoch => {
                slot.config = Some(config);
                slot.info_url = Some(info_url);
                true
            }
            _ => false,
        }
    }
}

impl Drop for LookupTicket<'_> {
    fn drop(&mut self) {
        self.cache.finish(&self.name);
    }
}

/// Builds authorization redirects from stored providers through the cache.
pub struct RedirectResolver {
    store: Arc<dyn ProviderRepository>,
    cipher: Arc<dyn SecretCipher>,
    cache: Arc<RedirectCache>,
    default_redirect_url: Option<String>,
}

impl RedirectResolver {
    pub fn new(
        store: Arc<dyn ProviderRepository>,
        cipher: Arc<dyn SecretCipher>,
        cache: Arc<RedirectCache>,
    ) -> Self {
        Self {
            store,
            cipher,
            cache,
            default_redirect_url: None,
        }
    }

    /// Redirect URL used for providers that have none. `{name}` is replaced
    /// with the provider name.
    pub fn with_default_redirect_url(mut self, url: Option<String>) -> Self {
        self.default_redirect_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn cache(&self) -> &Arc<RedirectCache> {
        &self.cache
    }

    /// Cached configuration for `name`, resolving it from storage on a miss.
    ///
    /// Fails if the provider is unknown or disabled, has no secret, or its
    /// secret cannot be decrypted.
    pub fn lookup(&self, name: &str) -> Result<Arc<ClientConfig>> {
        if let Some(config) = self.cache.get(name) {
            debug!(provider = %name, "Redirect cache hit");
            return Ok(config);
        }

        let ticket = self.cache.begin(name);
        let record = self.store.get_by_name(name)?;

        if !record.enabled {
            return Err(ProviderError::Disabled(name.to_string()));
        }

        let secret = if record.has_ciphertext() {
            self.cipher
                .decrypt(&record.encrypted_secret, &record.encryption_key_id)
                .map_err(|e| {
                    warn!(provider = %name, key_id = %record.encryption_key_id, error = %e, "Failed to decrypt client secret for login");
                    ProviderError::Decrypt(e.to_string())
                })?
        } else if !record.legacy_secret.is_empty() {
            warn!(provider = %name, "Using unmigrated plaintext client secret");
            record.legacy_secret.clone()
        } else {
            return Err(ProviderError::NoSecret(record.id));
        };

        let redirect_url = if record.redirect_url.is_empty() {
            self.default_redirect_url
                .as_deref()
                .map(|url| url.replace("{name}", &urlencoding::encode(&record.name)))
                .unwrap_or_default()
        } else {
            record.redirect_url.clone()
        };

        let config = Arc::new(ClientConfig {
            provider_name: record.name.clone(),
            client_id: record.client_id.clone(),
            client_secret: SecretString::new(secret),
            auth_url: resolve_placeholders(&record.auth_url, &record),
            token_url: resolve_placeholders(&record.token_url, &record),
            auth_style: record.auth_style,
            redirect_url,
            scopes: split_scopes(&record.scopes),
        });
        let info_url = resolve_placeholders(&record.info_url, &record);

        if ticket.insert(Arc::clone(&config), info_url) {
            info!(provider = %name, "Cached client configuration");
        } else {
            debug!(provider = %name, "Provider changed during lookup, not caching");
        }

        Ok(config)
    }

    /// Authorization URL for `name` carrying the anti-forgery `state`.
    pub fn build_redirect(&self, name: &str, state: &str) -> Result<String> {
        if state.is_empty() {
            return Err(ProviderError::InvalidInput("state must not be empty".to_string()));
        }
        let config = self.lookup(name)?;
        Ok(config.build_auth_url(state))
    }

    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(name);
    }
}
