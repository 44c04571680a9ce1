//! Provider lifecycle: create, read, list and update.
//!
//! Secrets are sealed before anything is written and the plaintext is taken
//! out of the input first, so it is never persisted or logged. Reads decrypt
//! for a single record only; lists always mask.

use crate::codec::{self, ProviderInfo, SecretString, SECRET_MASK, SECRET_UNAVAILABLE};
use crate::config::ListingConfig;
use crate::crypto::{Sealed, SecretCipher};
use crate::error::{ProviderError, Result};
use crate::redirect::RedirectCache;
use crate::store::{ProviderFilter, ProviderRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};


/// List query. `page` is 1-based.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub page_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderPage {
    pub items: Vec<ProviderInfo>,
    pub total: u64,
}

pub struct ProviderService {
    store: Arc<dyn ProviderRepository>,
    cipher: Arc<dyn SecretCipher>,
    cache: Arc<RedirectCache>,
    listing: ListingConfig,
}

impl ProviderService {
    pub fn new(
        store: Arc<dyn ProviderRepository>,
        cipher: Arc<dyn SecretCipher>,
        cache: Arc<RedirectCache>,
    ) -> Self {
        Self {
            store,
            cipher,
            cache,
            listing: ListingConfig::default(),
        }
    }

    pub fn with_listing(mut self, listing: ListingConfig) -> Self {
        self.listing = listing;
        self
    }

    /// Creates a provider and returns its id.
    ///
    /// A supplied secret is encrypted first; if that fails nothing is stored.
    pub fn create(&self, mut input: ProviderInfo) -> Result<i64> {
        let secret = input.client_secret.take();

        let name = input.name.as_deref().unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ProviderError::InvalidInput("name is required".to_string()));
        }

        let mut record = codec::record_from_info(&input);
        if let Some(secret) = supplied(secret) {
            record.seal(self.seal(name, &secret)?);
        }

        let id = self.store.create(&record).map_err(|e| {
            warn!(provider = %name, error = %e, "Failed to create provider");
            ProviderError::from(e)
        })?;

        info!(
            provider = %name,
            provider_id = id,
            has_secret = record.has_ciphertext(),
            "Provider created"
        );
        Ok(id)
    }

    /// Full view of one provider with the secret decrypted.
    ///
    /// A secret that cannot be decrypted is rendered as
    /// [`SECRET_UNAVAILABLE`] rather than failing the read. An unmigrated
    /// plaintext secret is never returned; it renders as [`SECRET_MASK`].
    pub fn read(&self, id: i64) -> Result<ProviderInfo> {
        let record = self.store.get(id)?;
        let mut view = codec::info_from_record(&record);

        if record.has_ciphertext() {
            let secret = match self
                .cipher
                .decrypt(&record.encrypted_secret, &record.encryption_key_id)
            {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!(
                        provider_id = id,
                        key_id = %record.encryption_key_id,
                        error = %e,
                        "Failed to decrypt client secret"
                    );
                    SECRET_UNAVAILABLE.to_string()
                }
            };
            view.client_secret = Some(SecretString::new(secret));
            view.encrypted_secret = Some(record.encrypted_secret);
            view.encryption_key_id = Some(record.encryption_key_id);
        } else if !record.legacy_secret.is_empty() {
            view.client_secret = Some(SecretString::new(SECRET_MASK));
        }

        Ok(view)
    }

    /// One page of providers, optionally filtered by a name substring.
    /// Secrets are always masked.
    pub fn list(&self, request: &ListRequest) -> Result<ProviderPage> {
        let page = request.page.max(1);
        let page_size = self.listing.page_size(request.page_size);

        let mut filter = ProviderFilter {
            name_contains: request.name.clone().filter(|n| !n.is_empty()),
            ..ProviderFilter::default()
        };
        let total = self.store.count(&filter)?;

        filter.offset = Some((page - 1).saturating_mul(page_size));
        filter.limit = Some(page_size);
        let records = self.store.query(&filter)?;

        debug!(page, page_size, total, returned = records.len(), "Listed providers");

        let items = records
            .iter()
            .map(|record| {
                let mut view = codec::info_from_record(record);
                view.client_secret = Some(SecretString::new(SECRET_MASK));
                if !record.encrypted_secret.is_empty() {
                    view.encrypted_secret = Some(SECRET_MASK.to_string());
                    view.encryption_key_id = Some(record.encryption_key_id.clone());
                }
                view
            })
            .collect();

        Ok(ProviderPage { items, total })
    }

    /// Applies the fields present in `input` to the provider `input.id`.
    ///
    /// The secret is re-encrypted only when a new one is supplied; otherwise
    /// the stored ciphertext and key id are left alone. Afterwards the
    /// redirect cache is cleared under both the old and the new name.
    pub fn update(&self, mut input: ProviderInfo) -> Result<()> {
        let secret = input.client_secret.take();
        let id = input
            .id
            .ok_or_else(|| ProviderError::InvalidInput("id is required".to_string()))?;

        if matches!(input.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ProviderError::InvalidInput("name must not be empty".to_string()));
        }

        let current = self.store.get(id)?;

        let mut patch = codec::patch_from_info(&input);
        if let Some(secret) = supplied(secret) {
            patch.sealed = Some(self.seal(&current.name, &secret)?);
        }

        self.store.update(id, &patch).map_err(|e| {
            warn!(provider_id = id, error = %e, "Failed to update provider");
            ProviderError::from(e)
        })?;

        self.cache.invalidate(&current.name);
        if let Some(new_name) = patch.name.as_deref().filter(|n| *n != current.name) {
            self.cache.invalidate(new_name);
        }

        info!(
            provider = %current.name,
            provider_id = id,
            secret_changed = patch.sealed.is_some(),
            "Provider updated"
        );
        Ok(())
    }

    fn seal(&self, provider: &str, secret: &SecretString) -> Result<Sealed> {
        self.cipher.encrypt(secret.expose()).map_err(|e| {
            error!(provider = %provider, error = %e, "Failed to encrypt client secret");
            ProviderError::Encrypt(e.to_string())
        })
    }
}

/// A secret that should be stored: present, non-empty, not an echoed mask.
fn supplied(secret: Option<SecretString>) -> Option<SecretString> {
    secret.filter(|s| !s.expose().is_empty() && !s.is_placeholder())
}
