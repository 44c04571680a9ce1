//! Client secret encryption at rest.
//!
//! Provider client secrets are sealed with AES-256-GCM before they reach the
//! record store. Every ciphertext is paired with the id of the key that
//! produced it, which is what makes key rotation possible.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   ProviderService / SecretMigrator       │
//! │   RedirectResolver                       │
//! └─────────────────────────────────────────┘
//!          ↓ encrypt            ↑ decrypt
//! ┌─────────────────────────────────────────┐
//! │       SecretCipher (trait)               │
//! │  - (ciphertext, key_id) pairs            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Keyring                            │
//! │  - AES-256-GCM, one active key           │
//! │  - Retired keys kept for decryption      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use idp_vault::crypto::{Keyring, SecretCipher};
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("IDP_VAULT_ENCRYPTION_KEY")?;
//! let keyring = Keyring::with_key("2026-10", &key)?;
//!
//! let sealed = keyring.encrypt("client-secret")?;
//! let plaintext = keyring.decrypt(&sealed.ciphertext, &sealed.key_id)?;
//! assert_eq!(plaintext, "client-secret");
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

mod encryption;
mod keyring;

pub use encryption::{decrypt, encrypt, validate_key};
pub use keyring::{GeneratedKey, Keyring};

/// Ciphertext together with the id of the key that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub key_id: String,
}

/// Encrypt/decrypt contract used by everything that touches client secrets.
///
/// Implementations must be safe to call concurrently. Key ids are opaque to
/// callers; they are stored next to the ciphertext and handed back verbatim.
pub trait SecretCipher: Send + Sync {
    /// Encrypts under the currently active key.
    fn encrypt(&self, plaintext: &str) -> Result<Sealed>;

    /// Decrypts with the key named by `key_id`.
    fn decrypt(&self, ciphertext: &str, key_id: &str) -> Result<String>;
}
