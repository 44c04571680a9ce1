//! Multi-key AES-256-GCM cipher with one active key.

use super::encryption::{self, KEY_SIZE};
use super::{Sealed, SecretCipher};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

struct KeyringInner {
    keys: HashMap<String, Vec<u8>>,
    active: String,
}

/// Set of named AES-256 keys. New secrets are sealed under the active key;
/// older keys stay available so existing ciphertexts keep decrypting until
/// they are rotated.
pub struct Keyring {
    inner: RwLock<KeyringInner>,
}

impl Keyring {
    /// Creates a keyring holding a single key, which becomes active.
    ///
    /// `key_base64` must decode to exactly 32 bytes.
    pub fn with_key(key_id: &str, key_base64: &str) -> Result<Self> {
        let key = encryption::validate_key(key_base64)?;
        Self::from_raw(key_id, key)
    }

    fn from_raw(key_id: &str, key: Vec<u8>) -> Result<Self> {
        if key_id.is_empty() {
            return Err(anyhow!("Key id must not be empty"));
        }
        let mut keys = HashMap::new();
        keys.insert(key_id.to_string(), key);
        Ok(Self {
            inner: RwLock::new(KeyringInner {
                keys,
                active: key_id.to_string(),
            }),
        })
    }

    /// Builds a keyring from `(id, base64 key)` pairs and activates `active_id`.
    pub fn from_keys<'a, I>(active_id: &str, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut decoded = HashMap::new();
        for (id, key) in keys {
            if id.is_empty() {
                return Err(anyhow!("Key id must not be empty"));
            }
            let bytes = encryption::validate_key(key)
                .map_err(|e| anyhow!("Invalid key '{}': {}", id, e))?;
            decoded.insert(id.to_string(), bytes);
        }

        if !decoded.contains_key(active_id) {
            return Err(anyhow!("Active key '{}' is not in the keyring", active_id));
        }

        Ok(Self {
            inner: RwLock::new(KeyringInner {
                keys: decoded,
                active: active_id.to_string(),
            }),
        })
    }

    /// Id of the key new encryptions use.
    pub fn active_key_id(&self) -> String {
        self.read().active.clone()
    }

    /// All key ids, sorted.
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Adds a key without activating it. Replaces any key with the same id.
    pub fn add_key(&self, key_id: &str, key_base64: &str) -> Result<()> {
        if key_id.is_empty() {
            return Err(anyhow!("Key id must not be empty"));
        }
        let key = encryption::validate_key(key_base64)?;
        self.write().keys.insert(key_id.to_string(), key);
        Ok(())
    }

    /// Makes an existing key the active one.
    pub fn activate(&self, key_id: &str) -> Result<()> {
        let mut inner = self.write();
        if !inner.keys.contains_key(key_id) {
            return Err(anyhow!("Unknown key id '{}'", key_id));
        }
        inner.active = key_id.to_string();
        info!(key_id = %key_id, "Activated encryption key");
        Ok(())
    }

    /// Adds `key_base64` under `key_id` and activates it.
    pub fn rotate_to(&self, key_id: &str, key_base64: &str) -> Result<()> {
        self.add_key(key_id, key_base64)?;
        self.activate(key_id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, KeyringInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, KeyringInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretCipher for Keyring {
    fn encrypt(&self, plaintext: &str) -> Result<Sealed> {
        let inner = self.read();
        let key = inner
            .keys
            .get(&inner.active)
            .ok_or_else(|| anyhow!("Active key '{}' missing", inner.active))?;
        let ciphertext = encryption::encrypt(plaintext, key)?;
        Ok(Sealed {
            ciphertext,
            key_id: inner.active.clone(),
        })
    }

    fn decrypt(&self, ciphertext: &str, key_id: &str) -> Result<String> {
        let inner = self.read();
        let key = inner
            .keys
            .get(key_id)
            .ok_or_else(|| anyhow!("Unknown key id '{}'", key_id))?;
        encryption::decrypt(ciphertext, key)
    }
}

/// A fresh key for the `[[encryption.keys]]` config table.
///
/// Nothing is activated here: a key only takes part in encryption once it is
/// in the configuration, so it survives restarts.
#[derive(Clone)]
pub struct GeneratedKey {
    pub id: String,
    /// Base64 of 32 random bytes
    pub key: String,
}

impl GeneratedKey {
    pub fn new() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            id: format!("key-{}", Uuid::now_v7()),
            key: BASE64.encode(key),
        }
    }

    /// TOML snippet to append to the config file.
    pub fn to_toml(&self) -> String {
        format!("[[encryption.keys]]\nid = \"{}\"\nkey = \"{}\"\n", self.id, self.key)
    }
}

impl Default for GeneratedKey {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> String {
        BASE64.encode([byte; 32])
    }

    #[test]
    fn test_encrypt_uses_active_key() {
        let keyring = Keyring::with_key("k1", &key(1)).unwrap();
        let sealed = keyring.encrypt("secret").unwrap();
        assert_eq!(sealed.key_id, "k1");
        assert_eq!(keyring.decrypt(&sealed.ciphertext, "k1").unwrap(), "secret");
    }

    #[test]
    fn test_rotation_keeps_old_keys_for_decrypt() {
        let keyring = Keyring::with_key("k1", &key(1)).unwrap();
        let old = keyring.encrypt("secret").unwrap();

        keyring.rotate_to("k2", &key(2)).unwrap();
        let new = keyring.encrypt("secret").unwrap();

        assert_eq!(new.key_id, "k2");
        assert_eq!(keyring.decrypt(&old.ciphertext, &old.key_id).unwrap(), "secret");
        assert_eq!(keyring.decrypt(&new.ciphertext, &new.key_id).unwrap(), "secret");
    }

    #[test]
    fn test_decrypt_with_wrong_key_id_fails() {
        let keyring = Keyring::with_key("k1", &key(1)).unwrap();
        keyring.add_key("k2", &key(2)).unwrap();
        let sealed = keyring.encrypt("secret").unwrap();

        assert!(keyring.decrypt(&sealed.ciphertext, "k2").is_err());
        assert!(keyring.decrypt(&sealed.ciphertext, "missing").is_err());
    }

    #[test]
    fn test_activate_unknown_key_fails() {
        let keyring = Keyring::with_key("k1", &key(1)).unwrap();
        assert!(keyring.activate("nope").is_err());
        assert_eq!(keyring.active_key_id(), "k1");
    }

    #[test]
    fn test_from_keys_requires_active_key() {
        let k1 = key(1);
        let k2 = key(2);
        let keyring = Keyring::from_keys("k2", [("k1", k1.as_str()), ("k2", k2.as_str())]).unwrap();
        assert_eq!(keyring.active_key_id(), "k2");
        assert_eq!(keyring.key_ids(), vec!["k1".to_string(), "k2".to_string()]);

        assert!(Keyring::from_keys("k3", [("k1", k1.as_str())]).is_err());
        assert!(Keyring::from_keys("k1", [("k1", "short")]).is_err());
    }

    #[test]
    fn test_generated_key_loads_into_keyring() {
        let first = GeneratedKey::new();
        let second = GeneratedKey::new();
        assert_ne!(first.id, second.id);
        assert_ne!(first.key, second.key);

        let keyring =
            Keyring::from_keys(&first.id, [(first.id.as_str(), first.key.as_str())]).unwrap();
        let sealed = keyring.encrypt("secret").unwrap();
        assert_eq!(sealed.key_id, first.id);
        assert_eq!(keyring.decrypt(&sealed.ciphertext, &first.id).unwrap(), "secret");
    }

    #[test]
    fn test_generated_key_toml_parses() {
        let generated = GeneratedKey::new();
        let config: crate::config::VaultConfig = toml::from_str(&generated.to_toml()).unwrap();
        assert_eq!(config.encryption.keys.len(), 1);
        assert_eq!(config.encryption.keys[0].id, generated.id);
        assert_eq!(config.encryption.keyring().unwrap().active_key_id(), generated.id);
    }
}
