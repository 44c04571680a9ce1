//! Fixtures shared by unit tests.

use crate::crypto::{Keyring, Sealed, SecretCipher};
use crate::store::{
    ProviderFilter, ProviderPatch, ProviderRecord, ProviderRepository, SqliteProviderStore,
    StoreError,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_key(byte: u8) -> String {
    BASE64.encode([byte; 32])
}

pub fn keyring() -> Arc<Keyring> {
    Arc::new(Keyring::with_key("k1", &test_key(1)).expect("keyring"))
}

pub fn memory_store() -> Arc<SqliteProviderStore> {
    Arc::new(SqliteProviderStore::new(":memory:").expect("in-memory store failed"))
}

/// Cipher that can be told to fail, delegating to a real keyring otherwise.
pub struct FlakyCipher {
    pub inner: Arc<Keyring>,
    pub fail_encrypt: AtomicBool,
    pub fail_decrypt: AtomicBool,
    /// Encryption of these exact plaintexts fails
    pub poisoned: Mutex<HashSet<String>>,
}

impl FlakyCipher {
    pub fn new(inner: Arc<Keyring>) -> Self {
        Self {
            inner,
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            poisoned: Mutex::new(HashSet::new()),
        }
    }

    pub fn poison(&self, plaintext: &str) {
        self.poisoned.lock().unwrap().insert(plaintext.to_string());
    }
}

impl SecretCipher for FlakyCipher {
    fn encrypt(&self, plaintext: &str) -> Result<Sealed> {
        if self.fail_encrypt.load(Ordering::SeqCst)
            || self.poisoned.lock().unwrap().contains(plaintext)
        {
            return Err(anyhow!("cipher unavailable"));
        }
        self.inner.encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &str, key_id: &str) -> Result<String> {
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(anyhow!("cipher unavailable"));
        }
        self.inner.decrypt(ciphertext, key_id)
    }
}

/// Store whose updates fail for chosen record ids.
pub struct FlakyStore {
    pub inner: Arc<SqliteProviderStore>,
    pub failing_updates: Mutex<HashSet<i64>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteProviderStore>) -> Self {
        Self {
            inner,
            failing_updates: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_updates_for(&self, id: i64) {
        self.failing_updates.lock().unwrap().insert(id);
    }
}

impl ProviderRepository for FlakyStore {
    fn create(&self, record: &ProviderRecord) -> Result<i64, StoreError> {
        self.inner.create(record)
    }

    fn get(&self, id: i64) -> Result<ProviderRecord, StoreError> {
        self.inner.get(id)
    }

    fn query(&self, filter: &ProviderFilter) -> Result<Vec<ProviderRecord>, StoreError> {
        self.inner.query(filter)
    }

    fn update(&self, id: i64, patch: &ProviderPatch) -> Result<(), StoreError> {
        if self.failing_updates.lock().unwrap().contains(&id) {
            return Err(StoreError::Backend(anyhow!("disk full")));
        }
        self.inner.update(id, patch)
    }

    fn seal_if_unchanged(
        &self,
        id: i64,
        expected: &ProviderRecord,
        sealed: &Sealed,
    ) -> Result<bool, StoreError> {
        if self.failing_updates.lock().unwrap().contains(&id) {
            return Err(StoreError::Backend(anyhow!("disk full")));
        }
        self.inner.seal_if_unchanged(id, expected, sealed)
    }

    fn count(&self, filter: &ProviderFilter) -> Result<u64, StoreError> {
        self.inner.count(filter)
    }
}

/// Store that replaces the secret of every queried record right after the
/// query returns, the way an admin update landing mid-batch would.
pub struct RacingStore {
    pub inner: Arc<SqliteProviderStore>,
    cipher: Arc<dyn SecretCipher>,
    secret: String,
    raced: AtomicBool,
}

impl RacingStore {
    pub fn new(inner: Arc<SqliteProviderStore>, cipher: Arc<dyn SecretCipher>, secret: &str) -> Self {
        Self {
            inner,
            cipher,
            secret: secret.to_string(),
            raced: AtomicBool::new(false),
        }
    }
}

impl ProviderRepository for RacingStore {
    fn create(&self, record: &ProviderRecord) -> Result<i64, StoreError> {
        self.inner.create(record)
    }

    fn get(&self, id: i64) -> Result<ProviderRecord, StoreError> {
        self.inner.get(id)
    }

    fn query(&self, filter: &ProviderFilter) -> Result<Vec<ProviderRecord>, StoreError> {
        let records = self.inner.query(filter)?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            for record in &records {
                let sealed = self.cipher.encrypt(&self.secret).expect("encrypt");
                self.inner.update(record.id, &ProviderPatch::sealed(sealed))?;
            }
        }
        Ok(records)
    }

    fn update(&self, id: i64, patch: &ProviderPatch) -> Result<(), StoreError> {
        self.inner.update(id, patch)
    }

    fn seal_if_unchanged(
        &self,
        id: i64,
        expected: &ProviderRecord,
        sealed: &Sealed,
    ) -> Result<bool, StoreError> {
        self.inner.seal_if_unchanged(id, expected, sealed)
    }

    fn count(&self, filter: &ProviderFilter) -> Result<u64, StoreError> {
        self.inner.count(filter)
    }
}

/// Inserts a record holding only a legacy plaintext secret.
pub fn insert_legacy(store: &dyn ProviderRepository, name: &str, secret: &str) -> i64 {
    let mut record = ProviderRecord::new(name);
    record.client_id = format!("{}-client", name);
    record.legacy_secret = secret.to_string();
    record.auth_url = "https://idp.example.com/authorize".to_string();
    store.create(&record).expect("insert legacy record")
}

/// Inserts a record whose secret is sealed by `cipher`.
pub fn insert_encrypted(
    store: &dyn ProviderRepository,
    cipher: &dyn SecretCipher,
    name: &str,
    secret: &str,
) -> i64 {
    let mut record = ProviderRecord::new(name);
    record.client_id = format!("{}-client", name);
    record.auth_url = "https://idp.example.com/authorize".to_string();
    record.seal(cipher.encrypt(secret).expect("encrypt"));
    store.create(&record).expect("insert encrypted record")
}
