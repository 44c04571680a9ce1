//! Out-of-band secret maintenance: plaintext migration, coverage audit,
//! single-record re-encryption and key rotation.
//!
//! Batches run sequentially and are best-effort: a failing record is logged
//! and recorded in the [`BatchReport`], and processing moves on. Each record
//! is written with one store update that sets the ciphertext and key id and
//! clears the legacy plaintext together, so a record is never half-migrated.
//! The write only applies if the secret is still the one the batch read; a
//! record whose secret was replaced meanwhile is reported as failed and
//! keeps the newer secret. A cancellation request is honoured before each
//! record.

use crate::crypto::{Sealed, SecretCipher};
use crate::error::{ProviderError, Result};
use crate::store::{ProviderFilter, ProviderRecord, ProviderRepository, SecretState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// One record a batch could not process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: i64,
    pub name: String,
    pub error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Nothing was processed
    Empty,
    AllSucceeded,
    PartialFailure,
    AllFailed,
}

/// Aggregate result of a batch run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records selected
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
    /// Stopped early; records after the stop point were not touched
    pub cancelled: bool,
}

impl BatchReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Selected records that were neither applied nor failed (cancellation).
    pub fn skipped(&self) -> usize {
        self.total - self.succeeded - self.failed()
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.succeeded, self.failed()) {
            (0, 0) => BatchOutcome::Empty,
            (_, 0) => BatchOutcome::AllSucceeded,
            (0, _) => BatchOutcome::AllFailed,
            _ => BatchOutcome::PartialFailure,
        }
    }

    /// `Err(BatchIncomplete)` when any record failed.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::BatchIncomplete {
                failed: self.failed(),
                total: self.total,
            })
        }
    }
}

/// Encryption coverage across all provider records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptionCoverage {
    pub total: u64,
    pub encrypted: u64,
    /// Legacy plaintext present, no ciphertext
    pub legacy_pending: u64,
    /// `encrypted / total` as a percentage; 0 when there are no records
    pub encryption_rate: f64,
    /// No record still depends on a legacy plaintext secret
    pub all_encrypted: bool,
}

pub struct SecretMigrator {
    store: Arc<dyn ProviderRepository>,
    cipher: Arc<dyn SecretCipher>,
}

impl SecretMigrator {
    pub fn new(store: Arc<dyn ProviderRepository>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { store, cipher }
    }

    /// Encrypts every legacy plaintext secret that has no ciphertext yet.
    ///
    /// Running it again selects nothing.
    pub fn migrate(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        let records = self
            .store
            .query(&ProviderFilter::with_secret_state(SecretState::LegacyOnly))?;

        info!(count = records.len(), "Starting plaintext secret migration");
        let report = self.run_batch("migrate", records, cancel, |record| {
            let sealed = self
                .cipher
                .encrypt(&record.legacy_secret)
                .map_err(|e| ProviderError::Encrypt(e.to_string()))?;
            self.store_sealed(record, &sealed)
        });
        Ok(report)
    }

    /// Counts records by secret state. Read-only.
    pub fn validate(&self) -> Result<EncryptionCoverage> {
        let total = self.store.count(&ProviderFilter::default())?;
        let encrypted = self
            .store
            .count(&ProviderFilter::with_secret_state(SecretState::Encrypted))?;
        let legacy_pending = self
            .store
            .count(&ProviderFilter::with_secret_state(SecretState::LegacyOnly))?;

        let encryption_rate = if total == 0 {
            0.0
        } else {
            encrypted as f64 / total as f64 * 100.0
        };

        let coverage = EncryptionCoverage {
            total,
            encrypted,
            legacy_pending,
            encryption_rate,
            all_encrypted: legacy_pending == 0,
        };
        debug!(?coverage, "Computed encryption coverage");
        Ok(coverage)
    }

    /// Re-encrypts one provider's secret under the active key.
    ///
    /// The plaintext comes from the existing ciphertext if there is one,
    /// otherwise from the legacy field.
    pub fn reencrypt(&self, id: i64) -> Result<()> {
        let record = self.store.get(id)?;
        self.reencrypt_record(&record)?;
        info!(provider = %record.name, provider_id = id, "Re-encrypted client secret");
        Ok(())
    }

    /// Re-encrypts every record that already has a ciphertext. Records with
    /// only a legacy plaintext are left for [`migrate`](Self::migrate).
    pub fn rotate_all(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        let records = self
            .store
            .query(&ProviderFilter::with_secret_state(SecretState::Encrypted))?;

        info!(count = records.len(), "Starting key rotation");
        let report = self.run_batch("rotate", records, cancel, |record| {
            self.reencrypt_record(record)
        });
        Ok(report)
    }

    fn reencrypt_record(&self, record: &ProviderRecord) -> Result<()> {
        let plaintext = if record.has_ciphertext() {
            self.cipher
                .decrypt(&record.encrypted_secret, &record.encryption_key_id)
                .map_err(|e| ProviderError::Decrypt(e.to_string()))?
        } else if !record.legacy_secret.is_empty() {
            record.legacy_secret.clone()
        } else {
            return Err(ProviderError::NoSecret(record.id));
        };

        let sealed = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| ProviderError::Encrypt(e.to_string()))?;
        self.store_sealed(record, &sealed)
    }

    /// Writes `sealed` only if the secret is still the one `record` was
    /// read with, so a concurrent secret update is never overwritten.
    fn store_sealed(&self, record: &ProviderRecord, sealed: &Sealed) -> Result<()> {
        if self.store.seal_if_unchanged(record.id, record, sealed)? {
            Ok(())
        } else {
            Err(ProviderError::Changed(record.id))
        }
    }

    fn run_batch<F>(
        &self,
        operation: &str,
        records: Vec<ProviderRecord>,
        cancel: &CancellationToken,
        mut apply: F,
    ) -> BatchReport
    where
        F: FnMut(&ProviderRecord) -> Result<()>,
    {
        let mut report = BatchReport::new(records.len());

        for record in &records {
            if cancel.is_cancelled() {
                report.cancelled = true;
                warn!(
                    operation,
                    processed = report.succeeded + report.failed(),
                    remaining = report.skipped(),
                    "Batch cancelled"
                );
                break;
            }

            match apply(record) {
                Ok(()) => {
                    report.succeeded += 1;
                    debug!(operation, provider = %record.name, provider_id = record.id, "Record processed");
                }
                Err(e) => {
                    warn!(
                        operation,
                        provider = %record.name,
                        provider_id = record.id,
                        error = %e,
                        "Record failed"
                    );
                    report.failures.push(BatchFailure {
                        id: record.id,
                        name: record.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            operation,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed(),
            cancelled = report.cancelled,
            "Batch finished"
        );
        report
    }
}
