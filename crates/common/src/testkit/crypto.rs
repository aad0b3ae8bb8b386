use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::ContainerBuilder;
use crate::recipient::{Recipient, Recipients};
use crate::reencrypt::{CryptoError, CryptoProvider};
use crate::tree::SecretPath;

/// A [`CryptoProvider`] over [`ContainerBuilder`] containers.
///
/// Decryption succeeds for any container it can unframe. Paths can
///  be set up to fail, or to come back encrypted to the wrong set.
#[derive(Debug, Clone, Default)]
pub struct FakeCrypto {
    failing: BTreeSet<SecretPath>,
    mislabeled: BTreeSet<SecretPath>,
    calls: Arc<AtomicUsize>,
}

impl FakeCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail to encrypt `path`
    pub fn failing_on(mut self, path: impl Into<SecretPath>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Encrypt `path` to an extra, unrequested recipient
    pub fn mislabeling(mut self, path: impl Into<SecretPath>) -> Self {
        self.mislabeled.insert(path.into());
        self
    }

    /// Number of encrypt calls made so far
    pub fn encrypt_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoProvider for FakeCrypto {
    async fn decrypt(&self, path: &SecretPath, ciphertext: &Bytes) -> Result<Bytes, CryptoError> {
        ContainerBuilder::open(ciphertext)
            .map(Bytes::from)
            .ok_or_else(|| CryptoError::NoKey(path.clone()))
    }

    async fn encrypt(
        &self,
        path: &SecretPath,
        plaintext: &Bytes,
        recipients: &Recipients,
    ) -> Result<Bytes, CryptoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(path) {
            return Err(anyhow::anyhow!("encryption failed for {}", path).into());
        }

        let mut recipients = recipients.clone();
        if self.mislabeled.contains(path) {
            recipients.insert(Recipient::from_u64(u64::MAX));
        }
        Ok(Bytes::from(ContainerBuilder::seal(&recipients, plaintext)))
    }
}
