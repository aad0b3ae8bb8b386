use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::recipient::Recipients;
use crate::tree::SecretPath;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no key available to decrypt {0}")]
    NoKey(SecretPath),
    #[error("no ciphertext was supplied for {0}")]
    Missing(SecretPath),
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Caller-supplied cryptography. The store never holds private keys,
///  so anything that has to see plaintext lives behind this trait.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    async fn decrypt(&self, path: &SecretPath, ciphertext: &Bytes) -> Result<Bytes, CryptoError>;

    async fn encrypt(
        &self,
        path: &SecretPath,
        plaintext: &Bytes,
        recipients: &Recipients,
    ) -> Result<Bytes, CryptoError>;
}

/// Produces a container for `recipients` holding the same secret as
///  `ciphertext`. Output is verified by the transaction, not here.
#[async_trait]
pub trait Reencryptor: Send + Sync {
    async fn reencrypt(
        &self,
        path: &SecretPath,
        ciphertext: &Bytes,
        recipients: &Recipients,
    ) -> Result<Bytes, CryptoError>;
}

/// Re-encrypt by decrypting with the caller's key and encrypting again
#[derive(Debug, Clone)]
pub struct DecryptThenEncrypt<P> {
    provider: P,
}

impl<P: CryptoProvider> DecryptThenEncrypt<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: CryptoProvider> Reencryptor for DecryptThenEncrypt<P> {
    async fn reencrypt(
        &self,
        path: &SecretPath,
        ciphertext: &Bytes,
        recipients: &Recipients,
    ) -> Result<Bytes, CryptoError> {
        let plaintext = self.provider.decrypt(path, ciphertext).await?;
        self.provider.encrypt(path, &plaintext, recipients).await
    }
}

/// Ciphertext that was re-encrypted ahead of time, e.g. by a browser
///  client holding the user's key. Paths it was not given fail.
#[derive(Debug, Clone, Default)]
pub struct SuppliedCiphertexts {
    ciphertexts: BTreeMap<SecretPath, Bytes>,
}

impl SuppliedCiphertexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: SecretPath, ciphertext: impl Into<Bytes>) {
        self.ciphertexts.insert(path, ciphertext.into());
    }

    pub fn contains(&self, path: &SecretPath) -> bool {
        self.ciphertexts.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.ciphertexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertexts.is_empty()
    }
}

impl FromIterator<(SecretPath, Bytes)> for SuppliedCiphertexts {
    fn from_iter<I: IntoIterator<Item = (SecretPath, Bytes)>>(iter: I) -> Self {
        Self {
            ciphertexts: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Reencryptor for SuppliedCiphertexts {
    async fn reencrypt(
        &self,
        path: &SecretPath,
        _ciphertext: &Bytes,
        _recipients: &Recipients,
    ) -> Result<Bytes, CryptoError> {
        self.ciphertexts
            .get(path)
            .cloned()
            .ok_or_else(|| CryptoError::Missing(path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract_recipients;
    use crate::recipient::Recipient;
    use crate::testkit::{ContainerBuilder, FakeCrypto};

    #[tokio::test]
    async fn test_decrypt_then_encrypt() {
        let old: Recipients = vec![Recipient::from_u64(1)].into();
        let new: Recipients = vec![Recipient::from_u64(2), Recipient::from_u64(3)].into();
        let path = SecretPath::new("/a.gpg");

        let ciphertext = Bytes::from(ContainerBuilder::seal(&old, b"hunter2"));
        let reencryptor = DecryptThenEncrypt::new(FakeCrypto::new());
        let next = reencryptor.reencrypt(&path, &ciphertext, &new).await.unwrap();

        assert!(extract_recipients(&next).unwrap().set_eq(&new));
        assert_eq!(ContainerBuilder::open(&next).unwrap(), b"hunter2".to_vec());
    }

    #[tokio::test]
    async fn test_supplied_ciphertexts() {
        let path = SecretPath::new("/a.gpg");
        let supplied: SuppliedCiphertexts =
            [(path.clone(), Bytes::from_static(b"new"))].into_iter().collect();

        let out = supplied
            .reencrypt(&path, &Bytes::new(), &Recipients::new())
            .await
            .unwrap();
        assert_eq!(out.as_ref(), b"new");

        let missing = supplied
            .reencrypt(&SecretPath::new("/b.gpg"), &Bytes::new(), &Recipients::new())
            .await;
        assert!(matches!(missing, Err(CryptoError::Missing(_))));
    }
}
