//! Shared helpers for secret store integration tests
#![allow(dead_code)]

use bytes::Bytes;
use common::prelude::*;
use common::testkit::ContainerBuilder;

pub fn p(path: &str) -> SecretPath {
    SecretPath::new(path)
}

pub fn recipients(ids: &[u64]) -> Recipients {
    ids.iter().map(|id| Recipient::from_u64(*id)).collect()
}

/// A container naming `ids` that wraps `plaintext`
pub fn seal(ids: &[u64], plaintext: &[u8]) -> Bytes {
    Bytes::from(ContainerBuilder::seal(&recipients(ids), plaintext))
}

/// Open an in-memory store whose root is readable by `root`
pub async fn setup_store(root: &[u64]) -> SecretStore<MemoryBackend> {
    SecretStore::open(MemoryBackend::new(), StoreConfig::new(recipients(root)))
        .await
        .unwrap()
}

/// Commit one secret per entry, each sealed to `ids`
pub async fn seed(store: &SecretStore<MemoryBackend>, ids: &[u64], paths: &[&str]) -> u64 {
    let mut tx = store.begin().unwrap();
    for path in paths {
        tx.put(&p(path), seal(ids, path.as_bytes())).unwrap();
    }
    tx.commit().await.unwrap()
}

/// Read a secret's ciphertext in a fresh transaction
pub fn read(store: &SecretStore<MemoryBackend>, path: &str) -> Result<Bytes, StoreError> {
    store.begin().unwrap().get(&p(path))
}

/// Read a path's recipients in a fresh transaction
pub fn recipients_of(
    store: &SecretStore<MemoryBackend>,
    path: &str,
) -> Result<Recipients, StoreError> {
    store.begin().unwrap().recipients(&p(path))
}
