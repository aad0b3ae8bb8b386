//! Integration tests for reopening a store from its backend

mod common;

use ::common::prelude::*;
use crate::common::{p, recipients, seal};

#[tokio::test]
async fn test_reopen_restores_state() {
    let backend = MemoryBackend::new();
    let store = SecretStore::open(backend.clone(), StoreConfig::new(recipients(&[1])))
        .await
        .unwrap();

    let mut tx = store.begin_as("alice").unwrap();
    tx.set_message("add github");
    tx.set_recipients(&p("/team"), recipients(&[2])).unwrap();
    tx.put(&p("/team/github.gpg"), seal(&[2], b"gh")).unwrap();
    tx.put(&p("/old.gpg"), seal(&[1], b"old")).unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().unwrap();
    tx.delete(&p("/old.gpg")).unwrap();
    tx.commit().await.unwrap();
    store.close();

    // configured root is ignored once state exists
    let reopened = SecretStore::open(backend.clone(), StoreConfig::new(recipients(&[7])))
        .await
        .unwrap();
    assert_eq!(reopened.version(), 2);

    let mut tx = reopened.begin().unwrap();
    assert_eq!(tx.recipients(&p("/")).unwrap(), recipients(&[1]));
    assert_eq!(tx.recipients(&p("/team")).unwrap(), recipients(&[2]));
    assert_eq!(tx.get(&p("/team/github.gpg")).unwrap(), seal(&[2], b"gh"));
    assert!(!tx.exists(&p("/old.gpg")).unwrap());

    let log = backend.log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[1].author.as_deref(), Some("alice"));
    assert_eq!(log[1].message.as_deref(), Some("add github"));
    assert_eq!(log[2].changes, vec![Change::Removed { path: p("/old.gpg") }]);
}

#[tokio::test]
async fn test_genesis_requires_root_recipients() {
    let result = SecretStore::open(MemoryBackend::new(), StoreConfig::new(Recipients::new())).await;
    assert!(matches!(result, Err(StoreError::InvalidRecipients(_))));
}

#[tokio::test]
async fn test_backend_failure_is_unavailable() {
    let backend = MemoryBackend::new();
    let store = SecretStore::open(backend.clone(), StoreConfig::new(recipients(&[1])))
        .await
        .unwrap();

    let mut tx = store.begin().unwrap();
    tx.put(&p("/a.gpg"), seal(&[1], b"a")).unwrap();

    backend.set_unavailable(true);
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(err.is_internal());
    backend.set_unavailable(false);

    // nothing was applied
    assert_eq!(store.version(), 0);
    let tx = store.begin().unwrap();
    assert!(!tx.exists(&p("/a.gpg")).unwrap());
}

#[tokio::test]
async fn test_closed_store_refuses_work() {
    let store = SecretStore::open(MemoryBackend::new(), StoreConfig::new(recipients(&[1])))
        .await
        .unwrap();

    let mut open_tx = store.begin().unwrap();
    open_tx.put(&p("/a.gpg"), seal(&[1], b"a")).unwrap();

    store.close();
    assert!(matches!(store.begin(), Err(StoreError::Unavailable(_))));
    assert!(matches!(
        open_tx.commit().await,
        Err(StoreError::Unavailable(_))
    ));
}
