//! Integration tests for recipient changes and re-encryption

mod common;

use ::common::prelude::*;
use ::common::testkit::{ContainerBuilder, FakeCrypto};
use crate::common::{p, read, recipients, recipients_of, seal, setup_store};

#[tokio::test]
async fn test_set_recipients_reencrypts_governed_secrets() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/team/a.gpg", "/team/sub/b.gpg", "/other.gpg"]).await;

    let mut tx = store.begin_as("alice").unwrap();
    tx.set_recipients(&p("/team"), recipients(&[2, 3, 2])).unwrap();
    assert_eq!(
        tx.pending_reencryption(),
        vec![p("/team/a.gpg"), p("/team/sub/b.gpg")]
    );

    let reencryptor = DecryptThenEncrypt::new(FakeCrypto::new());
    tx.commit_with(&reencryptor).await.unwrap();

    for path in ["/team/a.gpg", "/team/sub/b.gpg"] {
        assert!(recipients_of(&store, path)
            .unwrap()
            .set_eq(&recipients(&[2, 3])));
        // the secret itself survives re-encryption
        let plaintext = ContainerBuilder::open(&read(&store, path).unwrap()).unwrap();
        assert_eq!(plaintext, path.as_bytes().to_vec());
    }
    assert_eq!(recipients_of(&store, "/other.gpg").unwrap(), recipients(&[1]));
    assert_eq!(recipients_of(&store, "/team").unwrap(), recipients(&[2, 3]));
}

#[tokio::test]
async fn test_nested_policy_shadows_change() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/team/a.gpg"]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/team/ops"), recipients(&[9])).unwrap();
    tx.put(&p("/team/ops/key.gpg"), seal(&[9], b"k")).unwrap();
    tx.commit().await.unwrap();

    let crypto = FakeCrypto::new();
    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/team"), recipients(&[2])).unwrap();
    assert_eq!(tx.pending_reencryption(), vec![p("/team/a.gpg")]);
    tx.commit_with(&DecryptThenEncrypt::new(crypto.clone()))
        .await
        .unwrap();

    assert_eq!(crypto.encrypt_calls(), 1);
    assert_eq!(
        recipients_of(&store, "/team/ops/key.gpg").unwrap(),
        recipients(&[9])
    );
}

#[tokio::test]
async fn test_commit_without_reencryption_fails() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/team/a.gpg"]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/team"), recipients(&[2])).unwrap();
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::ReencryptionFailed { .. }));
    assert!(err.is_internal());

    // no reader ever sees the new policy over stale ciphertext
    assert_eq!(recipients_of(&store, "/team").unwrap(), recipients(&[1]));
}

#[tokio::test]
async fn test_failure_midway_changes_nothing() {
    let store = setup_store(&[1]).await;
    let paths = ["/d/1.gpg", "/d/2.gpg", "/d/3.gpg", "/d/4.gpg", "/d/5.gpg"];
    common::seed(&store, &[1], &paths).await;
    let before: Vec<_> = paths.iter().map(|path| read(&store, path).unwrap()).collect();

    let crypto = FakeCrypto::new().failing_on("/d/3.gpg");
    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[1, 2])).unwrap();
    let result = tx.commit_with(&DecryptThenEncrypt::new(crypto.clone())).await;

    match result {
        Err(StoreError::ReencryptionFailed { path, .. }) => assert_eq!(path, p("/d/3.gpg")),
        other => panic!("expected re-encryption failure, got {:?}", other),
    }
    assert_eq!(crypto.encrypt_calls(), 3);

    let after: Vec<_> = paths.iter().map(|path| read(&store, path).unwrap()).collect();
    assert_eq!(before, after);
    assert_eq!(recipients_of(&store, "/d").unwrap(), recipients(&[1]));
    assert_eq!(store.version(), 1);
}

#[tokio::test]
async fn test_reencryption_output_is_verified() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/d/a.gpg"]).await;

    let crypto = FakeCrypto::new().mislabeling("/d/a.gpg");
    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[2])).unwrap();
    let result = tx.reencrypt(&DecryptThenEncrypt::new(crypto)).await;
    assert!(matches!(result, Err(StoreError::ReencryptionFailed { .. })));

    // the failure is sticky
    assert!(matches!(
        tx.commit().await,
        Err(StoreError::ReencryptionFailed { .. })
    ));
    assert_eq!(recipients_of(&store, "/d/a.gpg").unwrap(), recipients(&[1]));
}

#[tokio::test]
async fn test_supplied_ciphertexts() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/d/a.gpg", "/d/b.gpg"]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[4])).unwrap();

    let mut supplied = SuppliedCiphertexts::new();
    supplied.insert(p("/d/a.gpg"), seal(&[4], b"a"));
    // one missing ciphertext fails the whole change
    assert!(matches!(
        tx.reencrypt(&supplied).await,
        Err(StoreError::ReencryptionFailed { .. })
    ));

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[4])).unwrap();
    supplied.insert(p("/d/b.gpg"), seal(&[4], b"b"));
    assert_eq!(tx.reencrypt(&supplied).await.unwrap(), 2);
    assert!(tx.pending_reencryption().is_empty());
    tx.commit().await.unwrap();

    assert_eq!(recipients_of(&store, "/d/b.gpg").unwrap(), recipients(&[4]));
}

#[tokio::test]
async fn test_put_or_delete_clears_queue() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/d/a.gpg", "/d/b.gpg"]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[2])).unwrap();
    tx.put(&p("/d/a.gpg"), seal(&[2], b"rewritten")).unwrap();
    tx.delete(&p("/d/b.gpg")).unwrap();
    assert!(tx.pending_reencryption().is_empty());
    tx.commit().await.unwrap();

    assert_eq!(recipients_of(&store, "/d/a.gpg").unwrap(), recipients(&[2]));
}

#[tokio::test]
async fn test_reverting_policy_needs_no_reencryption() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/d/a.gpg"]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[2])).unwrap();
    tx.set_recipients(&p("/d"), recipients(&[1])).unwrap();
    assert!(tx.pending_reencryption().is_empty());
    tx.commit().await.unwrap();

    let tx = store.begin().unwrap();
    assert_eq!(tx.explicit_recipients(&p("/d")).unwrap(), recipients(&[1]));
}

#[tokio::test]
async fn test_clearing_policy_inherits_from_parent() {
    let store = setup_store(&[1]).await;

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), recipients(&[2])).unwrap();
    tx.put(&p("/d/a.gpg"), seal(&[2], b"a")).unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().unwrap();
    tx.set_recipients(&p("/d"), Recipients::new()).unwrap();
    assert_eq!(tx.recipients(&p("/d")).unwrap(), recipients(&[1]));
    assert_eq!(tx.governed_secrets(&p("/d")).unwrap(), vec![p("/d/a.gpg")]);
    tx.commit_with(&DecryptThenEncrypt::new(FakeCrypto::new()))
        .await
        .unwrap();

    assert_eq!(recipients_of(&store, "/d/a.gpg").unwrap(), recipients(&[1]));
    let tx = store.begin().unwrap();
    assert!(tx.explicit_recipients(&p("/d")).unwrap().is_empty());
}

#[tokio::test]
async fn test_root_policy_cannot_be_emptied() {
    let store = setup_store(&[1]).await;

    let mut tx = store.begin().unwrap();
    assert!(matches!(
        tx.set_recipients(&p("/"), Recipients::new()),
        Err(StoreError::InvalidRecipients(_))
    ));
    tx.set_recipients(&p("/"), recipients(&[1, 2])).unwrap();
    assert!(tx.pending_reencryption().is_empty());
}
