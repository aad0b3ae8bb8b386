//! Integration tests for optimistic commit validation

mod common;

use ::common::prelude::*;
use ::common::testkit::FakeCrypto;
use crate::common::{p, read, recipients, seal, setup_store};

#[tokio::test]
async fn test_second_writer_conflicts() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/p.gpg"]).await;

    let mut a = store.begin().unwrap();
    let mut b = store.begin().unwrap();
    a.put(&p("/p.gpg"), seal(&[1], b"a")).unwrap();
    b.put(&p("/p.gpg"), seal(&[1], b"b")).unwrap();
    b.put(&p("/other.gpg"), seal(&[1], b"b")).unwrap();

    a.commit().await.unwrap();
    let result = b.commit().await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert!(result.unwrap_err().is_retryable());

    assert_eq!(read(&store, "/p.gpg").unwrap(), seal(&[1], b"a"));
    assert!(matches!(
        read(&store, "/other.gpg"),
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.version(), 2);
}

#[tokio::test]
async fn test_retry_after_conflict_succeeds() {
    let store = setup_store(&[1]).await;

    let mut a = store.begin().unwrap();
    let mut b = store.begin().unwrap();
    a.put(&p("/p.gpg"), seal(&[1], b"a")).unwrap();
    b.put(&p("/p.gpg"), seal(&[1], b"b")).unwrap();
    a.commit().await.unwrap();
    assert!(b.commit().await.is_err());

    let mut retry = store.begin().unwrap();
    retry.put(&p("/p.gpg"), seal(&[1], b"b")).unwrap();
    retry.commit().await.unwrap();
    assert_eq!(read(&store, "/p.gpg").unwrap(), seal(&[1], b"b"));
}

#[tokio::test]
async fn test_disjoint_writers_both_commit() {
    let store = setup_store(&[1]).await;

    let mut a = store.begin().unwrap();
    let mut b = store.begin().unwrap();
    a.put(&p("/a/x.gpg"), seal(&[1], b"a")).unwrap();
    b.put(&p("/b/y.gpg"), seal(&[1], b"b")).unwrap();

    assert_eq!(a.commit().await.unwrap(), 1);
    assert_eq!(b.commit().await.unwrap(), 2);

    let tx = store.begin().unwrap();
    assert!(tx.exists(&p("/a/x.gpg")).unwrap());
    assert!(tx.exists(&p("/b/y.gpg")).unwrap());
}

#[tokio::test]
async fn test_put_conflicts_with_policy_change_above_it() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/team/a.gpg"]).await;

    let mut writer = store.begin().unwrap();
    writer.put(&p("/team/b.gpg"), seal(&[1], b"b")).unwrap();

    // someone re-keys the directory the write was validated against
    let mut admin = store.begin().unwrap();
    admin
        .set_recipients(&p("/team"), recipients(&[2]))
        .unwrap();
    let supplied: SuppliedCiphertexts = [(p("/team/a.gpg"), seal(&[2], b"a"))]
        .into_iter()
        .collect();
    admin.commit_with(&supplied).await.unwrap();

    assert!(matches!(
        writer.commit().await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_policy_change_conflicts_with_new_secret_beneath() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/team/a.gpg"]).await;

    let mut admin = store.begin().unwrap();
    let mut writer = store.begin().unwrap();

    writer.put(&p("/team/deep/new.gpg"), seal(&[1], b"n")).unwrap();
    writer.commit().await.unwrap();

    admin
        .set_recipients(&p("/team"), recipients(&[2]))
        .unwrap();
    let supplied: SuppliedCiphertexts = [(p("/team/a.gpg"), seal(&[2], b"a"))]
        .into_iter()
        .collect();
    // the new secret was never re-encrypted, so the policy change must not land
    assert!(matches!(
        admin.commit_with(&supplied).await,
        Err(StoreError::Conflict(_))
    ));

    assert_eq!(
        common::recipients_of(&store, "/team").unwrap(),
        recipients(&[1])
    );
}

#[tokio::test]
async fn test_cleared_policy_conflicts_with_rekey_above_it() {
    let store = setup_store(&[1]).await;
    let mut setup = store.begin().unwrap();
    setup.set_recipients(&p("/a/b"), recipients(&[1])).unwrap();
    setup.put(&p("/a/b/s.gpg"), seal(&[1], b"s")).unwrap();
    setup.put(&p("/a/x.gpg"), seal(&[1], b"x")).unwrap();
    setup.commit().await.unwrap();

    let mut admin = store.begin().unwrap();
    let mut clearer = store.begin().unwrap();

    admin.set_recipients(&p("/a"), recipients(&[2])).unwrap();
    admin
        .commit_with(&DecryptThenEncrypt::new(FakeCrypto::new()))
        .await
        .unwrap();

    // against the old snapshot /a/b inherits {1}, so nothing looks stale
    clearer.set_recipients(&p("/a/b"), Recipients::new()).unwrap();
    assert!(clearer.pending_reencryption().is_empty());
    assert!(matches!(
        clearer.commit().await,
        Err(StoreError::Conflict(_))
    ));

    let tx = store.begin().unwrap();
    assert_eq!(
        tx.explicit_recipients(&p("/a/b")).unwrap(),
        recipients(&[1])
    );
    assert_eq!(
        common::recipients_of(&store, "/a/b/s.gpg").unwrap(),
        recipients(&[1])
    );
}

#[tokio::test]
async fn test_own_policy_ignores_rekey_above_it() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/a/x.gpg"]).await;

    let mut admin = store.begin().unwrap();
    let mut scoper = store.begin().unwrap();

    admin.set_recipients(&p("/a"), recipients(&[2])).unwrap();
    admin
        .commit_with(&DecryptThenEncrypt::new(FakeCrypto::new()))
        .await
        .unwrap();

    // an explicit set does not depend on what the ancestors carry
    scoper.set_recipients(&p("/a/own"), recipients(&[3])).unwrap();
    scoper.commit().await.unwrap();

    assert_eq!(
        common::recipients_of(&store, "/a/own").unwrap(),
        recipients(&[3])
    );
}

#[tokio::test]
async fn test_delete_conflicts_with_concurrent_put() {
    let store = setup_store(&[1]).await;
    common::seed(&store, &[1], &["/d/a.gpg"]).await;

    let mut remover = store.begin().unwrap();
    remover.delete(&p("/d/a.gpg")).unwrap();
    remover.delete(&p("/d")).unwrap();

    let mut writer = store.begin().unwrap();
    writer.put(&p("/d/b.gpg"), seal(&[1], b"b")).unwrap();
    writer.commit().await.unwrap();

    assert!(matches!(
        remover.commit().await,
        Err(StoreError::Conflict(_))
    ));
    assert!(read(&store, "/d/a.gpg").is_ok());
}
