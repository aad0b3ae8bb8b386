use std::collections::BTreeSet;

use bytes::Bytes;

use super::backend::{Change, CommitRecord, StoreBackend};
use super::error::StoreError;
use super::secret_store::{Head, SecretStore};
use crate::container::extract_recipients;
use crate::recipient::Recipients;
use crate::reencrypt::Reencryptor;
use crate::tree::{Entry, NodeKind, NodeRef, SecretPath, SecretTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    Aborted,
}

/// A unit of reads and writes over one snapshot of a [`SecretStore`].
///
/// Reads see the snapshot plus this transaction's own writes, never
///  anything committed by others after `begin`. Writes are only
///  visible to others once [`Transaction::commit`] succeeds; dropping
///  the transaction discards them.
///
/// # Invariants
///
/// Every secret written through a transaction names exactly the
///  effective recipients of its parent directory. `put` rejects
///  ciphertext that does not, and `set_recipients` queues every
///  secret it invalidates for re-encryption; `commit` refuses to
///  run while that queue is non-empty.
#[derive(Debug)]
pub struct Transaction<B: StoreBackend> {
    store: SecretStore<B>,
    base: u64,
    tree: SecretTree,
    author: Option<String>,
    message: Option<String>,
    /// Paths whose final state must be persisted
    writes: BTreeSet<SecretPath>,
    /// Directories whose policy a write was validated against
    depends_on: BTreeSet<SecretPath>,
    /// Directories whose whole subtree must be untouched by others
    subtrees: BTreeSet<SecretPath>,
    /// Secrets whose ciphertext no longer matches their policy
    pending: BTreeSet<SecretPath>,
    failed: Option<StoreError>,
    state: TxState,
}

impl<B: StoreBackend> Transaction<B> {
    pub(crate) fn new(
        store: SecretStore<B>,
        base: u64,
        tree: SecretTree,
        author: Option<String>,
    ) -> Self {
        Self {
            store,
            base,
            tree,
            author,
            message: None,
            writes: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            subtrees: BTreeSet::new(),
            pending: BTreeSet::new(),
            failed: None,
            state: TxState::Open,
        }
    }

    /// Version of the snapshot this transaction reads from
    pub fn version(&self) -> u64 {
        self.base
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Attach a message to the commit
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Secrets still waiting for re-encryption, in path order
    pub fn pending_reencryption(&self) -> Vec<SecretPath> {
        self.pending.iter().cloned().collect()
    }

    // Reads

    /// What lives at `path`, if anything
    pub fn kind(&self, path: &SecretPath) -> Result<Option<NodeKind>, StoreError> {
        self.check()?;
        Ok(self.tree.kind(path))
    }

    pub fn exists(&self, path: &SecretPath) -> Result<bool, StoreError> {
        Ok(self.kind(path)?.is_some())
    }

    pub fn get(&self, path: &SecretPath) -> Result<Bytes, StoreError> {
        self.check()?;
        Ok(self.tree.get(path)?.clone())
    }

    pub fn list(&self, path: &SecretPath) -> Result<Vec<Entry>, StoreError> {
        self.check()?;
        Ok(self.tree.list(path)?)
    }

    /// Who can decrypt `path`. For a secret this is read from its
    ///  ciphertext; for a directory it is the effective policy.
    pub fn recipients(&mut self, path: &SecretPath) -> Result<Recipients, StoreError> {
        self.check()?;
        let result = match self.tree.resolve(path) {
            Err(e) => Err(e.into()),
            Ok(NodeRef::Secret(secret)) => {
                extract_recipients(secret.ciphertext()).map_err(|source| {
                    StoreError::MalformedContainer {
                        path: path.clone(),
                        source,
                    }
                })
            }
            Ok(NodeRef::Dir(_)) => self
                .tree
                .policy(path)
                .map(|(_, recipients)| recipients.clone())
                .map_err(StoreError::from),
        };
        self.track(result)
    }

    /// The explicit policy set on a directory, empty if it inherits
    pub fn explicit_recipients(&self, dir: &SecretPath) -> Result<Recipients, StoreError> {
        self.check()?;
        Ok(self.tree.explicit_recipients(dir)?.clone())
    }

    /// Secrets whose policy is decided by `dir`
    pub fn governed_secrets(&self, dir: &SecretPath) -> Result<Vec<SecretPath>, StoreError> {
        self.check()?;
        Ok(self.tree.secrets_governed_by(dir)?)
    }

    // Writes

    /// Create or replace a secret. The ciphertext must already be
    ///  encrypted to exactly the effective recipients of `path`'s
    ///  parent; missing parent directories are created.
    pub fn put(
        &mut self,
        path: &SecretPath,
        ciphertext: impl Into<Bytes>,
    ) -> Result<(), StoreError> {
        self.check()?;
        let result = self.put_inner(path, ciphertext.into());
        self.track(result)
    }

    fn put_inner(&mut self, path: &SecretPath, ciphertext: Bytes) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.clone(), "cannot write to the root"))?;
        if self.tree.kind(path) == Some(NodeKind::Directory) {
            return Err(StoreError::IsADirectory(path.clone()));
        }
        let expected = self.tree.policy(&parent)?.1.clone();

        let actual =
            extract_recipients(&ciphertext).map_err(|source| StoreError::MalformedContainer {
                path: path.clone(),
                source,
            })?;
        if !actual.set_eq(&expected) {
            return Err(StoreError::RecipientMismatch {
                path: path.clone(),
                expected,
                actual,
            });
        }

        let created = self.tree.insert_secret(path, ciphertext)?;
        self.writes.extend(created);
        self.writes.insert(path.clone());
        self.depends_on.extend(path.ancestors());
        self.pending.remove(path);

        tracing::debug!(path = %path, version = self.base, "staged secret");
        Ok(())
    }

    /// Set the explicit policy of a directory, creating it if needed.
    ///  An empty set makes the directory inherit again.
    ///
    /// Every secret governed by the directory whose ciphertext does
    ///  not match the new effective set is queued for re-encryption.
    pub fn set_recipients(
        &mut self,
        dir: &SecretPath,
        recipients: Recipients,
    ) -> Result<(), StoreError> {
        self.check()?;

        let created = self.tree.set_recipients(dir, recipients)?;
        self.writes.extend(created);
        self.writes.insert(dir.clone());
        self.subtrees.insert(dir.clone());

        let (source, effective) = self.tree.policy(dir)?;
        let effective = effective.clone();
        // an inherited set is only as current as every directory it passes through
        self.depends_on
            .extend(dir.ancestors().into_iter().filter(|a| a.starts_with(&source)));

        let governed = self.tree.secrets_governed_by(dir)?;
        let mut queued = 0;
        for secret in governed {
            let stale = match extract_recipients(self.tree.get(&secret)?) {
                Ok(actual) => !actual.set_eq(&effective),
                // rewriting a broken container is as good a fix as any
                Err(_) => true,
            };
            if stale {
                self.pending.insert(secret);
                queued += 1;
            } else {
                self.pending.remove(&secret);
            }
        }

        tracing::debug!(
            dir = %dir,
            recipients = %effective,
            queued,
            "staged recipient change"
        );
        Ok(())
    }

    /// Remove a secret or an empty directory
    pub fn delete(&mut self, path: &SecretPath) -> Result<(), StoreError> {
        self.check()?;

        let kind = self.tree.remove(path)?;
        self.writes.insert(path.clone());
        if kind == NodeKind::Directory {
            self.subtrees.insert(path.clone());
        }
        self.pending.remove(path);

        tracing::debug!(path = %path, version = self.base, "staged removal");
        Ok(())
    }

    /// Re-encrypt every queued secret to its new policy.
    ///
    /// Each result is checked against the policy before anything is
    ///  staged. If any secret fails, nothing is staged and the
    ///  transaction fails with [`StoreError::ReencryptionFailed`].
    ///  Returns how many secrets were rewritten.
    pub async fn reencrypt<R>(&mut self, reencryptor: &R) -> Result<usize, StoreError>
    where
        R: Reencryptor + ?Sized,
    {
        self.check()?;
        if self.pending.is_empty() {
            return Ok(0);
        }

        let queued: Vec<SecretPath> = self.pending.iter().cloned().collect();
        tracing::info!(
            count = queued.len(),
            version = self.base,
            "re-encrypting secrets"
        );

        let mut staged = Vec::with_capacity(queued.len());
        for path in queued {
            match self.reencrypt_one(reencryptor, &path).await {
                Ok(ciphertext) => staged.push((path, ciphertext)),
                Err(reason) => {
                    let err = StoreError::ReencryptionFailed { path, reason };
                    return Err(self.fail(err));
                }
            }
        }

        let count = staged.len();
        for (path, ciphertext) in staged {
            self.tree.insert_secret(&path, ciphertext)?;
            self.depends_on.extend(path.ancestors());
            self.writes.insert(path);
        }
        self.pending.clear();

        Ok(count)
    }

    async fn reencrypt_one<R>(&self, reencryptor: &R, path: &SecretPath) -> Result<Bytes, String>
    where
        R: Reencryptor + ?Sized,
    {
        let current = self.tree.get(path).map_err(|e| e.to_string())?.clone();
        let parent = path.parent().unwrap_or_default();
        let target = self
            .tree
            .policy(&parent)
            .map_err(|e| e.to_string())?
            .1
            .clone();

        let next = reencryptor
            .reencrypt(path, &current, &target)
            .await
            .map_err(|e| e.to_string())?;

        let actual = extract_recipients(&next)
            .map_err(|e| format!("re-encrypted container is malformed: {}", e))?;
        if !actual.set_eq(&target) {
            return Err(format!(
                "re-encrypted container names {} instead of {}",
                actual, target
            ));
        }

        tracing::debug!(path = %path, recipients = %target, "re-encrypted secret");
        Ok(next)
    }

    // Lifecycle

    /// Atomically apply every staged write.
    ///
    /// Returns the new version, or the snapshot version if nothing was
    ///  written. Fails with [`StoreError::Conflict`] if another commit
    ///  since `begin` touched a path this transaction wrote or relied
    ///  on, in which case nothing is applied.
    pub async fn commit(mut self) -> Result<u64, StoreError> {
        let result = self.try_commit().await;
        self.state = match result {
            Ok(_) => TxState::Committed,
            Err(_) => TxState::Aborted,
        };
        result
    }

    /// Re-encrypt anything queued, then commit
    pub async fn commit_with<R>(mut self, reencryptor: &R) -> Result<u64, StoreError>
    where
        R: Reencryptor + ?Sized,
    {
        if let Err(err) = self.reencrypt(reencryptor).await {
            self.state = TxState::Aborted;
            return Err(err);
        }
        self.commit().await
    }

    /// Discard every staged write
    pub fn abort(mut self) {
        self.state = TxState::Aborted;
        tracing::debug!(
            version = self.base,
            writes = self.writes.len(),
            "transaction aborted"
        );
    }

    async fn try_commit(&mut self) -> Result<u64, StoreError> {
        self.check()?;
        if let Some(path) = self.pending.iter().next() {
            return Err(StoreError::ReencryptionFailed {
                path: path.clone(),
                reason: format!(
                    "{} secret(s) were never re-encrypted to their new recipients",
                    self.pending.len()
                ),
            });
        }
        if self.writes.is_empty() {
            return Ok(self.base);
        }

        let store = self.store.clone();
        let _guard = store.lock_commits().await?;

        let (previous, mut next) = {
            let head = store.head().read();
            self.validate(&head)?;
            (head.version, head.tree.clone())
        };

        let changes = self.changes();
        for change in changes.iter() {
            change
                .apply(&mut next)
                .map_err(|_| StoreError::Conflict(change.path().clone()))?;
        }

        let version = previous + 1;
        let record = CommitRecord {
            version,
            previous: Some(previous),
            author: self.author.clone(),
            message: self.message.clone(),
            changes,
        };
        store.backend().append(&record).await.map_err(|e| {
            tracing::error!(version, error = %e, "failed to persist commit");
            StoreError::Unavailable(format!("failed to persist commit {}: {}", version, e))
        })?;

        {
            let mut head = store.head().write();
            head.version = version;
            head.tree = next;
            for change in record.changes.iter() {
                head.modified.insert(change.path().clone(), version);
            }
            head.prune(store.oldest_snapshot());
        }

        tracing::debug!(
            version,
            base = self.base,
            changes = record.changes.len(),
            author = ?self.author,
            "transaction committed"
        );
        Ok(version)
    }

    fn validate(&self, head: &Head) -> Result<(), StoreError> {
        let touched = self.writes.iter().chain(self.depends_on.iter());
        if let Some(path) = head.changed_since(self.base, touched) {
            tracing::warn!(path = %path, base = self.base, head = head.version, "commit conflict");
            return Err(StoreError::Conflict(path.clone()));
        }
        for prefix in self.subtrees.iter() {
            if let Some(path) = head.subtree_changed_since(self.base, prefix) {
                tracing::warn!(
                    path = %path,
                    dir = %prefix,
                    base = self.base,
                    head = head.version,
                    "commit conflict beneath directory"
                );
                return Err(StoreError::Conflict(path));
            }
        }
        Ok(())
    }

    /// Removals deepest first, then everything else parents first
    fn changes(&self) -> Vec<Change> {
        let (mut removals, upserts): (Vec<Change>, Vec<Change>) = self
            .writes
            .iter()
            .map(|path| Change::capture(&self.tree, path))
            .partition(Change::is_removal);
        removals.reverse();
        removals.extend(upserts);
        removals
    }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failed {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        result.map_err(|err| self.fail(err))
    }

    fn fail(&mut self, err: StoreError) -> StoreError {
        if err.poisons() && self.failed.is_none() {
            tracing::warn!(version = self.base, error = %err, "transaction failed");
            self.failed = Some(err.clone());
        }
        err
    }
}

impl<B: StoreBackend> Drop for Transaction<B> {
    fn drop(&mut self) {
        self.store.release_snapshot(self.base);
        if self.state == TxState::Open {
            tracing::debug!(
                version = self.base,
                writes = self.writes.len(),
                "transaction dropped without commit, discarding"
            );
        }
    }
}
