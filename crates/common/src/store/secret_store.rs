use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{Mutex, MutexGuard};

use super::backend::{Change, CommitRecord, StoreBackend};
use super::error::StoreError;
use super::transaction::Transaction;
use crate::recipient::Recipients;
use crate::tree::{SecretPath, SecretTree};

/// How long `begin` and `commit` wait on the store's locks by default
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Policy of the root directory, used only when the backend is empty
    pub root_recipients: Recipients,
    /// Upper bound on waiting for the snapshot or commit lock
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub fn new(root_recipients: Recipients) -> Self {
        Self {
            root_recipients,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// The current committed version of the tree
#[derive(Debug)]
pub(crate) struct Head {
    pub(crate) version: u64,
    pub(crate) tree: SecretTree,
    /// Version of the last commit that changed each path. Only
    ///  changes newer than the oldest open snapshot are kept.
    pub(crate) modified: HashMap<SecretPath, u64>,
}

impl Head {
    /// The first path in `paths` changed after `since`
    pub(crate) fn changed_since<'a>(
        &self,
        since: u64,
        mut paths: impl Iterator<Item = &'a SecretPath>,
    ) -> Option<&'a SecretPath> {
        paths.find(|path| self.modified.get(*path).is_some_and(|v| *v > since))
    }

    /// Any path at or beneath `prefix` changed after `since`
    pub(crate) fn subtree_changed_since(
        &self,
        since: u64,
        prefix: &SecretPath,
    ) -> Option<SecretPath> {
        self.modified
            .iter()
            .find(|(path, version)| **version > since && path.starts_with(prefix))
            .map(|(path, _)| path.clone())
    }

    /// Forget changes no open transaction can conflict with
    pub(crate) fn prune(&mut self, oldest_snapshot: Option<u64>) {
        match oldest_snapshot {
            Some(oldest) => self.modified.retain(|_, version| *version > oldest),
            None => self.modified.clear(),
        }
    }
}

#[derive(Debug)]
struct StoreInner<B> {
    backend: B,
    config: StoreConfig,
    head: RwLock<Head>,
    /// Serializes validation + persistence of commits
    commit_lock: Mutex<()>,
    /// Open transactions per snapshot version
    snapshots: SyncMutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
}

/// A versioned secret tree with snapshot-isolated transactions.
///
/// Readers never block each other or writers for longer than it
///  takes to clone the head pointer. Writers are validated
///  optimistically at commit time; the first to commit wins.
#[derive(Debug)]
pub struct SecretStore<B: StoreBackend> {
    inner: Arc<StoreInner<B>>,
}

impl<B: StoreBackend> Clone for SecretStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: StoreBackend> SecretStore<B> {
    /// Open a store over `backend`, creating the root directory if the
    ///  backend has never been written to.
    pub async fn open(backend: B, config: StoreConfig) -> Result<Self, StoreError> {
        let loaded = backend
            .load()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to load store: {}", e)))?;

        let (version, tree) = match loaded {
            Some(state) => {
                let version = state.version;
                let tree = state.into_tree().map_err(|e| {
                    StoreError::Unavailable(format!("persisted state is inconsistent: {}", e))
                })?;
                if !tree.root().has_policy() {
                    return Err(StoreError::InvalidRecipients(SecretPath::root()));
                }
                if !tree.root().explicit_recipients().set_eq(&config.root_recipients) {
                    tracing::debug!(
                        persisted = %tree.root().explicit_recipients(),
                        configured = %config.root_recipients,
                        "persisted root policy differs from configuration, keeping persisted"
                    );
                }
                tracing::info!(version, "opened secret store");
                (version, tree)
            }
            None => {
                if config.root_recipients.is_empty() {
                    return Err(StoreError::InvalidRecipients(SecretPath::root()));
                }
                let genesis = CommitRecord {
                    version: 0,
                    previous: None,
                    author: None,
                    message: Some("genesis".to_string()),
                    changes: vec![Change::Dir {
                        path: SecretPath::root(),
                        recipients: config.root_recipients.clone(),
                    }],
                };
                backend.append(&genesis).await.map_err(|e| {
                    StoreError::Unavailable(format!("failed to write genesis: {}", e))
                })?;
                tracing::info!(root = %config.root_recipients, "initialized new secret store");
                (0, SecretTree::new(config.root_recipients.clone()))
            }
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                config,
                head: RwLock::new(Head {
                    version,
                    tree,
                    modified: HashMap::new(),
                }),
                commit_lock: Mutex::new(()),
                snapshots: SyncMutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Start a transaction on a snapshot of the current head
    pub fn begin(&self) -> Result<Transaction<B>, StoreError> {
        self.begin_with_author(None)
    }

    /// Like [`SecretStore::begin`], recording `author` on the commit
    pub fn begin_as(&self, author: impl Into<String>) -> Result<Transaction<B>, StoreError> {
        self.begin_with_author(Some(author.into()))
    }

    fn begin_with_author(&self, author: Option<String>) -> Result<Transaction<B>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        let (version, tree) = {
            let head = self
                .inner
                .head
                .try_read_for(self.inner.config.lock_timeout)
                .ok_or_else(|| {
                    StoreError::Unavailable("timed out waiting for the store lock".to_string())
                })?;
            // registered under the head lock so no commit prunes in between
            *self.inner.snapshots.lock().entry(head.version).or_insert(0) += 1;
            (head.version, head.tree.clone())
        };

        tracing::debug!(version, author = ?author, "transaction started");
        Ok(Transaction::new(self.clone(), version, tree, author))
    }

    /// Version of the latest commit
    pub fn version(&self) -> u64 {
        self.inner.head.read().version
    }

    /// Stop accepting new transactions. Open transactions may still
    ///  read, but their commits will fail.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(version = self.version(), "secret store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub(crate) async fn lock_commits(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        tokio::time::timeout(self.inner.config.lock_timeout, self.inner.commit_lock.lock())
            .await
            .map_err(|_| StoreError::Unavailable("timed out waiting for the commit lock".to_string()))
    }

    pub(crate) fn head(&self) -> &RwLock<Head> {
        &self.inner.head
    }

    pub(crate) fn oldest_snapshot(&self) -> Option<u64> {
        self.inner.snapshots.lock().keys().next().copied()
    }

    pub(crate) fn release_snapshot(&self, version: u64) {
        let mut snapshots = self.inner.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&version);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::Recipient;
    use crate::store::MemoryBackend;
    use crate::testkit::ContainerBuilder;

    fn root() -> Recipients {
        vec![Recipient::from_u64(1)].into()
    }

    fn sealed(plaintext: &[u8]) -> Vec<u8> {
        ContainerBuilder::seal(&root(), plaintext)
    }

    async fn open() -> SecretStore<MemoryBackend> {
        SecretStore::open(MemoryBackend::new(), StoreConfig::new(root()))
            .await
            .unwrap()
    }

    async fn write(store: &SecretStore<MemoryBackend>, path: &str) -> Result<u64, StoreError> {
        let mut tx = store.begin().unwrap();
        tx.put(&SecretPath::new(path), sealed(path.as_bytes())).unwrap();
        tx.commit().await
    }

    #[tokio::test]
    async fn test_modified_is_pruned_past_open_snapshots() {
        let store = open().await;
        write(&store, "/a.gpg").await.unwrap();
        write(&store, "/b.gpg").await.unwrap();

        let mut reader = store.begin().unwrap();
        assert_eq!(store.oldest_snapshot(), Some(2));
        write(&store, "/c.gpg").await.unwrap();

        {
            let head = store.head().read();
            assert!(!head.modified.contains_key(&SecretPath::new("/a.gpg")));
            assert!(!head.modified.contains_key(&SecretPath::new("/b.gpg")));
            assert_eq!(head.modified.get(&SecretPath::new("/c.gpg")), Some(&3));
        }

        // changes newer than the open snapshot still conflict
        reader
            .put(&SecretPath::new("/c.gpg"), sealed(b"late"))
            .unwrap();
        assert!(matches!(reader.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.oldest_snapshot(), None);

        // a commit only keeps what is newer than its own snapshot
        write(&store, "/d.gpg").await.unwrap();
        let head = store.head().read();
        assert_eq!(head.modified.len(), 1);
        assert_eq!(head.modified.get(&SecretPath::new("/d.gpg")), Some(&4));
    }

    #[tokio::test]
    async fn test_dropped_transactions_release_snapshots() {
        let store = open().await;
        let first = store.begin().unwrap();
        let second = store.begin().unwrap();
        assert_eq!(store.oldest_snapshot(), Some(0));

        drop(first);
        assert_eq!(store.oldest_snapshot(), Some(0));
        second.abort();
        assert_eq!(store.oldest_snapshot(), None);
    }
}
