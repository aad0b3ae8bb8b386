use std::fmt::{Debug, Display};

use async_trait::async_trait;
use bytes::Bytes;

use crate::recipient::Recipients;
use crate::tree::{NodeKind, SecretPath, SecretTree, TreeError};

/// One persisted fact about a path, as of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The path is a directory with this explicit policy (possibly empty)
    Dir {
        path: SecretPath,
        recipients: Recipients,
    },
    /// The path is a secret holding this ciphertext
    Secret { path: SecretPath, ciphertext: Bytes },
    /// Nothing exists at the path any more
    Removed { path: SecretPath },
}

impl Change {
    pub fn path(&self) -> &SecretPath {
        match self {
            Change::Dir { path, .. } | Change::Secret { path, .. } | Change::Removed { path } => {
                path
            }
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Change::Removed { .. })
    }

    /// Describe the current state of `path` in `tree`
    pub(crate) fn capture(tree: &SecretTree, path: &SecretPath) -> Self {
        match tree.kind(path) {
            Some(NodeKind::Directory) => Change::Dir {
                path: path.clone(),
                recipients: tree
                    .explicit_recipients(path)
                    .cloned()
                    .unwrap_or_default(),
            },
            Some(NodeKind::Secret) => Change::Secret {
                path: path.clone(),
                ciphertext: tree.get(path).cloned().unwrap_or_default(),
            },
            None => Change::Removed { path: path.clone() },
        }
    }

    /// Replay this change onto a tree
    pub(crate) fn apply(&self, tree: &mut SecretTree) -> Result<(), TreeError> {
        match self {
            Change::Dir { path, recipients } => {
                tree.set_recipients(path, recipients.clone())?;
            }
            Change::Secret { path, ciphertext } => {
                tree.insert_secret(path, ciphertext.clone())?;
            }
            Change::Removed { path } => match tree.remove(path) {
                Ok(_) | Err(TreeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            },
        }
        Ok(())
    }
}

/// Everything written by one successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub version: u64,
    /// `None` only for the genesis commit
    pub previous: Option<u64>,
    pub author: Option<String>,
    pub message: Option<String>,
    /// Removals deepest first, then everything else parents first,
    ///  so the list can be replayed in order
    pub changes: Vec<Change>,
}

/// The latest committed state of a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub version: u64,
    /// One `Dir` or `Secret` change per live path, parents first
    pub entries: Vec<Change>,
}

impl PersistedState {
    /// Rebuild the tree the entries describe
    pub fn into_tree(self) -> Result<SecretTree, TreeError> {
        let mut tree = SecretTree::new(Recipients::new());
        for entry in self.entries.iter() {
            entry.apply(&mut tree)?;
        }
        Ok(tree)
    }
}

/// Durable storage for committed versions of the tree.
///
/// Implementations only ever see fully validated commits, in version
///  order, from a single writer at a time.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug + 'static {
    type Error: Display + Debug;

    /// Load the latest committed state, `None` if nothing was ever committed
    async fn load(&self) -> Result<Option<PersistedState>, Self::Error>;

    /// Durably record one commit. Must be atomic: after an error,
    ///  nothing of `record` may be visible to a later `load`.
    async fn append(&self, record: &CommitRecord) -> Result<(), Self::Error>;
}
