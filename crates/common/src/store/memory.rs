use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::backend::{Change, CommitRecord, PersistedState, StoreBackend};
use crate::tree::SecretPath;

/// In-memory store backend, for tests and ephemeral daemons
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryBackendInner>>,
}

#[derive(Debug, Default)]
struct MemoryBackendInner {
    /// Latest version that was appended
    version: Option<u64>,
    /// Live entries by path; parents sort before children
    entries: BTreeMap<SecretPath, Change>,
    /// Every commit ever appended, oldest first
    log: Vec<CommitRecord>,
    /// When set, every call fails as if the storage had gone away
    unavailable: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryBackendError {
    #[error("memory backend error: {0}")]
    Internal(String),
    #[error("memory backend is unavailable")]
    Unavailable,
    #[error("commit {version} does not follow {head:?}")]
    OutOfOrder { version: u64, head: Option<u64> },
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail, or recover from that
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.unavailable = unavailable;
        }
    }

    /// All commits appended so far, oldest first
    pub fn log(&self) -> Vec<CommitRecord> {
        self.inner
            .read()
            .map(|inner| inner.log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    type Error = MemoryBackendError;

    async fn load(&self) -> Result<Option<PersistedState>, Self::Error> {
        let inner = self.inner.read().map_err(|e| {
            MemoryBackendError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        if inner.unavailable {
            return Err(MemoryBackendError::Unavailable);
        }

        Ok(inner.version.map(|version| PersistedState {
            version,
            entries: inner.entries.values().cloned().collect(),
        }))
    }

    async fn append(&self, record: &CommitRecord) -> Result<(), Self::Error> {
        let mut inner = self.inner.write().map_err(|e| {
            MemoryBackendError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        if inner.unavailable {
            return Err(MemoryBackendError::Unavailable);
        }
        if record.previous != inner.version {
            return Err(MemoryBackendError::OutOfOrder {
                version: record.version,
                head: inner.version,
            });
        }

        for change in record.changes.iter() {
            match change {
                Change::Removed { path } => {
                    inner.entries.remove(path);
                }
                _ => {
                    inner.entries.insert(change.path().clone(), change.clone());
                }
            }
        }
        inner.version = Some(record.version);
        inner.log.push(record.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{Recipient, Recipients};
    use bytes::Bytes;

    fn root_change() -> Change {
        Change::Dir {
            path: SecretPath::root(),
            recipients: Recipients::from(vec![Recipient::from_u64(1)]),
        }
    }

    #[tokio::test]
    async fn test_empty_backend_loads_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let backend = MemoryBackend::new();
        backend
            .append(&CommitRecord {
                version: 0,
                previous: None,
                author: None,
                message: None,
                changes: vec![root_change()],
            })
            .await
            .unwrap();
        backend
            .append(&CommitRecord {
                version: 1,
                previous: Some(0),
                author: Some("alice".into()),
                message: None,
                changes: vec![
                    Change::Dir {
                        path: SecretPath::new("/a"),
                        recipients: Recipients::new(),
                    },
                    Change::Secret {
                        path: SecretPath::new("/a/x.gpg"),
                        ciphertext: Bytes::from_static(b"x"),
                    },
                ],
            })
            .await
            .unwrap();

        let state = backend.load().await.unwrap().unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries[0], root_change());
        assert_eq!(backend.log().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_append_rejected() {
        let backend = MemoryBackend::new();
        let result = backend
            .append(&CommitRecord {
                version: 3,
                previous: Some(2),
                author: None,
                message: None,
                changes: vec![],
            })
            .await;
        assert!(matches!(result, Err(MemoryBackendError::OutOfOrder { .. })));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        assert_eq!(
            backend.load().await,
            Err(MemoryBackendError::Unavailable)
        );
    }
}
