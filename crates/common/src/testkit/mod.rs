/// Helpers for exercising the store without real OpenPGP keys
///
/// [`ContainerBuilder`] frames bytes the way an OpenPGP message is
/// framed, so the packet scanner sees real headers, and
/// [`FakeCrypto`] "encrypts" by framing plaintext for a recipient set.
///
/// # Example
///
/// ```rust,ignore
/// use common::prelude::*;
/// use common::testkit::{ContainerBuilder, FakeCrypto};
///
/// let root: Recipients = vec![Recipient::from_u64(1)].into();
/// let store = SecretStore::open(MemoryBackend::new(), StoreConfig::new(root.clone())).await?;
///
/// let mut tx = store.begin()?;
/// tx.put(&"/web/github.gpg".into(), ContainerBuilder::seal(&root, b"hunter2"))?;
/// tx.commit().await?;
/// ```
mod container;
mod crypto;

pub use container::ContainerBuilder;
pub use crypto::FakeCrypto;
