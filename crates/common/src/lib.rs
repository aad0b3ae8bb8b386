/**
 * OpenPGP container handling.
 *  - Scans the session key packets at the head
 *    of a message for the recipients it names
 */
pub mod container;
/**
 * Recipient identifiers (OpenPGP key ids)
 *  and ordered recipient sets.
 */
pub mod recipient;
/**
 * Re-encryption of secrets after a policy change.
 *  Cryptography is always supplied by the caller;
 *  this crate never sees private keys.
 */
pub mod reencrypt;
/**
 * Versioned storage for the secret tree.
 *  Snapshot-isolated transactions with optimistic
 *  commit validation over a pluggable backend.
 */
pub mod store;
/**
 * Fake containers and crypto for tests.
 */
pub mod testkit;
/**
 * The copy-on-write tree of directories and secrets,
 *  with per-directory recipient policy.
 */
pub mod tree;

pub mod prelude {
    pub use crate::container::{extract_recipients, ContainerError, DEFAULT_CONTAINER_SUFFIX};
    pub use crate::recipient::{Recipient, RecipientError, Recipients};
    pub use crate::reencrypt::{
        CryptoError, CryptoProvider, DecryptThenEncrypt, Reencryptor, SuppliedCiphertexts,
    };
    pub use crate::store::{
        Change, CommitRecord, MemoryBackend, PersistedState, SecretStore, StoreBackend,
        StoreConfig, StoreError, Transaction,
    };
    pub use crate::tree::{Entry, NodeKind, SecretPath, SecretTree};
}
