mod backend;
mod error;
mod memory;
mod secret_store;
mod transaction;

pub use backend::{Change, CommitRecord, PersistedState, StoreBackend};
pub use error::StoreError;
pub use memory::{MemoryBackend, MemoryBackendError};
pub use secret_store::{SecretStore, StoreConfig, DEFAULT_LOCK_TIMEOUT};
pub use transaction::Transaction;
