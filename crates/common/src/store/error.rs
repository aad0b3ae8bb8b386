use crate::container::ContainerError;
use crate::recipient::Recipients;
use crate::tree::{SecretPath, TreeError};

/// Everything a store or transaction operation can fail with.
///
/// Structural errors (`NotFound` through `NotEmpty`, plus the two
///  argument errors) are ordinary outcomes to report to a user.
///  `MalformedContainer`, `RecipientMismatch` and `ReencryptionFailed`
///  poison the transaction they occur in. `Conflict` means the whole
///  transaction should be retried from a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(SecretPath),
    #[error("not a directory: {0}")]
    NotADirectory(SecretPath),
    #[error("is a directory: {0}")]
    IsADirectory(SecretPath),
    #[error("directory not empty: {0}")]
    NotEmpty(SecretPath),
    #[error("invalid path {0}: {1}")]
    InvalidPath(SecretPath, &'static str),
    #[error("invalid recipients for {0}: a policy may not be empty here")]
    InvalidRecipients(SecretPath),
    #[error("malformed container at {path}: {source}")]
    MalformedContainer {
        path: SecretPath,
        #[source]
        source: ContainerError,
    },
    #[error("recipient mismatch at {path}: expected {expected}, ciphertext names {actual}")]
    RecipientMismatch {
        path: SecretPath,
        expected: Recipients,
        actual: Recipients,
    },
    #[error("conflicting concurrent write to {0}")]
    Conflict(SecretPath),
    #[error("re-encryption failed for {path}: {reason}")]
    ReencryptionFailed { path: SecretPath, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-running the transaction from a fresh snapshot may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Faults that must be logged in full and shown to users only as
    ///  an opaque failure
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::ReencryptionFailed { .. } | StoreError::Unavailable(_)
        )
    }

    /// Errors that leave the enclosing transaction unusable
    pub(crate) fn poisons(&self) -> bool {
        matches!(
            self,
            StoreError::MalformedContainer { .. }
                | StoreError::RecipientMismatch { .. }
                | StoreError::ReencryptionFailed { .. }
        )
    }
}

impl From<TreeError> for StoreError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(path) => StoreError::NotFound(path),
            TreeError::NotADirectory(path) => StoreError::NotADirectory(path),
            TreeError::IsADirectory(path) => StoreError::IsADirectory(path),
            TreeError::NotEmpty(path) => StoreError::NotEmpty(path),
            TreeError::InvalidPath(path, reason) => StoreError::InvalidPath(path, reason),
            TreeError::InvalidRecipients(path) => StoreError::InvalidRecipients(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let path = SecretPath::new("/a");
        assert!(StoreError::Conflict(path.clone()).is_retryable());
        assert!(!StoreError::NotFound(path.clone()).is_retryable());
        assert!(StoreError::Unavailable("db".into()).is_internal());
        assert!(StoreError::ReencryptionFailed {
            path: path.clone(),
            reason: "boom".into()
        }
        .is_internal());
        assert!(!StoreError::NotEmpty(path.clone()).poisons());
        assert!(StoreError::MalformedContainer {
            path,
            source: ContainerError::InvalidHeader(0)
        }
        .poisons());
    }
}
