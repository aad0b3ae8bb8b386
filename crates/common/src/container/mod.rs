mod scanner;

pub use scanner::{extract_recipients, ContainerError};

/// File suffix marking a tree entry as an encrypted container
pub const DEFAULT_CONTAINER_SUFFIX: &str = ".gpg";

/// Packet tag of a Public-Key Encrypted Session Key packet,
///  the only record kind that names a recipient
pub const PKESK_TAG: u8 = 1;
