use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Width of a key id in bytes
pub const KEY_ID_SIZE: usize = 8;
/// Width of a v4 fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipientError {
    #[error("invalid recipient id '{0}': expected 16 hex digits or a 40 digit fingerprint")]
    InvalidLength(String),
    #[error("invalid recipient id '{0}': not hex")]
    InvalidHex(String),
}

/// A 64-bit OpenPGP key id naming one public key
///  that is entitled to decrypt a container.
///
/// Displayed as 16 uppercase hex digits. Comparison is
///  on the raw bytes, so parsing is case-insensitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Recipient([u8; KEY_ID_SIZE]);

impl Recipient {
    pub fn from_bytes(bytes: [u8; KEY_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recipient({})", self)
    }
}

impl FromStr for Recipient {
    type Err = RecipientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = match digits.len() {
            n if n == KEY_ID_SIZE * 2 || n == FINGERPRINT_SIZE * 2 => {
                hex::decode(digits).map_err(|_| RecipientError::InvalidHex(s.to_string()))?
            }
            _ => return Err(RecipientError::InvalidLength(s.to_string())),
        };

        // a v4 key id is the low 64 bits of its fingerprint
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&bytes[bytes.len() - KEY_ID_SIZE..]);
        Ok(Self(id))
    }
}

impl Serialize for Recipient {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Recipient {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ordered, duplicate free set of recipients.
///
/// Insertion order is kept so listings are stable, but
///  comparisons between two sets should go through
///  [`Recipients::set_eq`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Recipient>", into = "Vec<Recipient>")]
pub struct Recipients(Vec<Recipient>);

impl Recipients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recipient, returning false if it was already present
    pub fn insert(&mut self, recipient: Recipient) -> bool {
        if self.0.contains(&recipient) {
            return false;
        }
        self.0.push(recipient);
        true
    }

    pub fn contains(&self, recipient: &Recipient) -> bool {
        self.0.contains(recipient)
    }

    pub fn contains_any<'a>(&self, others: impl IntoIterator<Item = &'a Recipient>) -> bool {
        others.into_iter().any(|r| self.contains(r))
    }

    /// Membership comparison, ignoring order
    pub fn set_eq(&self, other: &Recipients) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|r| other.contains(r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipient> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Recipient] {
        &self.0
    }

    /// Parse a list of key id strings into a set
    pub fn parse<S: AsRef<str>>(
        ids: impl IntoIterator<Item = S>,
    ) -> Result<Self, RecipientError> {
        ids.into_iter()
            .map(|id| id.as_ref().parse::<Recipient>())
            .collect()
    }
}

impl From<Vec<Recipient>> for Recipients {
    fn from(recipients: Vec<Recipient>) -> Self {
        recipients.into_iter().collect()
    }
}

impl From<Recipients> for Vec<Recipient> {
    fn from(recipients: Recipients) -> Self {
        recipients.0
    }
}

impl FromIterator<Recipient> for Recipients {
    fn from_iter<I: IntoIterator<Item = Recipient>>(iter: I) -> Self {
        let mut set = Recipients::new();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl<'a> IntoIterator for &'a Recipients {
    type Item = &'a Recipient;
    type IntoIter = std::slice::Iter<'a, Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}
