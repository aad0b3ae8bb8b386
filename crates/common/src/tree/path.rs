use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A normalized, rooted path into the secret tree.
///
/// Construction never fails: empty segments and `.` are dropped,
///  and `..` pops a segment without ever climbing above the root,
///  so `/a/./b//../c` and `a/c` name the same node.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretPath {
    segments: Vec<String>,
}

impl SecretPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s.to_string()),
            }
        }
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<SecretPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Join a relative path onto this one. The joined part
    ///  is normalized the same way as [`SecretPath::new`].
    pub fn join(&self, rest: &str) -> SecretPath {
        Self::new(&format!("{}/{}", self, rest))
    }

    /// Append one already-normalized segment
    pub(crate) fn child(&self, name: &str) -> SecretPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Every proper ancestor, root first
    pub fn ancestors(&self) -> Vec<SecretPath> {
        (0..self.segments.len())
            .map(|depth| Self {
                segments: self.segments[..depth].to_vec(),
            })
            .collect()
    }

    /// Whether `self` is `prefix` or lies beneath it
    pub fn starts_with(&self, prefix: &SecretPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl fmt::Debug for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretPath({})", self)
    }
}

impl FromStr for SecretPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for SecretPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for SecretPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}
