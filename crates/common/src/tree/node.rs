use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::recipient::Recipients;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    Secret,
}

/// A directory: named children plus an optional explicit policy.
///
/// An empty `recipients` set means the directory inherits its
///  policy from the nearest ancestor that has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dir {
    pub(crate) recipients: Recipients,
    pub(crate) children: BTreeMap<String, Node>,
}

impl Dir {
    pub fn with_recipients(recipients: Recipients) -> Self {
        Self {
            recipients,
            children: BTreeMap::new(),
        }
    }

    pub fn explicit_recipients(&self) -> &Recipients {
        &self.recipients
    }

    pub fn has_policy(&self) -> bool {
        !self.recipients.is_empty()
    }

    pub fn children(&self) -> &BTreeMap<String, Node> {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A leaf holding one encrypted container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub(crate) ciphertext: Bytes,
}

impl Secret {
    pub fn new(ciphertext: Bytes) -> Self {
        Self { ciphertext }
    }

    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }
}

/// Tree nodes are shared between versions and only copied
///  on the write path (see [`Arc::make_mut`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir(Arc<Dir>),
    Secret(Arc<Secret>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Directory,
            Node::Secret(_) => NodeKind::Secret,
        }
    }

    pub fn as_dir(&self) -> Option<&Dir> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::Secret(_) => None,
        }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            Node::Secret(secret) => Some(secret),
            Node::Dir(_) => None,
        }
    }
}

/// Borrowed view of a resolved node, including the root
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Dir(&'a Dir),
    Secret(&'a Secret),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Dir(_) => NodeKind::Directory,
            NodeRef::Secret(_) => NodeKind::Secret,
        }
    }
}

impl<'a> From<&'a Node> for NodeRef<'a> {
    fn from(node: &'a Node) -> Self {
        match node {
            Node::Dir(dir) => NodeRef::Dir(dir.as_ref()),
            Node::Secret(secret) => NodeRef::Secret(secret.as_ref()),
        }
    }
}

/// One direct child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub kind: NodeKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// The name to present for this entry. Secrets must carry the
    ///  container suffix, which is stripped; any other secret, or one
    ///  named only by the suffix, is hidden from listings.
    pub fn display_name(&self, suffix: &str) -> Option<&str> {
        match self.kind {
            NodeKind::Directory => Some(&self.name),
            NodeKind::Secret => self
                .name
                .strip_suffix(suffix)
                .filter(|stem| !stem.is_empty()),
        }
    }
}
