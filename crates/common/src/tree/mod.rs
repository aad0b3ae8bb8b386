mod node;
mod path;

use std::collections::btree_map::Entry as Slot;
use std::sync::Arc;

use bytes::Bytes;

use crate::recipient::Recipients;

pub use node::{Dir, Entry, Node, NodeKind, NodeRef, Secret};
pub use path::SecretPath;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("path not found: {0}")]
    NotFound(SecretPath),
    #[error("path is not a directory: {0}")]
    NotADirectory(SecretPath),
    #[error("path is a directory: {0}")]
    IsADirectory(SecretPath),
    #[error("directory not empty: {0}")]
    NotEmpty(SecretPath),
    #[error("invalid path {0}: {1}")]
    InvalidPath(SecretPath, &'static str),
    #[error("directory {0} requires at least one recipient")]
    InvalidRecipients(SecretPath),
}

/// A persistent, copy-on-write tree of directories and secrets.
///
/// Cloning is O(1). Mutations copy only the directories on the
///  path being changed, so any number of versions can share the
///  untouched parts of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretTree {
    root: Arc<Dir>,
}

impl SecretTree {
    /// Create a tree holding only a root with the given policy.
    ///
    /// The root policy may only be empty while a tree is being
    ///  rebuilt from persisted entries.
    pub fn new(root_recipients: Recipients) -> Self {
        Self {
            root: Arc::new(Dir::with_recipients(root_recipients)),
        }
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    pub fn resolve(&self, path: &SecretPath) -> Result<NodeRef<'_>, TreeError> {
        let mut node = NodeRef::Dir(self.root.as_ref());
        for segment in path.segments() {
            let dir = match node {
                NodeRef::Dir(dir) => dir,
                NodeRef::Secret(_) => return Err(TreeError::NotFound(path.clone())),
            };
            node = dir
                .children
                .get(segment)
                .map(NodeRef::from)
                .ok_or_else(|| TreeError::NotFound(path.clone()))?;
        }
        Ok(node)
    }

    pub fn kind(&self, path: &SecretPath) -> Option<NodeKind> {
        self.resolve(path).ok().map(|node| node.kind())
    }

    pub fn get(&self, path: &SecretPath) -> Result<&Bytes, TreeError> {
        match self.resolve(path)? {
            NodeRef::Secret(secret) => Ok(&secret.ciphertext),
            NodeRef::Dir(_) => Err(TreeError::IsADirectory(path.clone())),
        }
    }

    /// Direct children of a directory, in name order
    pub fn list(&self, path: &SecretPath) -> Result<Vec<Entry>, TreeError> {
        let dir = self.dir(path)?;
        Ok(dir
            .children
            .iter()
            .map(|(name, node)| Entry {
                name: name.clone(),
                kind: node.kind(),
            })
            .collect())
    }

    pub fn explicit_recipients(&self, path: &SecretPath) -> Result<&Recipients, TreeError> {
        Ok(&self.dir(path)?.recipients)
    }

    /// The effective policy of a node. Secrets report the policy
    ///  of their parent directory, not what their ciphertext says.
    pub fn effective_recipients(&self, path: &SecretPath) -> Result<&Recipients, TreeError> {
        match self.resolve(path)? {
            NodeRef::Dir(_) => Ok(self.policy(path)?.1),
            NodeRef::Secret(_) => {
                let parent = path.parent().unwrap_or_default();
                Ok(self.policy(&parent)?.1)
            }
        }
    }

    /// Find the directory whose explicit set governs `dir`, returning
    ///  its path and recipients.
    ///
    /// `dir` itself need not exist: missing trailing directories
    ///  inherit like any other, which is the policy a write under a
    ///  not yet created directory will be held to.
    pub fn policy(&self, dir: &SecretPath) -> Result<(SecretPath, &Recipients), TreeError> {
        let mut source = (SecretPath::root(), &self.root.recipients);
        let mut current = SecretPath::root();
        let mut node: &Dir = self.root.as_ref();

        for segment in dir.segments() {
            current = current.child(segment);
            match node.children.get(segment) {
                None => break,
                Some(Node::Secret(_)) => return Err(TreeError::NotADirectory(current)),
                Some(Node::Dir(child)) => {
                    if child.has_policy() {
                        source = (current.clone(), &child.recipients);
                    }
                    node = child.as_ref();
                }
            }
        }

        Ok(source)
    }

    /// Every secret whose policy comes from `dir`: the secrets beneath
    ///  it, stopping at nested directories that carry their own set.
    pub fn secrets_governed_by(&self, dir: &SecretPath) -> Result<Vec<SecretPath>, TreeError> {
        let start = self.dir(dir)?;
        let mut found = Vec::new();
        let mut stack = vec![(dir.clone(), start)];

        while let Some((path, node)) = stack.pop() {
            for (name, child) in node.children.iter() {
                let child_path = path.child(name);
                match child {
                    Node::Secret(_) => found.push(child_path),
                    Node::Dir(sub) if !sub.has_policy() => stack.push((child_path, sub.as_ref())),
                    Node::Dir(_) => {}
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Create or replace a secret, creating missing parent directories.
    ///  Returns the directories that had to be created.
    pub fn insert_secret(
        &mut self,
        path: &SecretPath,
        ciphertext: Bytes,
    ) -> Result<Vec<SecretPath>, TreeError> {
        let (parent, name) = split(path)?;
        let mut created = Vec::new();
        let dir = self.dir_mut(&parent, true, &mut created)?;

        if let Some(Node::Dir(_)) = dir.children.get(name) {
            return Err(TreeError::IsADirectory(path.clone()));
        }
        dir.children.insert(
            name.to_string(),
            Node::Secret(Arc::new(Secret::new(ciphertext))),
        );
        Ok(created)
    }

    /// Set a directory's explicit policy, creating it (and any missing
    ///  parents) if needed. An empty set clears the policy so the
    ///  directory inherits again; the root can never be cleared.
    pub fn set_recipients(
        &mut self,
        path: &SecretPath,
        recipients: Recipients,
    ) -> Result<Vec<SecretPath>, TreeError> {
        if path.is_root() && recipients.is_empty() {
            return Err(TreeError::InvalidRecipients(path.clone()));
        }
        let mut created = Vec::new();
        let dir = self.dir_mut(path, true, &mut created)?;
        dir.recipients = recipients;
        Ok(created)
    }

    /// Remove a secret or an empty directory
    pub fn remove(&mut self, path: &SecretPath) -> Result<NodeKind, TreeError> {
        let (parent, name) = split(path)?;
        let kind = match self.resolve(path)? {
            NodeRef::Dir(dir) if !dir.is_empty() => {
                return Err(TreeError::NotEmpty(path.clone()));
            }
            node => node.kind(),
        };

        let dir = self.dir_mut(&parent, false, &mut Vec::new())?;
        dir.children.remove(name);
        Ok(kind)
    }

    fn dir(&self, path: &SecretPath) -> Result<&Dir, TreeError> {
        match self.resolve(path)? {
            NodeRef::Dir(dir) => Ok(dir),
            NodeRef::Secret(_) => Err(TreeError::NotADirectory(path.clone())),
        }
    }

    fn dir_mut(
        &mut self,
        path: &SecretPath,
        create: bool,
        created: &mut Vec<SecretPath>,
    ) -> Result<&mut Dir, TreeError> {
        let mut dir = Arc::make_mut(&mut self.root);
        let mut current = SecretPath::root();

        for segment in path.segments() {
            current = current.child(segment);
            let child = match dir.children.entry(segment.clone()) {
                Slot::Occupied(slot) => slot.into_mut(),
                Slot::Vacant(slot) => {
                    if !create {
                        return Err(TreeError::NotFound(current));
                    }
                    created.push(current.clone());
                    slot.insert(Node::Dir(Arc::new(Dir::default())))
                }
            };
            dir = match child {
                Node::Dir(child) => Arc::make_mut(child),
                Node::Secret(_) => return Err(TreeError::NotADirectory(current)),
            };
        }

        Ok(dir)
    }
}

fn split(path: &SecretPath) -> Result<(SecretPath, &str), TreeError> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(TreeError::InvalidPath(path.clone(), "operation not allowed on root")),
    }
}
