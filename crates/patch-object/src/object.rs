use std::fmt;

use patch_hash::{ContentId, Hasher};
use serde::{Deserialize, Serialize};

use crate::{Commit, Tree};

/// The kinds of objects the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed object of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Serialize the object content (without header).
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(data) => data.clone(),
            Self::Tree(tree) => tree.serialize_content(),
            Self::Commit(commit) => commit.serialize_content(),
        }
    }

    /// Size in bytes of the canonical content.
    pub fn size(&self) -> u64 {
        match self {
            Self::Blob(data) => data.len() as u64,
            other => other.serialize_content().len() as u64,
        }
    }

    /// Compute the object's id.
    pub fn compute_id(&self) -> ContentId {
        match self {
            Self::Blob(data) => Hasher::hash_object("blob", data),
            other => Hasher::hash_object(other.kind().as_str(), &other.serialize_content()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_id() {
        assert_eq!(Object::Tree(Tree::new()).compute_id(), ContentId::EMPTY_TREE);
    }

    #[test]
    fn blob_id_matches_git() {
        let id = Object::Blob(b"hello world\n".to_vec()).compute_id();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }

    #[test]
    fn kind_display() {
        assert_eq!(ObjectKind::Commit.to_string(), "commit");
        assert_eq!(Object::Blob(vec![1, 2]).size(), 2);
    }
}
