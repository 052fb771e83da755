//! Object-store contract.
//!
//! A [`RepositoryManager`] opens one [`Repository`] per project. Repositories
//! are shared between threads, but the [`ObjectReader`] and [`ObjectInserter`]
//! handles they hand out are scoped to a single request and never shared.

use std::fmt;
use std::sync::Arc;

use patch_hash::ContentId;
use serde::{Deserialize, Serialize};

use crate::rename::{self, RenameOptions};
use crate::walk::{self, TreeChange};
use crate::{Commit, Object, ObjectKind, StoreError, Tree};

/// Name of a hosted project. Each project owns exactly one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opens repositories by project name.
pub trait RepositoryManager: Send + Sync {
    fn open(&self, project: &ProjectName) -> Result<Arc<dyn Repository>, StoreError>;
}

/// A single repository: object access plus a ref namespace.
pub trait Repository: Send + Sync {
    /// A request-scoped reader.
    fn reader(&self) -> Box<dyn ObjectReader + '_>;

    /// A request-scoped inserter. Objects become visible after `flush`.
    fn inserter(&self) -> Box<dyn ObjectInserter + '_>;

    fn find_ref(&self, name: &str) -> Result<Option<ContentId>, StoreError>;

    /// Create or overwrite a ref.
    fn update_ref(&self, name: &str, id: ContentId) -> Result<(), StoreError>;
}

/// Reads objects. Implementations need not be thread-safe.
pub trait ObjectReader {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError>;

    /// Size of the object's canonical content, without loading it.
    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError>;

    fn read_commit(&self, id: &ContentId) -> Result<Commit, StoreError> {
        match self.read_object(id)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(unexpected(id, ObjectKind::Commit, &other)),
        }
    }

    fn read_tree(&self, id: &ContentId) -> Result<Tree, StoreError> {
        if *id == ContentId::EMPTY_TREE {
            return Ok(Tree::new());
        }
        match self.read_object(id)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(unexpected(id, ObjectKind::Tree, &other)),
        }
    }

    /// Read blob content, refusing blobs larger than `limit` bytes.
    fn read_blob(&self, id: &ContentId, limit: u64) -> Result<Vec<u8>, StoreError> {
        let size = self.object_size(id)?;
        if size > limit {
            return Err(StoreError::TooLarge {
                id: *id,
                size,
                limit,
            });
        }
        match self.read_object(id)? {
            Object::Blob(data) => Ok(data),
            other => Err(unexpected(id, ObjectKind::Blob, &other)),
        }
    }

    /// Entry-level differences between two trees. `None` stands for the
    /// empty tree.
    fn diff_trees(
        &self,
        old: Option<&ContentId>,
        new: Option<&ContentId>,
    ) -> Result<Vec<TreeChange>, StoreError> {
        walk::diff_trees(self, old, new)
    }

    /// Pair deletions with additions into renames (and copies when enabled).
    fn detect_renames(
        &self,
        changes: Vec<TreeChange>,
        options: &RenameOptions,
    ) -> Result<Vec<TreeChange>, StoreError> {
        rename::detect_renames(self, changes, options)
    }
}

/// Writes objects.
pub trait ObjectInserter {
    /// Store an object, returning its id. Storing an existing object is a no-op.
    fn insert(&mut self, object: Object) -> Result<ContentId, StoreError>;

    /// Make all inserted objects durable and visible to new readers.
    fn flush(&mut self) -> Result<(), StoreError>;
}

fn unexpected(id: &ContentId, expected: ObjectKind, actual: &Object) -> StoreError {
    StoreError::UnexpectedKind {
        id: *id,
        expected,
        actual: actual.kind(),
    }
}

impl<R: ObjectReader + ?Sized> ObjectReader for Box<R> {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError> {
        (**self).read_object(id)
    }

    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError> {
        (**self).object_size(id)
    }

    fn read_commit(&self, id: &ContentId) -> Result<Commit, StoreError> {
        (**self).read_commit(id)
    }

    fn read_tree(&self, id: &ContentId) -> Result<Tree, StoreError> {
        (**self).read_tree(id)
    }

    fn read_blob(&self, id: &ContentId, limit: u64) -> Result<Vec<u8>, StoreError> {
        (**self).read_blob(id, limit)
    }
}

impl<R: ObjectReader + ?Sized> ObjectReader for &R {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError> {
        (**self).read_object(id)
    }

    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError> {
        (**self).object_size(id)
    }

    fn read_commit(&self, id: &ContentId) -> Result<Commit, StoreError> {
        (**self).read_commit(id)
    }

    fn read_tree(&self, id: &ContentId) -> Result<Tree, StoreError> {
        (**self).read_tree(id)
    }

    fn read_blob(&self, id: &ContentId, limit: u64) -> Result<Vec<u8>, StoreError> {
        (**self).read_blob(id, limit)
    }
}
