//! Request-scoped LRU cache of parsed trees and commits.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use lru::LruCache;
use patch_hash::ContentId;

use crate::store::ObjectReader;
use crate::{Commit, Object, StoreError, Tree};

/// Wraps a reader and remembers recently parsed trees and commits.
///
/// Blobs pass straight through; they are large and rarely read twice in a
/// single request. Like the reader it wraps, this is not thread-safe.
pub struct CachingReader<R> {
    inner: R,
    cache: RefCell<LruCache<ContentId, Object>>,
}

impl<R: ObjectReader> CachingReader<R> {
    /// Create with the given capacity (number of objects).
    pub fn new(inner: R, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    /// Number of objects currently cached.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    fn cached_object(&self, id: &ContentId) -> Option<Object> {
        self.cache.borrow_mut().get(id).cloned()
    }

    fn remember(&self, id: ContentId, object: &Object) {
        if !matches!(object, Object::Blob(_)) {
            self.cache.borrow_mut().put(id, object.clone());
        }
    }
}

impl<R: ObjectReader> ObjectReader for CachingReader<R> {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError> {
        if let Some(object) = self.cached_object(id) {
            return Ok(object);
        }
        let object = self.inner.read_object(id)?;
        self.remember(*id, &object);
        Ok(object)
    }

    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError> {
        match self.cache.borrow().peek(id) {
            Some(object) => Ok(object.size()),
            None => self.inner.object_size(id),
        }
    }

    fn read_tree(&self, id: &ContentId) -> Result<Tree, StoreError> {
        if *id == ContentId::EMPTY_TREE {
            return Ok(Tree::new());
        }
        if let Some(Object::Tree(tree)) = self.cached_object(id) {
            return Ok(tree);
        }
        let tree = self.inner.read_tree(id)?;
        self.cache.borrow_mut().put(*id, Object::Tree(tree.clone()));
        Ok(tree)
    }

    fn read_commit(&self, id: &ContentId) -> Result<Commit, StoreError> {
        if let Some(Object::Commit(commit)) = self.cached_object(id) {
            return Ok(commit);
        }
        let commit = self.inner.read_commit(id)?;
        self.cache.borrow_mut().put(*id, Object::Commit(commit.clone()));
        Ok(commit)
    }

    fn read_blob(&self, id: &ContentId, limit: u64) -> Result<Vec<u8>, StoreError> {
        self.inner.read_blob(id, limit)
    }
}
