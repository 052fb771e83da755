//! In-memory object store.
//!
//! Backs tests and embedders that keep repositories in process. Objects are
//! content addressed exactly like an on-disk store would address them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bstr::BString;
use patch_hash::ContentId;

use crate::flat::{write_flat_tree, FlatEntry};
use crate::store::{ObjectInserter, ObjectReader, ProjectName, Repository, RepositoryManager};
use crate::{Commit, FileMode, Object, Signature, StoreError};

/// A repository held entirely in memory.
#[derive(Debug)]
pub struct MemoryRepository {
    objects: RwLock<HashMap<ContentId, Object>>,
    refs: RwLock<BTreeMap<String, ContentId>>,
    clock: AtomicI64,
    reads: AtomicUsize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            refs: RwLock::new(BTreeMap::new()),
            clock: AtomicI64::new(1_700_000_000),
            reads: AtomicUsize::new(0),
        }
    }

    fn objects(&self) -> RwLockReadGuard<'_, HashMap<ContentId, Object>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn objects_mut(&self) -> RwLockWriteGuard<'_, HashMap<ContentId, Object>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object immediately.
    pub fn write(&self, object: Object) -> ContentId {
        let id = object.compute_id();
        self.objects_mut().entry(id).or_insert(object);
        id
    }

    pub fn write_blob(&self, data: impl Into<Vec<u8>>) -> ContentId {
        self.write(Object::Blob(data.into()))
    }

    /// Store regular files at the given paths and return the root tree id.
    pub fn write_tree(&self, files: &[(&str, &[u8])]) -> ContentId {
        let with_modes: Vec<(&str, FileMode, &[u8])> = files
            .iter()
            .map(|(path, data)| (*path, FileMode::Regular, *data))
            .collect();
        self.write_tree_with_modes(&with_modes)
    }

    /// Store files with explicit modes and return the root tree id.
    pub fn write_tree_with_modes(&self, files: &[(&str, FileMode, &[u8])]) -> ContentId {
        let mut map = BTreeMap::new();
        for (path, mode, data) in files {
            let id = self.write_blob(data.to_vec());
            map.insert(BString::from(*path), FlatEntry { id, mode: *mode });
        }
        let mut inserter = DirectInserter { repo: self };
        // Writes into this repository cannot fail.
        write_flat_tree(&mut inserter, &map).unwrap_or(ContentId::EMPTY_TREE)
    }

    /// Create a commit. Each call advances the commit clock by one second.
    pub fn commit(&self, tree: ContentId, parents: &[ContentId], message: &str) -> ContentId {
        let time = self.clock.fetch_add(1, Ordering::SeqCst);
        let signature = Signature::new("A U Thor", "author@example.com", time, 0);
        self.write(Object::Commit(Commit {
            tree,
            parents: parents.to_vec(),
            author: signature.clone(),
            committer: signature,
            message: BString::from(message),
        }))
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.objects().contains_key(id)
    }

    /// Number of objects read through readers of this repository.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn refs(&self) -> BTreeMap<String, ContentId> {
        self.refs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Repository for MemoryRepository {
    fn reader(&self) -> Box<dyn ObjectReader + '_> {
        Box::new(MemoryReader { repo: self })
    }

    fn inserter(&self) -> Box<dyn ObjectInserter + '_> {
        Box::new(MemoryInserter {
            repo: self,
            pending: Vec::new(),
        })
    }

    fn find_ref(&self, name: &str) -> Result<Option<ContentId>, StoreError> {
        validate_ref_name(name)?;
        Ok(self
            .refs
            .read()
            .map_err(|_| StoreError::Backend("ref lock poisoned".into()))?
            .get(name)
            .copied())
    }

    fn update_ref(&self, name: &str, id: ContentId) -> Result<(), StoreError> {
        validate_ref_name(name)?;
        if !self.contains(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.refs
            .write()
            .map_err(|_| StoreError::Backend("ref lock poisoned".into()))?
            .insert(name.to_string(), id);
        Ok(())
    }
}

fn validate_ref_name(name: &str) -> Result<(), StoreError> {
    let valid = name.starts_with("refs/")
        && !name.ends_with('/')
        && !name.contains("//")
        && !name.contains("..")
        && !name.bytes().any(|b| b.is_ascii_control() || b == b' ');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRefName(name.to_string()))
    }
}

struct MemoryReader<'a> {
    repo: &'a MemoryRepository,
}

impl ObjectReader for MemoryReader<'_> {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError> {
        self.repo.reads.fetch_add(1, Ordering::Relaxed);
        self.repo
            .objects()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError> {
        self.repo
            .objects()
            .get(id)
            .map(Object::size)
            .ok_or(StoreError::NotFound(*id))
    }
}

/// Buffers objects until `flush`.
struct MemoryInserter<'a> {
    repo: &'a MemoryRepository,
    pending: Vec<(ContentId, Object)>,
}

impl ObjectInserter for MemoryInserter<'_> {
    fn insert(&mut self, object: Object) -> Result<ContentId, StoreError> {
        let id = object.compute_id();
        if !self.repo.contains(&id) {
            self.pending.push((id, object));
        }
        Ok(id)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let mut objects = self.repo.objects_mut();
        for (id, object) in self.pending.drain(..) {
            objects.entry(id).or_insert(object);
        }
        Ok(())
    }
}

struct DirectInserter<'a> {
    repo: &'a MemoryRepository,
}

impl ObjectInserter for DirectInserter<'_> {
    fn insert(&mut self, object: Object) -> Result<ContentId, StoreError> {
        Ok(self.repo.write(object))
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Holds one [`MemoryRepository`] per project.
#[derive(Debug, Default)]
pub struct MemoryRepositoryManager {
    repos: RwLock<HashMap<ProjectName, Arc<MemoryRepository>>>,
}

impl MemoryRepositoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) repository for a project.
    pub fn create(&self, project: &ProjectName) -> Arc<MemoryRepository> {
        self.repos
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(project.clone())
            .or_insert_with(|| Arc::new(MemoryRepository::new()))
            .clone()
    }
}

impl RepositoryManager for MemoryRepositoryManager {
    fn open(&self, project: &ProjectName) -> Result<Arc<dyn Repository>, StoreError> {
        let repos = self
            .repos
            .read()
            .map_err(|_| StoreError::Backend("repository lock poisoned".into()))?;
        match repos.get(project) {
            Some(repo) => Ok(repo.clone()),
            None => Err(StoreError::RepositoryNotFound(project.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_objects_visible_after_flush() {
        let repo = MemoryRepository::new();
        let mut inserter = repo.inserter();
        let id = inserter.insert(Object::Blob(b"pending\n".to_vec())).unwrap();
        assert!(!repo.contains(&id));
        inserter.flush().unwrap();
        assert!(repo.contains(&id));
    }

    #[test]
    fn read_blob_enforces_limit() {
        let repo = MemoryRepository::new();
        let id = repo.write_blob(vec![b'x'; 64]);
        let reader = repo.reader();
        assert_eq!(reader.read_blob(&id, 64).unwrap().len(), 64);
        assert!(matches!(
            reader.read_blob(&id, 63),
            Err(StoreError::TooLarge { size: 64, limit: 63, .. })
        ));
    }

    #[test]
    fn reading_wrong_kind_fails() {
        let repo = MemoryRepository::new();
        let blob = repo.write_blob("data");
        assert!(matches!(
            repo.reader().read_tree(&blob),
            Err(StoreError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn empty_tree_readable_without_storing() {
        let repo = MemoryRepository::new();
        assert!(repo.reader().read_tree(&ContentId::EMPTY_TREE).unwrap().is_empty());
    }

    #[test]
    fn refs_require_existing_objects_and_valid_names() {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[("a", b"1\n")]);
        let commit = repo.commit(tree, &[], "init\n");
        repo.update_ref("refs/heads/main", commit).unwrap();
        assert_eq!(repo.find_ref("refs/heads/main").unwrap(), Some(commit));
        assert_eq!(repo.find_ref("refs/heads/other").unwrap(), None);
        assert!(repo.update_ref("HEAD", commit).is_err());
        assert!(repo.update_ref("refs/heads/x", ContentId::NULL).is_err());
    }

    #[test]
    fn commits_get_distinct_ids() {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[]);
        let a = repo.commit(tree, &[], "same\n");
        let b = repo.commit(tree, &[], "same\n");
        assert_ne!(a, b);
    }

    #[test]
    fn manager_opens_created_projects_only() {
        let manager = MemoryRepositoryManager::new();
        let project = ProjectName::new("platform/core");
        manager.create(&project);
        assert!(manager.open(&project).is_ok());
        assert!(matches!(
            manager.open(&ProjectName::new("missing")),
            Err(StoreError::RepositoryNotFound(_))
        ));
    }
}
