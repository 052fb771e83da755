//! Git file diff layer: the diff of one path between two trees.
//!
//! A diff that exceeds its time budget is cached as a negative entry so
//! that repeated requests do not run into the same timeout.
//! [`GitFileDiffCache::get_or_fallback`] replaces negative entries with a
//! budget-free computation under a separate key.

use std::collections::HashMap;
use std::sync::Arc;

use bstr::BString;
use patch_diff::tree::merge_type_changes;
use patch_diff::{DiffError, FileDiffEngine, FileDiffInput, FileDiffOptions, FileSide, GitFileDiff};
use patch_hash::ContentId;
use patch_object::{FileMode, ObjectReader};
use tracing::{debug, warn};

use crate::config::LayerConfig;
use crate::keys::GitFileDiffKey;
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::tree_diff::TreeDiffCache;
use crate::CacheError;

const NAME: &str = "git_file_diff";
const VERSION: u32 = 1;

pub struct GitFileDiffCache {
    cache: LoadingCache<GitFileDiffKey, GitFileDiff>,
    repos: Arc<Repositories>,
    trees: Arc<TreeDiffCache>,
    engine: Arc<FileDiffEngine>,
    large_object_threshold: u64,
}

impl GitFileDiffCache {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        trees: Arc<TreeDiffCache>,
        engine: Arc<FileDiffEngine>,
        large_object_threshold: u64,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            repos,
            trees,
            engine,
            large_object_threshold,
        })
    }

    pub fn get(&self, key: &GitFileDiffKey) -> Result<Arc<GitFileDiff>, CacheError> {
        self.cache.get(key, |k| self.compute(k))
    }

    /// Like [`get`](Self::get), but a negative entry is recomputed with
    /// the fallback algorithm and no budget.
    pub fn get_or_fallback(&self, key: &GitFileDiffKey) -> Result<Arc<GitFileDiff>, CacheError> {
        let diff = self.get(key)?;
        if !diff.is_negative() {
            return Ok(diff);
        }
        debug!(project = %key.project, path = %key.path, "recomputing timed out diff");
        self.get(&key.fallback())
    }

    pub fn get_all(
        &self,
        keys: &[GitFileDiffKey],
    ) -> HashMap<GitFileDiffKey, Result<Arc<GitFileDiff>, CacheError>> {
        self.cache.get_all(keys, |k| self.compute(k))
    }

    pub fn invalidate(&self, key: &GitFileDiffKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &GitFileDiffKey) -> Result<GitFileDiff, CacheError> {
        let files = self.trees.get(&key.tree_diff_key())?;
        let file = merge_type_changes(files.as_ref().clone())
            .into_iter()
            .find(|f| f.path() == key.path.as_slice());
        let Some(file) = file else {
            return Ok(GitFileDiff::empty());
        };

        let repo = self.repos.open(&key.project)?;
        let reader = self.repos.reader(&*repo);
        let input = FileDiffInput {
            kind: file.kind,
            old: self.side(&reader, file.old_path, file.old_mode, file.old_id)?,
            new: self.side(&reader, file.new_path, file.new_mode, file.new_id)?,
            score: file.score,
        };
        let options = FileDiffOptions {
            algorithm: key.algorithm,
            whitespace: key.whitespace,
            use_timeout: key.use_timeout,
        };
        match self.engine.compute(&input, &options) {
            Ok(diff) => Ok(diff),
            Err(DiffError::Timeout(budget)) => {
                warn!(
                    project = %key.project,
                    path = %key.path,
                    old_tree = ?key.old_tree,
                    new_tree = %key.new_tree,
                    timeout_ms = budget.as_millis() as u64,
                    "{} ms timeout reached for file diff",
                    budget.as_millis()
                );
                Ok(GitFileDiff::negative(&input))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn side<R: ObjectReader + ?Sized>(
        &self,
        reader: &R,
        path: Option<BString>,
        mode: Option<FileMode>,
        id: Option<ContentId>,
    ) -> Result<Option<FileSide>, CacheError> {
        let (Some(path), Some(mode), Some(id)) = (path, mode, id) else {
            return Ok(None);
        };
        let content = if mode.is_gitlink() {
            format!("Subproject commit {id}\n").into_bytes()
        } else if mode.is_tree() {
            Vec::new()
        } else {
            reader.read_blob(&id, self.large_object_threshold)?
        };
        Ok(Some(FileSide {
            path,
            mode,
            id,
            content: Arc::new(content),
        }))
    }
}

impl Weigh for GitFileDiff {
    fn weight(&self) -> u64 {
        let paths = self.old_path.as_ref().map_or(0, |p| p.len())
            + self.new_path.as_ref().map_or(0, |p| p.len());
        (128 + self.header.len() + paths + self.edits.len() * 32) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patch_diff::{DiffAlgorithm, Edit, PatchType, Whitespace};
    use patch_object::memory::{MemoryRepository, MemoryRepositoryManager};
    use patch_object::ChangeKind;
    use std::time::Duration;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        cache: GitFileDiffCache,
    }

    fn fixture(threshold: u64) -> Fixture {
        let manager = Arc::new(MemoryRepositoryManager::new());
        let repo = manager.create(&"p".into());
        let repos = Arc::new(Repositories::new(manager));
        let trees = Arc::new(
            TreeDiffCache::new(Arc::clone(&repos), &LayerConfig::default(), None).unwrap(),
        );
        let engine = Arc::new(FileDiffEngine::new(2, Duration::from_secs(5)).unwrap());
        let cache =
            GitFileDiffCache::new(repos, trees, engine, threshold, &LayerConfig::default(), None)
                .unwrap();
        Fixture { repo, cache }
    }

    fn key(old: ContentId, new: ContentId, path: &str) -> GitFileDiffKey {
        GitFileDiffKey {
            project: "p".into(),
            old_tree: Some(old),
            new_tree: new,
            path: path.into(),
            rename_score: Some(60),
            algorithm: DiffAlgorithm::Histogram,
            whitespace: Whitespace::IgnoreNone,
            use_timeout: true,
        }
    }

    #[test]
    fn diffs_one_path() {
        let f = fixture(1024);
        let old = f.repo.write_tree(&[("a", b"a\nb\nc\n"), ("z", b"z\n")]);
        let new = f.repo.write_tree(&[("a", b"a\nB\nc\n"), ("z", b"z\n")]);
        let diff = f.cache.get(&key(old, new, "a")).unwrap();
        assert_eq!(diff.edits, vec![Edit::new(1, 2, 1, 2)]);
        assert_eq!(diff.change_kind, ChangeKind::Modified);
        assert_eq!(diff.patch_type, PatchType::Unified);
        assert_eq!((diff.old_size, diff.new_size), (6, 6));
        assert!(diff.header.starts_with(b"diff --git a/a b/a\n"));
        assert!(!diff.is_negative());
    }

    #[test]
    fn unchanged_path_is_empty() {
        let f = fixture(1024);
        let old = f.repo.write_tree(&[("a", b"1\n"), ("z", b"z\n")]);
        let new = f.repo.write_tree(&[("a", b"2\n"), ("z", b"z\n")]);
        assert!(f.cache.get(&key(old, new, "z")).unwrap().is_empty());
    }

    #[test]
    fn large_blob_is_too_large() {
        let f = fixture(8);
        let old = f.repo.write_tree(&[("a", b"small\n")]);
        let new = f.repo.write_tree(&[("a", b"this content is too large\n")]);
        let err = f.cache.get(&key(old, new, "a")).unwrap_err();
        assert!(err.is_too_large());
    }

    #[test]
    fn type_change_is_one_rewrite() {
        let f = fixture(1024);
        let old = f
            .repo
            .write_tree_with_modes(&[("l", FileMode::Regular, b"target\n")]);
        let new = f
            .repo
            .write_tree_with_modes(&[("l", FileMode::Symlink, b"target")]);
        let diff = f.cache.get(&key(old, new, "l")).unwrap();
        assert_eq!(diff.change_kind, ChangeKind::Rewrite);
        assert_eq!(diff.old_mode, Some(FileMode::Regular));
        assert_eq!(diff.new_mode, Some(FileMode::Symlink));
    }

    #[test]
    fn fallback_of_a_complete_diff_is_the_diff() {
        let f = fixture(1024);
        let old = f.repo.write_tree(&[("a", b"1\n")]);
        let new = f.repo.write_tree(&[("a", b"2\n")]);
        let k = key(old, new, "a");
        let direct = f.cache.get(&k).unwrap();
        let fallback = f.cache.get_or_fallback(&k).unwrap();
        assert!(Arc::ptr_eq(&direct, &fallback));
    }
}
