//! Modified files layer: every path changed between two commits, plus the
//! synthetic commit message and merge list entries.
//!
//! When the two commits sit on different parents, paths neither commit
//! touched relative to its own parent are dropped: their changes can only
//! come from the commits in between.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bstr::BString;
use patch_diff::tree::merge_type_changes;
use patch_diff::ModifiedFile;
use patch_object::{ChangeKind, Commit, FileMode, ObjectReader};
use tracing::debug;

use crate::comparison::{may_contain_rebase, ComparisonType, COMMIT_MSG, MERGE_LIST};
use crate::config::LayerConfig;
use crate::keys::{ModifiedFilesKey, TreeDiffKey};
use crate::loading::{CacheStats, LoadingCache};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::tree_diff::TreeDiffCache;
use crate::CacheError;

const NAME: &str = "modified_files";
const VERSION: u32 = 1;

pub struct ModifiedFilesCache {
    cache: LoadingCache<ModifiedFilesKey, Vec<ModifiedFile>>,
    repos: Arc<Repositories>,
    trees: Arc<TreeDiffCache>,
}

impl ModifiedFilesCache {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        trees: Arc<TreeDiffCache>,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            repos,
            trees,
        })
    }

    pub fn get(&self, key: &ModifiedFilesKey) -> Result<Arc<Vec<ModifiedFile>>, CacheError> {
        key.validate()?;
        self.cache.get(key, |k| self.compute(k))
    }

    pub fn get_all(
        &self,
        keys: &[ModifiedFilesKey],
    ) -> Result<HashMap<ModifiedFilesKey, Result<Arc<Vec<ModifiedFile>>, CacheError>>, CacheError>
    {
        for key in keys {
            key.validate()?;
        }
        Ok(self.cache.get_all(keys, |k| self.compute(k)))
    }

    pub fn invalidate(&self, key: &ModifiedFilesKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &ModifiedFilesKey) -> Result<Vec<ModifiedFile>, CacheError> {
        let repo = self.repos.open(&key.project)?;
        let reader = self.repos.reader(&*repo);
        let new = reader.read_commit(&key.new_commit)?;
        let old = key
            .old_commit
            .map(|id| reader.read_commit(&id))
            .transpose()?;

        let changed = self.trees.get(&TreeDiffKey {
            project: key.project.clone(),
            old_tree: old.as_ref().map(|c| c.tree),
            new_tree: new.tree,
            rename_score: key.rename_score,
        })?;
        let mut files = merge_type_changes(changed.as_ref().clone());

        if let (Some(old_id), Some(old)) = (key.old_commit, &old) {
            if may_contain_rebase(&old_id, old, &key.new_commit, &new) {
                let touched = self.touched_paths(&reader, key, old, &new)?;
                let before = files.len();
                files.retain(|f| {
                    [f.old_path.as_ref(), f.new_path.as_ref()]
                        .into_iter()
                        .flatten()
                        .any(|p| touched.contains(p))
                });
                debug!(
                    project = %key.project,
                    dropped = before - files.len(),
                    "dropped files untouched by either commit"
                );
            }
        }

        let mut listing = magic_entries(key.comparison, old.is_some(), new.is_merge());
        listing.extend(files);
        Ok(listing)
    }

    /// Paths each commit changed relative to its own parent.
    fn touched_paths<R: ObjectReader + ?Sized>(
        &self,
        reader: &R,
        key: &ModifiedFilesKey,
        old: &Commit,
        new: &Commit,
    ) -> Result<HashSet<BString>, CacheError> {
        let mut touched = HashSet::new();
        for commit in [old, new] {
            let parent = reader.read_commit(&commit.parents[0])?;
            let changes = self.trees.get(&TreeDiffKey {
                project: key.project.clone(),
                old_tree: Some(parent.tree),
                new_tree: commit.tree,
                rename_score: None,
            })?;
            for change in changes.iter() {
                touched.extend(change.old_path.iter().cloned());
                touched.extend(change.new_path.iter().cloned());
            }
        }
        Ok(touched)
    }
}

/// Entries of the synthetic files. The merge list exists only for merges.
pub fn magic_entries(
    comparison: ComparisonType,
    has_old_commit: bool,
    is_merge: bool,
) -> Vec<ModifiedFile> {
    let has_old_side = comparison.has_magic_old_side() && has_old_commit;
    let paths: &[&str] = if is_merge {
        &[COMMIT_MSG, MERGE_LIST]
    } else {
        &[COMMIT_MSG]
    };
    paths
        .iter()
        .map(|path| ModifiedFile {
            kind: if has_old_side {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            },
            old_path: has_old_side.then(|| BString::from(*path)),
            new_path: Some(BString::from(*path)),
            old_mode: has_old_side.then_some(FileMode::Regular),
            new_mode: Some(FileMode::Regular),
            old_id: None,
            new_id: None,
            score: None,
        })
        .collect()
}
