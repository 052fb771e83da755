//! File diff layer: the diff of one path between two commits, annotated with
//! the edits a rebase brought in.
//!
//! The main diff comes from the git file diff layer. When the two commits
//! sit on different parents, three auxiliary diffs (old parent to old, new
//! parent to new, old parent to new parent) feed the edit transformer; main
//! edits equal to a transformed parent edit are marked as rebase edits. A
//! file whose every change is due to the rebase is reported as empty.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bstr::{BString, ByteSlice};
use patch_diff::header::magic_file_header;
use patch_diff::rebase::match_rebase_edits;
use patch_diff::{
    DiffAlgorithm, Edit, EditTransformer, FileDiffEngine, FileEdits, GitFileDiff, PatchType,
    RebaseEdits,
};
use patch_hash::ContentId;
use patch_object::{ChangeKind, Commit, FileMode, ObjectReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparison::{is_magic_path, magic_file_content, may_contain_rebase, ComparisonType};
use crate::config::LayerConfig;
use crate::git_file_diff::GitFileDiffCache;
use crate::keys::{FileDiffKey, GitFileDiffKey};
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::CacheError;

const NAME: &str = "file_diff";
const VERSION: u32 = 2;

/// The diff of one file between two commits.
///
/// Absent paths mean the file was added (no old path) or deleted (no new
/// path). Both absent is the empty sentinel: nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub old_commit: Option<ContentId>,
    pub new_commit: ContentId,
    pub comparison: ComparisonType,
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub change_kind: ChangeKind,
    pub patch_type: PatchType,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub old_id: Option<ContentId>,
    pub new_id: Option<ContentId>,
    pub old_size: u64,
    pub new_size: u64,
    pub header: BString,
    /// Line edits, sorted by their position on side A.
    pub edits: Vec<Edit>,
    /// The edits a rebase accounts for; a subset of `edits`.
    pub rebase_edits: Vec<Edit>,
    /// The algorithm that produced `edits`.
    pub algorithm: DiffAlgorithm,
    /// The diff did not finish in time; only the metadata is meaningful.
    pub negative: bool,
}

impl FileDiff {
    pub fn empty(key: &FileDiffKey) -> Self {
        Self {
            old_commit: key.old_commit,
            new_commit: key.new_commit,
            comparison: key.comparison,
            old_path: None,
            new_path: None,
            change_kind: ChangeKind::Modified,
            patch_type: PatchType::Unified,
            old_mode: None,
            new_mode: None,
            old_id: None,
            new_id: None,
            old_size: 0,
            new_size: 0,
            header: BString::default(),
            edits: Vec::new(),
            rebase_edits: Vec::new(),
            algorithm: key.algorithm,
            negative: false,
        }
    }

    fn from_git(key: &FileDiffKey, diff: &GitFileDiff, rebase_edits: Vec<Edit>) -> Self {
        Self {
            old_commit: key.old_commit,
            new_commit: key.new_commit,
            comparison: key.comparison,
            old_path: diff.old_path.clone(),
            new_path: diff.new_path.clone(),
            change_kind: diff.change_kind,
            patch_type: diff.patch_type,
            old_mode: diff.old_mode,
            new_mode: diff.new_mode,
            old_id: diff.old_id,
            new_id: diff.new_id,
            old_size: diff.old_size,
            new_size: diff.new_size,
            header: diff.header.clone(),
            edits: diff.edits.clone(),
            rebase_edits,
            algorithm: key.algorithm,
            negative: diff.negative,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.old_path.is_none() && self.new_path.is_none() && !self.negative
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The new path, or the old path for deletions.
    pub fn path(&self) -> Option<&BString> {
        self.new_path.as_ref().or(self.old_path.as_ref())
    }

    /// Lines added by the change itself.
    pub fn insertions(&self) -> usize {
        self.own_edits().map(Edit::length_b).sum()
    }

    /// Lines removed by the change itself.
    pub fn deletions(&self) -> usize {
        self.own_edits().map(Edit::length_a).sum()
    }

    fn own_edits(&self) -> impl Iterator<Item = &Edit> {
        let rebase: HashSet<&Edit> = self.rebase_edits.iter().collect();
        self.edits.iter().filter(move |e| !rebase.contains(e))
    }
}

impl Weigh for FileDiff {
    fn weight(&self) -> u64 {
        let paths = self.old_path.as_ref().map_or(0, |p| p.len())
            + self.new_path.as_ref().map_or(0, |p| p.len());
        let edits = (self.edits.len() + self.rebase_edits.len()) * 32;
        (160 + self.header.len() + paths + edits) as u64
    }
}

pub struct FileDiffCache {
    cache: LoadingCache<FileDiffKey, FileDiff>,
    repos: Arc<Repositories>,
    git_diffs: Arc<GitFileDiffCache>,
}

impl FileDiffCache {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        git_diffs: Arc<GitFileDiffCache>,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            repos,
            git_diffs,
        })
    }

    pub fn get(&self, key: &FileDiffKey) -> Result<Arc<FileDiff>, CacheError> {
        key.validate()?;
        self.cache.get(key, |k| self.compute(k))
    }

    /// Like [`get`](Self::get), but a negative entry is recomputed with the
    /// fallback algorithm and no budget.
    pub fn get_or_fallback(&self, key: &FileDiffKey) -> Result<Arc<FileDiff>, CacheError> {
        let diff = self.get(key)?;
        if !diff.is_negative() {
            return Ok(diff);
        }
        self.get(&key.fallback())
    }

    /// Look up several paths. Fails as a whole only when a key is invalid.
    pub fn get_all(
        &self,
        keys: &[FileDiffKey],
    ) -> Result<HashMap<FileDiffKey, Result<Arc<FileDiff>, CacheError>>, CacheError> {
        for key in keys {
            key.validate()?;
        }
        Ok(self.cache.get_all(keys, |k| self.compute(k)))
    }

    pub fn invalidate(&self, key: &FileDiffKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &FileDiffKey) -> Result<FileDiff, CacheError> {
        let repo = self.repos.open(&key.project)?;
        let reader = self.repos.reader(&*repo);
        let new_commit = reader.read_commit(&key.new_commit)?;
        let old_commit = key
            .old_commit
            .map(|id| reader.read_commit(&id))
            .transpose()?;

        if is_magic_path(&key.path) {
            return magic_file_diff(&reader, key, old_commit.as_ref(), &new_commit);
        }

        let main = self.git_diffs.get(&GitFileDiffKey {
            project: key.project.clone(),
            old_tree: old_commit.as_ref().map(|c| c.tree),
            new_tree: new_commit.tree,
            path: key.path.clone(),
            rename_score: key.rename_score,
            algorithm: key.algorithm,
            whitespace: key.whitespace,
            use_timeout: key.use_timeout,
        })?;
        if main.is_negative() {
            return Ok(FileDiff::from_git(key, &main, Vec::new()));
        }
        if main.is_empty() {
            return Ok(FileDiff::empty(key));
        }

        let rebase = match (key.old_commit, &old_commit) {
            (Some(old_id), Some(old))
                if may_contain_rebase(&old_id, old, &key.new_commit, &new_commit) =>
            {
                self.rebase_edits(&reader, key, old, &new_commit, &main)?
            }
            _ => RebaseEdits::default(),
        };
        if rebase.whole_file {
            debug!(project = %key.project, path = %key.path, "every edit is due to rebase");
            return Ok(FileDiff::empty(key));
        }
        Ok(FileDiff::from_git(key, &main, rebase.edits))
    }

    fn rebase_edits<R: ObjectReader + ?Sized>(
        &self,
        reader: &R,
        key: &FileDiffKey,
        old: &Commit,
        new: &Commit,
        main: &GitFileDiff,
    ) -> Result<RebaseEdits, CacheError> {
        let old_parent = reader.read_commit(&old.parents[0])?.tree;
        let new_parent = reader.read_commit(&new.parents[0])?.tree;
        let aux = |old_tree: ContentId, new_tree: ContentId, path: &BString| GitFileDiffKey {
            project: key.project.clone(),
            old_tree: Some(old_tree),
            new_tree,
            path: path.clone(),
            rename_score: key.rename_score,
            algorithm: key.algorithm,
            whitespace: key.whitespace,
            use_timeout: key.use_timeout,
        };

        let old_path = main.old_path.as_ref().unwrap_or(&key.path);
        let new_path = main.new_path.as_ref().unwrap_or(&key.path);
        let old_vs_parent = self
            .git_diffs
            .get_or_fallback(&aux(old_parent, old.tree, old_path))?;
        let new_vs_parent = self
            .git_diffs
            .get_or_fallback(&aux(new_parent, new.tree, new_path))?;
        let parent_path = new_vs_parent.old_path.as_ref().unwrap_or(&key.path);
        let parent_vs_parent = self
            .git_diffs
            .get_or_fallback(&aux(old_parent, new_parent, parent_path))?;
        if parent_vs_parent.is_empty() {
            return Ok(RebaseEdits::default());
        }

        let mut transformer = EditTransformer::new(&[file_edits(&parent_vs_parent)]);
        if !old_vs_parent.is_empty() {
            transformer.transform_side_a(&[file_edits(&old_vs_parent)]);
        }
        if !new_vs_parent.is_empty() {
            transformer.transform_side_b(&[file_edits(&new_vs_parent)]);
        }
        let per_path = transformer.edits_per_file_path();
        let lookup = if main.change_kind == ChangeKind::Deleted {
            main.old_path.as_ref()
        } else {
            main.new_path.as_ref()
        };
        let candidates = lookup
            .and_then(|path| per_path.get(path))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let rebase = match_rebase_edits(&file_edits(main), candidates);
        debug!(
            project = %key.project,
            path = %key.path,
            rebase_edits = rebase.edits.len(),
            "matched rebase edits"
        );
        Ok(rebase)
    }
}

fn file_edits(diff: &GitFileDiff) -> FileEdits {
    FileEdits::new(
        diff.old_path.clone(),
        diff.new_path.clone(),
        diff.edits.clone(),
    )
}

/// Diff of a synthetic file. Against a parent, the auto-merge or nothing the
/// old side is empty.
fn magic_file_diff<R: ObjectReader + ?Sized>(
    reader: &R,
    key: &FileDiffKey,
    old: Option<&Commit>,
    new: &Commit,
) -> Result<FileDiff, CacheError> {
    let Some(new_text) = magic_file_content(reader, &key.path, new, key.comparison)? else {
        return Ok(FileDiff::empty(key));
    };
    let old_text = match old {
        Some(old) if key.comparison.has_magic_old_side() => {
            magic_file_content(reader, &key.path, old, key.comparison)?.unwrap_or_default()
        }
        _ => Vec::new(),
    };
    let has_old_side = key.comparison.has_magic_old_side() && old.is_some();

    let edits = FileDiffEngine::diff_text(
        &old_text,
        &new_text,
        DiffAlgorithm::Histogram,
        key.whitespace,
    );
    let path = key.path.clone();
    Ok(FileDiff {
        old_commit: key.old_commit,
        new_commit: key.new_commit,
        comparison: key.comparison,
        old_path: has_old_side.then(|| path.clone()),
        new_path: Some(path.clone()),
        change_kind: if has_old_side {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        },
        patch_type: PatchType::Unified,
        old_mode: has_old_side.then_some(FileMode::Regular),
        new_mode: Some(FileMode::Regular),
        old_id: None,
        new_id: None,
        old_size: old_text.len() as u64,
        new_size: new_text.len() as u64,
        header: magic_file_header(path.as_bstr(), has_old_side),
        edits,
        rebase_edits: Vec::new(),
        algorithm: DiffAlgorithm::Histogram,
        negative: false,
    })
}
