//! The diff service: every layer wired together behind the operations a
//! review application calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bstr::BString;
use patch_diff::{
    DiffAlgorithm, FileDiffEngine, IntraLineDiff, IntraLineDiffEngine, IntraLineStatus,
    PatchType, Whitespace,
};
use patch_hash::ContentId;
use patch_merge::{strategy_for, MergeOptions, MergeStrategy};
use patch_object::{Commit, ObjectReader, ProjectName, RepositoryManager};
use tracing::{debug, info, warn};

use crate::automerge::{AutoMerge, AutoMergeCache, AutoMergeSynthesizer};
use crate::comparison::ComparisonType;
use crate::config::DiffConfig;
use crate::file_diff::{FileDiff, FileDiffCache};
use crate::git_file_diff::GitFileDiffCache;
use crate::intraline::IntraLineCache;
use crate::keys::{DiffSummaryKey, FileDiffKey, IntraLineKey, ModifiedFilesKey};
use crate::loading::CacheStats;
use crate::modified_files::{magic_entries, ModifiedFilesCache};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::summary::{DiffSummary, DiffSummaryCache};
use crate::tree_diff::TreeDiffCache;
use crate::CacheError;

/// How two files are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub whitespace: Whitespace,
    pub algorithm: DiffAlgorithm,
    /// `None` disables rename detection.
    pub rename_score: Option<u8>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            whitespace: Whitespace::IgnoreNone,
            algorithm: DiffAlgorithm::Histogram,
            rename_score: Some(60),
        }
    }
}

impl DiffOptions {
    /// Defaults taken from the service configuration.
    pub fn from_config(config: &DiffConfig) -> Self {
        Self {
            rename_score: config.diff.rename_score(),
            ..Self::default()
        }
    }
}

/// Changed files of a commit against one of its bases.
#[derive(Debug, Clone)]
pub struct ModifiedFilesListing {
    /// The base actually used; `None` for a root commit.
    pub old_commit: Option<ContentId>,
    pub comparison: ComparisonType,
    /// Keyed by [`FileDiff::path`].
    pub files: BTreeMap<BString, Arc<FileDiff>>,
    /// Only the synthetic files were listed because the commit merges more
    /// than two parents.
    pub files_skipped: bool,
}

/// The diff service.
pub struct DiffOperations {
    config: DiffConfig,
    repos: Arc<Repositories>,
    store: Option<PersistentStore>,
    tree_diffs: Arc<TreeDiffCache>,
    git_file_diffs: Arc<GitFileDiffCache>,
    file_diffs: Arc<FileDiffCache>,
    modified_files: Arc<ModifiedFilesCache>,
    summaries: DiffSummaryCache,
    intraline: IntraLineCache,
    auto_merges: AutoMergeCache,
}

impl DiffOperations {
    /// Build the service with the merge strategy named in `config`.
    pub fn new(
        repositories: Arc<dyn RepositoryManager>,
        config: DiffConfig,
    ) -> Result<Self, CacheError> {
        let strategy = strategy_for(config.automerge.strategy);
        Self::with_strategy(repositories, config, strategy)
    }

    pub fn with_strategy(
        repositories: Arc<dyn RepositoryManager>,
        config: DiffConfig,
        strategy: Arc<dyn MergeStrategy>,
    ) -> Result<Self, CacheError> {
        let heuristics = config.intraline.heuristics()?;
        let store = config
            .cache
            .directory
            .as_deref()
            .map(PersistentStore::open)
            .transpose()?;
        let persisted = store.as_ref();
        let cache = &config.cache;
        let threshold = config.diff.large_object_threshold;
        let threads = config.diff.worker_threads.max(1);
        let strategy_kind = strategy.kind();

        let repos = Arc::new(Repositories::new(repositories));
        let file_engine = Arc::new(FileDiffEngine::new(threads, config.diff.timeout())?);
        let intraline_engine =
            IntraLineDiffEngine::new(threads, config.intraline.timeout(), heuristics)?;

        let tree_diffs = Arc::new(TreeDiffCache::new(
            Arc::clone(&repos),
            &cache.tree_diff,
            persisted,
        )?);
        let git_file_diffs = Arc::new(GitFileDiffCache::new(
            Arc::clone(&repos),
            Arc::clone(&tree_diffs),
            file_engine,
            threshold,
            &cache.git_file_diff,
            persisted,
        )?);
        let file_diffs = Arc::new(FileDiffCache::new(
            Arc::clone(&repos),
            Arc::clone(&git_file_diffs),
            &cache.file_diff,
            persisted,
        )?);
        let modified_files = Arc::new(ModifiedFilesCache::new(
            Arc::clone(&repos),
            Arc::clone(&tree_diffs),
            &cache.modified_files,
            persisted,
        )?);
        let summaries = DiffSummaryCache::new(
            Arc::clone(&modified_files),
            Arc::clone(&file_diffs),
            config.diff.rename_score(),
            &cache.diff_summary,
            persisted,
        )?;
        let intraline = IntraLineCache::new(
            Arc::clone(&repos),
            intraline_engine,
            threshold,
            &cache.intraline,
            persisted,
        )?;
        let synthesizer = AutoMergeSynthesizer::new(
            Arc::clone(&repos),
            strategy,
            MergeOptions {
                max_blob_size: threshold,
                ..MergeOptions::default()
            },
        );
        // Unsaved auto-merges exist only in the overlay.
        let auto_merges = AutoMergeCache::new(
            synthesizer,
            &cache.auto_merge,
            persisted.filter(|_| config.automerge.save),
        )?;

        info!(
            threads,
            persistent = store.is_some(),
            strategy = %strategy_kind,
            "diff service ready"
        );
        Ok(Self {
            config,
            repos,
            store,
            tree_diffs,
            git_file_diffs,
            file_diffs,
            modified_files,
            summaries,
            intraline,
            auto_merges,
        })
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Every changed file between two commits, keyed by path. Files whose
    /// every change was brought in by a rebase are left out.
    pub fn list_modified_files(
        &self,
        project: &ProjectName,
        old_commit: &ContentId,
        new_commit: &ContentId,
        options: &DiffOptions,
    ) -> Result<BTreeMap<BString, Arc<FileDiff>>, CacheError> {
        let new = self.read_commit(project, new_commit)?;
        let comparison = ComparisonType::between(Some(old_commit), &new);
        self.list_files(project, Some(*old_commit), *new_commit, comparison, options)
    }

    /// Every changed file of a commit against one of its parents.
    ///
    /// `parent_num` counts from 1; 0 picks the base automatically: nothing
    /// for a root commit, the only parent, the auto-merge of a two-parent
    /// merge (parent 1 if the auto-merge fails), or parent 1 with only the
    /// synthetic files listed for merges of more than two parents.
    pub fn list_modified_files_against_parent(
        &self,
        project: &ProjectName,
        new_commit: &ContentId,
        parent_num: u32,
        options: &DiffOptions,
    ) -> Result<ModifiedFilesListing, CacheError> {
        let new = self.read_commit(project, new_commit)?;
        let base = self.resolve_base(project, new_commit, &new, parent_num)?;
        let files = if base.files_skipped {
            let keys: Vec<FileDiffKey> = magic_entries(base.comparison, true, new.is_merge())
                .iter()
                .map(|f| {
                    self.file_key(
                        project,
                        base.old_commit,
                        *new_commit,
                        f.path().into(),
                        base.comparison,
                        options,
                    )
                })
                .collect();
            self.load_files(&keys)?
        } else {
            self.list_files(project, base.old_commit, *new_commit, base.comparison, options)?
        };
        Ok(ModifiedFilesListing {
            old_commit: base.old_commit,
            comparison: base.comparison,
            files,
            files_skipped: base.files_skipped,
        })
    }

    /// The diff of one file. An unchanged path yields the empty sentinel.
    pub fn get_modified_file(
        &self,
        project: &ProjectName,
        old_commit: &ContentId,
        new_commit: &ContentId,
        path: &[u8],
        options: &DiffOptions,
    ) -> Result<Arc<FileDiff>, CacheError> {
        let new = self.read_commit(project, new_commit)?;
        let comparison = ComparisonType::between(Some(old_commit), &new);
        let key = self.file_key(
            project,
            Some(*old_commit),
            *new_commit,
            path.into(),
            comparison,
            options,
        );
        self.file_diffs.get_or_fallback(&key)
    }

    /// The diff of one file against a parent, chosen as in
    /// [`list_modified_files_against_parent`](Self::list_modified_files_against_parent).
    pub fn get_modified_file_against_parent(
        &self,
        project: &ProjectName,
        new_commit: &ContentId,
        parent_num: u32,
        path: &[u8],
        options: &DiffOptions,
    ) -> Result<Arc<FileDiff>, CacheError> {
        let new = self.read_commit(project, new_commit)?;
        let base = self.resolve_base(project, new_commit, &new, parent_num)?;
        let key = self.file_key(
            project,
            base.old_commit,
            *new_commit,
            path.into(),
            base.comparison,
            options,
        );
        self.file_diffs.get_or_fallback(&key)
    }

    /// Paths and line counts of a change. Without an old commit the base is
    /// chosen automatically.
    pub fn get_diff_summary(
        &self,
        project: &ProjectName,
        old_commit: Option<&ContentId>,
        new_commit: &ContentId,
        whitespace: Whitespace,
    ) -> Result<Arc<DiffSummary>, CacheError> {
        let new = self.read_commit(project, new_commit)?;
        let (old_commit, comparison) = match old_commit {
            Some(old) => (Some(*old), ComparisonType::between(Some(old), &new)),
            None => {
                let base = self.resolve_base(project, new_commit, &new, 0)?;
                (base.old_commit, base.comparison)
            }
        };
        self.summaries.get(&DiffSummaryKey {
            project: project.clone(),
            old_commit,
            new_commit: *new_commit,
            comparison,
            whitespace,
        })
    }

    /// Character-level refinement of a file diff. Diffs without content on
    /// both sides, binary diffs and synthetic files have nothing to refine.
    pub fn get_intraline_diff(
        &self,
        project: &ProjectName,
        diff: &FileDiff,
        options: &DiffOptions,
    ) -> Result<Arc<IntraLineDiff>, CacheError> {
        let (Some(old_blob), Some(new_blob)) = (diff.old_id, diff.new_id) else {
            return Ok(Arc::new(IntraLineDiff {
                status: IntraLineStatus::Ok,
                edits: Vec::new(),
            }));
        };
        if diff.patch_type == PatchType::Binary || diff.is_negative() {
            return Ok(Arc::new(IntraLineDiff {
                status: IntraLineStatus::Ok,
                edits: Vec::new(),
            }));
        }
        let key = IntraLineKey {
            project: project.clone(),
            old_blob,
            new_blob,
            whitespace: options.whitespace,
            algorithm: diff.algorithm,
            rebase_edits: diff.rebase_edits.clone(),
        };
        self.intraline.get(&key, &diff.edits)
    }

    /// The auto-merge of a two-parent merge commit.
    pub fn synthesize_auto_merge(
        &self,
        project: &ProjectName,
        merge_commit: &ContentId,
    ) -> Result<Arc<AutoMerge>, CacheError> {
        let key = self
            .auto_merges
            .key(project, *merge_commit, self.config.automerge.save);
        self.auto_merges.get(&key)
    }

    /// Counters of every layer, by layer name.
    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            ("tree_diff", self.tree_diffs.stats()),
            ("git_file_diff", self.git_file_diffs.stats()),
            ("file_diff", self.file_diffs.stats()),
            ("modified_files", self.modified_files.stats()),
            ("diff_summary", self.summaries.stats()),
            ("intraline", self.intraline.stats()),
            ("auto_merge", self.auto_merges.stats()),
        ]
    }

    pub fn tree_diffs(&self) -> &TreeDiffCache {
        &self.tree_diffs
    }

    pub fn git_file_diffs(&self) -> &GitFileDiffCache {
        &self.git_file_diffs
    }

    pub fn file_diffs(&self) -> &FileDiffCache {
        &self.file_diffs
    }

    pub fn modified_files(&self) -> &ModifiedFilesCache {
        &self.modified_files
    }

    pub fn intraline(&self) -> &IntraLineCache {
        &self.intraline
    }

    /// Write pending persistent entries to disk.
    pub fn flush(&self) -> Result<(), CacheError> {
        match &self.store {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    fn read_commit(&self, project: &ProjectName, id: &ContentId) -> Result<Commit, CacheError> {
        let repo = self.repos.open(project)?;
        let commit = self.repos.reader(&*repo).read_commit(id)?;
        Ok(commit)
    }

    fn resolve_base(
        &self,
        project: &ProjectName,
        new_commit: &ContentId,
        new: &Commit,
        parent_num: u32,
    ) -> Result<Base, CacheError> {
        let parents = &new.parents;
        if parent_num > 0 {
            let Some(parent) = parents.get(parent_num as usize - 1) else {
                return Err(CacheError::InvalidKey(format!(
                    "{new_commit} has {} parents, parent {parent_num} requested",
                    parents.len()
                )));
            };
            return Ok(Base::parent(*parent, parent_num));
        }
        match parents.as_slice() {
            [] => Ok(Base {
                old_commit: None,
                comparison: ComparisonType::AgainstRoot,
                files_skipped: false,
            }),
            [only] => Ok(Base::parent(*only, 1)),
            [first, _] => match self.synthesize_auto_merge(project, new_commit) {
                Ok(auto_merge) => Ok(Base {
                    old_commit: Some(auto_merge.commit),
                    comparison: ComparisonType::AgainstAutoMerge,
                    files_skipped: false,
                }),
                Err(err) => {
                    warn!(
                        %project,
                        commit = %new_commit,
                        error = %err,
                        "auto-merge not available, comparing against parent 1"
                    );
                    Ok(Base::parent(*first, 1))
                }
            },
            [first, ..] => {
                debug!(
                    %project,
                    commit = %new_commit,
                    parents = parents.len(),
                    "listing only synthetic files of octopus merge"
                );
                Ok(Base {
                    files_skipped: true,
                    ..Base::parent(*first, 1)
                })
            }
        }
    }

    fn file_key(
        &self,
        project: &ProjectName,
        old_commit: Option<ContentId>,
        new_commit: ContentId,
        path: BString,
        comparison: ComparisonType,
        options: &DiffOptions,
    ) -> FileDiffKey {
        FileDiffKey {
            project: project.clone(),
            old_commit,
            new_commit,
            path,
            comparison,
            rename_score: options.rename_score,
            algorithm: options.algorithm,
            whitespace: options.whitespace,
            use_timeout: true,
        }
    }

    fn list_files(
        &self,
        project: &ProjectName,
        old_commit: Option<ContentId>,
        new_commit: ContentId,
        comparison: ComparisonType,
        options: &DiffOptions,
    ) -> Result<BTreeMap<BString, Arc<FileDiff>>, CacheError> {
        let files = self.modified_files.get(&ModifiedFilesKey {
            project: project.clone(),
            old_commit,
            new_commit,
            comparison,
            rename_score: options.rename_score,
        })?;
        let keys: Vec<FileDiffKey> = files
            .iter()
            .map(|f| {
                self.file_key(
                    project,
                    old_commit,
                    new_commit,
                    f.path().into(),
                    comparison,
                    options,
                )
            })
            .collect();
        self.load_files(&keys)
    }

    /// Load file diffs, recomputing timed out ones with the fallback and
    /// leaving out empty results. The first failure fails the listing.
    fn load_files(
        &self,
        keys: &[FileDiffKey],
    ) -> Result<BTreeMap<BString, Arc<FileDiff>>, CacheError> {
        let mut loaded: HashMap<FileDiffKey, Result<Arc<FileDiff>, CacheError>> =
            self.file_diffs.get_all(keys)?;
        let mut files = BTreeMap::new();
        for key in keys {
            let diff = match loaded.remove(key) {
                Some(Ok(diff)) if diff.is_negative() => self.file_diffs.get_or_fallback(key)?,
                Some(Ok(diff)) => diff,
                Some(Err(err)) => return Err(err),
                None => continue,
            };
            if diff.is_empty() {
                continue;
            }
            files.insert(key.path.clone(), diff);
        }
        Ok(files)
    }
}

struct Base {
    old_commit: Option<ContentId>,
    comparison: ComparisonType,
    files_skipped: bool,
}

impl Base {
    fn parent(parent: ContentId, parent_num: u32) -> Self {
        Self {
            old_commit: Some(parent),
            comparison: ComparisonType::AgainstParent(parent_num),
            files_skipped: false,
        }
    }
}
