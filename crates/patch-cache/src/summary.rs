//! Diff summary layer: changed paths and line counts between two commits.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bstr::BString;
use patch_diff::DiffAlgorithm;
use serde::{Deserialize, Serialize};

use crate::comparison::is_magic_path;
use crate::config::LayerConfig;
use crate::file_diff::FileDiffCache;
use crate::keys::{DiffSummaryKey, FileDiffKey, ModifiedFilesKey};
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::modified_files::ModifiedFilesCache;
use crate::persist::PersistentStore;
use crate::CacheError;

const NAME: &str = "diff_summary";
const VERSION: u32 = 2;

/// Real files changed between two commits. Lines attributed to a rebase
/// are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Sorted; a renamed file contributes both of its paths.
    pub paths: Vec<BString>,
    pub insertions: usize,
    pub deletions: usize,
}

impl Weigh for DiffSummary {
    fn weight(&self) -> u64 {
        let paths: usize = self.paths.iter().map(|p| p.len() + 24).sum();
        (48 + paths) as u64
    }
}

pub struct DiffSummaryCache {
    cache: LoadingCache<DiffSummaryKey, DiffSummary>,
    modified_files: Arc<ModifiedFilesCache>,
    file_diffs: Arc<FileDiffCache>,
    rename_score: Option<u8>,
    algorithm: DiffAlgorithm,
}

impl DiffSummaryCache {
    pub(crate) fn new(
        modified_files: Arc<ModifiedFilesCache>,
        file_diffs: Arc<FileDiffCache>,
        rename_score: Option<u8>,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            modified_files,
            file_diffs,
            rename_score,
            algorithm: DiffAlgorithm::default(),
        })
    }

    pub fn get(&self, key: &DiffSummaryKey) -> Result<Arc<DiffSummary>, CacheError> {
        key.validate()?;
        self.cache.get(key, |k| self.compute(k))
    }

    pub fn get_all(
        &self,
        keys: &[DiffSummaryKey],
    ) -> Result<HashMap<DiffSummaryKey, Result<Arc<DiffSummary>, CacheError>>, CacheError> {
        for key in keys {
            key.validate()?;
        }
        Ok(self.cache.get_all(keys, |k| self.compute(k)))
    }

    pub fn invalidate(&self, key: &DiffSummaryKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &DiffSummaryKey) -> Result<DiffSummary, CacheError> {
        let comparison = key.comparison;
        let files = self.modified_files.get(&ModifiedFilesKey {
            project: key.project.clone(),
            old_commit: key.old_commit,
            new_commit: key.new_commit,
            comparison,
            rename_score: self.rename_score,
        })?;

        let mut paths = BTreeSet::new();
        let mut summary = DiffSummary::default();
        for file in files.iter().filter(|f| !is_magic_path(f.path())) {
            let diff = self.file_diffs.get_or_fallback(&FileDiffKey {
                project: key.project.clone(),
                old_commit: key.old_commit,
                new_commit: key.new_commit,
                path: file.path().into(),
                comparison,
                rename_score: self.rename_score,
                algorithm: self.algorithm,
                whitespace: key.whitespace,
                use_timeout: true,
            })?;
            if diff.is_empty() {
                continue;
            }
            paths.extend(diff.old_path.iter().cloned());
            paths.extend(diff.new_path.iter().cloned());
            summary.insertions += diff.insertions();
            summary.deletions += diff.deletions();
        }
        summary.paths = paths.into_iter().collect();
        Ok(summary)
    }
}
