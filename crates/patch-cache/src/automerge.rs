//! Auto-merge synthesis: the tree a merge commit's two parents merge to,
//! used as the old side when a merge commit is diffed.
//!
//! A synthesis moves through `not_started -> merging -> resolved |
//! conflicted -> committed`. Conflicted paths are resolved by a fixed
//! policy rather than by a person:
//!
//! * content merged with conflict markers is taken as is,
//! * a single remaining stage is taken as is,
//! * two stages (a delete/modify conflict) resolve to the higher stage,
//! * three stages without a content merge resolve to the base stage. This
//!   shows the base, not a true resolution.
//!
//! Results are written to the repository and referenced from
//! `refs/cache-automerge/`, or kept in the transient overlay when saving is
//! off. A partially built tree is never exposed: every failure after the
//! merge commit has been read surfaces as [`CacheError::MergeUnavailable`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bstr::BString;
use patch_hash::ContentId;
use patch_merge::{Conflict, MergeOptions, MergeStrategy, TreeMerge};
use patch_object::flat::{write_flat_tree, FlatEntry};
use patch_object::overlay::OverlayInserter;
use patch_object::{Commit, Object, ObjectInserter, ObjectReader, ProjectName, Repository};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LayerConfig;
use crate::keys::AutoMergeKey;
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::CacheError;

const NAME: &str = "auto_merge";
const VERSION: u32 = 1;

const REF_PREFIX: &str = "refs/cache-automerge/";

/// A synthesized auto-merge commit and its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutoMerge {
    pub commit: ContentId,
    pub tree: ContentId,
}

impl Weigh for AutoMerge {
    fn weight(&self) -> u64 {
        64
    }
}

/// Ref under which the auto-merge of `merge_commit` is saved.
pub fn auto_merge_ref(merge_commit: &ContentId) -> String {
    let hex = merge_commit.to_hex();
    format!("{REF_PREFIX}{}/{}", &hex[..2], &hex[2..])
}

/// Merges the parents of merge commits.
pub struct AutoMergeSynthesizer {
    repos: Arc<Repositories>,
    strategy: Arc<dyn MergeStrategy>,
    options: MergeOptions,
}

impl AutoMergeSynthesizer {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        strategy: Arc<dyn MergeStrategy>,
        options: MergeOptions,
    ) -> Self {
        Self {
            repos,
            strategy,
            options,
        }
    }

    pub fn strategy(&self) -> &Arc<dyn MergeStrategy> {
        &self.strategy
    }

    /// Synthesize the auto-merge of `merge_commit`, or return the saved one.
    pub fn synthesize(
        &self,
        project: &ProjectName,
        merge_commit: &ContentId,
        save: bool,
    ) -> Result<AutoMerge, CacheError> {
        let repo = self.repos.open(project)?;
        let reader = self.repos.reader(&*repo);
        let ref_name = auto_merge_ref(merge_commit);
        if let Some(existing) = repo.find_ref(&ref_name)? {
            if let Ok(commit) = reader.read_commit(&existing) {
                debug!(%project, merge = %merge_commit, "reusing saved auto-merge");
                return Ok(AutoMerge {
                    commit: existing,
                    tree: commit.tree,
                });
            }
        }

        let merge = reader.read_commit(merge_commit)?;
        let [ours, theirs] = merge.parents.as_slice() else {
            return Err(CacheError::MergeUnavailable(format!(
                "{merge_commit} has {} parents, an auto-merge needs 2",
                merge.parents.len()
            )));
        };
        debug!(
            %project,
            merge = %merge_commit,
            state = "merging",
            strategy = %self.strategy.kind()
        );
        let result = self
            .strategy
            .merge(&reader, ours, theirs, &self.options)
            .map_err(|e| CacheError::MergeUnavailable(e.to_string()))?;
        let state = if result.is_clean() { "resolved" } else { "conflicted" };
        debug!(%project, merge = %merge_commit, state, conflicts = result.conflicts.len());

        let auto_merge = self
            .commit(&*repo, merge_commit, &merge, result, save)
            .map_err(|e| CacheError::MergeUnavailable(e.to_string()))?;
        if save {
            repo.update_ref(&ref_name, auto_merge.commit)
                .map_err(|e| CacheError::MergeUnavailable(e.to_string()))?;
        }
        debug!(
            %project,
            merge = %merge_commit,
            state = "committed",
            commit = %auto_merge.commit,
            saved = save
        );
        Ok(auto_merge)
    }

    fn commit(
        &self,
        repo: &dyn Repository,
        merge_commit: &ContentId,
        merge: &Commit,
        result: TreeMerge,
        save: bool,
    ) -> Result<AutoMerge, patch_object::StoreError> {
        let entries = resolve(result.entries, &result.conflicts);
        let mut inserter: Box<dyn ObjectInserter + '_> = if save {
            repo.inserter()
        } else {
            Box::new(OverlayInserter::new(Arc::clone(self.repos.overlay())))
        };
        for object in result.objects {
            inserter.insert(object)?;
        }
        let tree = write_flat_tree(&mut *inserter, &entries)?;
        let commit = inserter.insert(Object::Commit(Commit {
            tree,
            parents: merge.parents.clone(),
            author: merge.author.clone(),
            committer: merge.committer.clone(),
            message: BString::from(format!("Auto-merge of {}\n", merge_commit.to_hex())),
        }))?;
        inserter.flush()?;
        Ok(AutoMerge { commit, tree })
    }
}

/// Resolved entries plus the policy choice for every conflicted path.
fn resolve(
    mut entries: BTreeMap<BString, FlatEntry>,
    conflicts: &BTreeMap<BString, Conflict>,
) -> BTreeMap<BString, FlatEntry> {
    for (path, conflict) in conflicts {
        if let Some(entry) = resolve_conflict(conflict) {
            entries.insert(path.clone(), entry);
        }
    }
    entries
}

fn resolve_conflict(conflict: &Conflict) -> Option<FlatEntry> {
    if conflict.merged.is_some() {
        return conflict.merged;
    }
    let stages = conflict.stages();
    match stages.len() {
        3 => stages.first().copied(),
        _ => stages.last().copied(),
    }
}

/// Memoizes auto-merges per merge commit.
pub struct AutoMergeCache {
    cache: LoadingCache<AutoMergeKey, AutoMerge>,
    synthesizer: AutoMergeSynthesizer,
}

impl AutoMergeCache {
    pub(crate) fn new(
        synthesizer: AutoMergeSynthesizer,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            synthesizer,
        })
    }

    /// The key of `merge_commit` under this cache's strategy.
    pub fn key(&self, project: &ProjectName, merge_commit: ContentId, save: bool) -> AutoMergeKey {
        AutoMergeKey {
            project: project.clone(),
            merge_commit,
            strategy: self.synthesizer.strategy().kind(),
            save,
        }
    }

    pub fn get(&self, key: &AutoMergeKey) -> Result<Arc<AutoMerge>, CacheError> {
        self.cache.get(key, |k| self.compute(k))
    }

    pub fn get_all(
        &self,
        keys: &[AutoMergeKey],
    ) -> HashMap<AutoMergeKey, Result<Arc<AutoMerge>, CacheError>> {
        self.cache.get_all(keys, |k| self.compute(k))
    }

    pub fn invalidate(&self, key: &AutoMergeKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &AutoMergeKey) -> Result<AutoMerge, CacheError> {
        if key.strategy != self.synthesizer.strategy().kind() {
            return Err(CacheError::InvalidKey(format!(
                "auto-merges are synthesized with the {} strategy, not {}",
                self.synthesizer.strategy().kind(),
                key.strategy
            )));
        }
        self.synthesizer
            .synthesize(&key.project, &key.merge_commit, key.save)
    }
}
