//! Git tree diff layer: changed paths between two trees.

use std::collections::HashMap;
use std::sync::Arc;

use patch_diff::{ModifiedFile, TreeDiffEngine};

use crate::config::LayerConfig;
use crate::keys::TreeDiffKey;
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::CacheError;

const NAME: &str = "tree_diff";
const VERSION: u32 = 1;

pub struct TreeDiffCache {
    cache: LoadingCache<TreeDiffKey, Vec<ModifiedFile>>,
    repos: Arc<Repositories>,
    engine: TreeDiffEngine,
}

impl TreeDiffCache {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            repos,
            engine: TreeDiffEngine::default(),
        })
    }

    pub fn get(&self, key: &TreeDiffKey) -> Result<Arc<Vec<ModifiedFile>>, CacheError> {
        self.cache.get(key, |k| self.compute(k))
    }

    pub fn get_all(
        &self,
        keys: &[TreeDiffKey],
    ) -> HashMap<TreeDiffKey, Result<Arc<Vec<ModifiedFile>>, CacheError>> {
        self.cache.get_all(keys, |k| self.compute(k))
    }

    pub fn invalidate(&self, key: &TreeDiffKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &TreeDiffKey) -> Result<Vec<ModifiedFile>, CacheError> {
        let repo = self.repos.open(&key.project)?;
        let reader = self.repos.reader(&*repo);
        Ok(self.engine.diff_trees(
            &reader,
            key.old_tree.as_ref(),
            &key.new_tree,
            key.rename_score,
        )?)
    }
}

impl Weigh for ModifiedFile {
    fn weight(&self) -> u64 {
        let paths = self.old_path.as_ref().map_or(0, |p| p.len())
            + self.new_path.as_ref().map_or(0, |p| p.len());
        96 + paths as u64
    }
}
