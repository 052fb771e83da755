//! Intra-line layer: character-level refinement of a file's replace edits.
//!
//! The line edits are a function of the blobs, the whitespace mode and the
//! algorithm, so the caller passes the edits it already holds. Failed
//! refinements are cached like successful ones; their status tells them
//! apart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use patch_diff::{Edit, IntraLineDiff, IntraLineDiffEngine, IntraLineStatus};
use patch_object::ObjectReader;
use tracing::warn;

use crate::config::LayerConfig;
use crate::keys::IntraLineKey;
use crate::loading::{CacheStats, LoadingCache, Weigh};
use crate::persist::PersistentStore;
use crate::source::Repositories;
use crate::CacheError;

const NAME: &str = "intraline";
const VERSION: u32 = 1;

impl Weigh for IntraLineDiff {
    fn weight(&self) -> u64 {
        let edits: usize = self.edits.iter().map(|e| 32 + e.sub_edits.len() * 32).sum();
        (32 + edits) as u64
    }
}

pub struct IntraLineCache {
    cache: LoadingCache<IntraLineKey, IntraLineDiff>,
    repos: Arc<Repositories>,
    engine: IntraLineDiffEngine,
    large_object_threshold: u64,
}

impl IntraLineCache {
    pub(crate) fn new(
        repos: Arc<Repositories>,
        engine: IntraLineDiffEngine,
        large_object_threshold: u64,
        config: &LayerConfig,
        store: Option<&PersistentStore>,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            cache: LoadingCache::for_layer(NAME, VERSION, config, store)?,
            repos,
            engine,
            large_object_threshold,
        })
    }

    /// Refine `edits`, the line edits between the key's blobs.
    pub fn get(
        &self,
        key: &IntraLineKey,
        edits: &[Edit],
    ) -> Result<Arc<IntraLineDiff>, CacheError> {
        self.cache.get(key, |k| self.compute(k, edits))
    }

    pub fn get_all(
        &self,
        requests: &[(IntraLineKey, Vec<Edit>)],
    ) -> HashMap<IntraLineKey, Result<Arc<IntraLineDiff>, CacheError>> {
        let edits: HashMap<&IntraLineKey, &[Edit]> =
            requests.iter().map(|(k, e)| (k, e.as_slice())).collect();
        let keys: Vec<IntraLineKey> = requests.iter().map(|(k, _)| k.clone()).collect();
        self.cache.get_all(&keys, |k| {
            self.compute(k, edits.get(k).copied().unwrap_or_default())
        })
    }

    pub fn invalidate(&self, key: &IntraLineKey) {
        self.cache.invalidate(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn compute(&self, key: &IntraLineKey, edits: &[Edit]) -> Result<IntraLineDiff, CacheError> {
        let repo = self.repos.open(&key.project)?;
        let reader = self.repos.reader(&*repo);
        let old = reader.read_blob(&key.old_blob, self.large_object_threshold)?;
        let new = reader.read_blob(&key.new_blob, self.large_object_threshold)?;
        let rebase: HashSet<Edit> = key.rebase_edits.iter().copied().collect();

        let diff = self
            .engine
            .refine(Arc::new(old), Arc::new(new), edits.to_vec(), rebase);
        if diff.status == IntraLineStatus::Timeout {
            warn!(
                project = %key.project,
                old_blob = %key.old_blob,
                new_blob = %key.new_blob,
                timeout_ms = self.engine.timeout().as_millis() as u64,
                "{} ms timeout reached for intra-line diff",
                self.engine.timeout().as_millis()
            );
        }
        Ok(diff)
    }
}
