//! Per-request access to project repositories.

use std::sync::Arc;

use patch_object::cache::CachingReader;
use patch_object::overlay::{ObjectOverlay, OverlayReader};
use patch_object::{ProjectName, Repository, RepositoryManager};

use crate::CacheError;

/// Parsed trees and commits kept per request.
const READER_CACHE_OBJECTS: usize = 256;

/// Opens repositories and layers the transient object overlay above their
/// readers, so unsaved auto-merges stay readable.
pub(crate) struct Repositories {
    manager: Arc<dyn RepositoryManager>,
    overlay: Arc<ObjectOverlay>,
}

impl Repositories {
    pub(crate) fn new(manager: Arc<dyn RepositoryManager>) -> Self {
        Self {
            manager,
            overlay: Arc::new(ObjectOverlay::new()),
        }
    }

    pub(crate) fn open(&self, project: &ProjectName) -> Result<Arc<dyn Repository>, CacheError> {
        Ok(self.manager.open(project)?)
    }

    /// A reader scoped to one request. Trees and commits it parses are
    /// remembered until it is dropped.
    pub(crate) fn reader<'r>(&self, repo: &'r dyn Repository) -> CachingReader<OverlayReader<'r>> {
        CachingReader::new(
            OverlayReader::new(repo.reader(), Arc::clone(&self.overlay)),
            READER_CACHE_OBJECTS,
        )
    }

    pub(crate) fn overlay(&self) -> &Arc<ObjectOverlay> {
        &self.overlay
    }
}
