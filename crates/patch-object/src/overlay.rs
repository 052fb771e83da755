//! Process-local object overlay.
//!
//! Objects that must be readable but never persisted (transient auto-merge
//! results) live here. An [`OverlayReader`] consults the overlay before the
//! repository reader it wraps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use patch_hash::ContentId;

use crate::store::{ObjectInserter, ObjectReader};
use crate::{Object, StoreError};

/// Shared in-memory object set.
#[derive(Debug, Default)]
pub struct ObjectOverlay {
    objects: RwLock<HashMap<ContentId, Object>>,
}

impl ObjectOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ContentId) -> Option<Object> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn insert(&self, object: Object) -> ContentId {
        let id = object.compute_id();
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_insert(object);
        id
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reader that resolves ids in the overlay first, then in the base reader.
pub struct OverlayReader<'a> {
    base: Box<dyn ObjectReader + 'a>,
    overlay: Arc<ObjectOverlay>,
}

impl<'a> OverlayReader<'a> {
    pub fn new(base: Box<dyn ObjectReader + 'a>, overlay: Arc<ObjectOverlay>) -> Self {
        Self { base, overlay }
    }
}

impl ObjectReader for OverlayReader<'_> {
    fn read_object(&self, id: &ContentId) -> Result<Object, StoreError> {
        match self.overlay.get(id) {
            Some(object) => Ok(object),
            None => self.base.read_object(id),
        }
    }

    fn object_size(&self, id: &ContentId) -> Result<u64, StoreError> {
        match self.overlay.get(id) {
            Some(object) => Ok(object.size()),
            None => self.base.object_size(id),
        }
    }
}

/// Inserter writing into an overlay. `flush` is a no-op; objects are
/// visible immediately.
pub struct OverlayInserter {
    overlay: Arc<ObjectOverlay>,
}

impl OverlayInserter {
    pub fn new(overlay: Arc<ObjectOverlay>) -> Self {
        Self { overlay }
    }
}

impl ObjectInserter for OverlayInserter {
    fn insert(&mut self, object: Object) -> Result<ContentId, StoreError> {
        Ok(self.overlay.insert(object))
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
