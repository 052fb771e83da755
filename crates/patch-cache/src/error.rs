use std::time::Duration;

use patch_diff::DiffError;
use patch_hash::ContentId;
use patch_merge::MergeError;
use patch_object::StoreError;

/// Errors surfaced by the cache layers and the operations facade.
///
/// Errors are never memoized; they are `Clone` so that every caller waiting
/// on a failed computation receives the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("diff not available: {0}")]
    Unavailable(String),

    #[error("object {id} is too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { id: ContentId, size: u64, limit: u64 },

    #[error("diff computation exceeded {0:?}")]
    Timeout(Duration),

    #[error("auto-merge not available: {0}")]
    MergeUnavailable(String),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("persistent cache failure: {0}")]
    Persistence(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker pool failure: {0}")]
    Worker(String),
}

impl CacheError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TooLarge { id, size, limit } => Self::TooLarge { id, size, limit },
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<DiffError> for CacheError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::Timeout(budget) => Self::Timeout(budget),
            DiffError::Worker(msg) => Self::Worker(msg),
            DiffError::Store(store) => store.into(),
        }
    }
}

impl From<MergeError> for CacheError {
    fn from(err: MergeError) -> Self {
        Self::MergeUnavailable(err.to_string())
    }
}

impl From<sled::Error> for CacheError {
    fn from(err: sled::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CacheError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<regex::Error> for CacheError {
    fn from(err: regex::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let id = ContentId::EMPTY_TREE;
        assert!(CacheError::from(StoreError::NotFound(id)).is_unavailable());
        assert!(CacheError::from(StoreError::RepositoryNotFound("p".into())).is_unavailable());
        let too_large = CacheError::from(StoreError::TooLarge {
            id,
            size: 10,
            limit: 5,
        });
        assert!(matches!(too_large, CacheError::TooLarge { size: 10, limit: 5, .. }));
    }

    #[test]
    fn diff_errors_keep_their_kind() {
        let budget = Duration::from_millis(5);
        assert!(matches!(
            CacheError::from(DiffError::Timeout(budget)),
            CacheError::Timeout(d) if d == budget
        ));
        assert!(CacheError::from(DiffError::Store(StoreError::NotFound(ContentId::NULL)))
            .is_unavailable());
    }

    #[test]
    fn merge_errors_become_merge_unavailable() {
        let err = CacheError::from(MergeError::UnsupportedParentCount(3));
        assert!(matches!(err, CacheError::MergeUnavailable(msg) if msg.contains('3')));
    }
}
