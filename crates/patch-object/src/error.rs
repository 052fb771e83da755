use patch_hash::{ContentId, HashError};

use crate::ObjectKind;

/// Errors surfaced by object-store readers, inserters and repositories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("object not found: {0}")]
    NotFound(ContentId),

    #[error("object {id} is a {actual}, expected {expected}")]
    UnexpectedKind {
        id: ContentId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("object {id} is too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { id: ContentId, size: u64, limit: u64 },

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("ref {name} changed concurrently")]
    RefConflict { name: String },

    #[error("store backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::RepositoryNotFound(_))
    }
}
