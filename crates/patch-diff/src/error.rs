use std::time::Duration;

use patch_object::StoreError;

/// Errors from diff computation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiffError {
    #[error("diff did not finish within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("diff worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DiffError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
