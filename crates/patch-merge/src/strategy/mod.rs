//! Pluggable merge strategies.
//!
//! Provides the [`MergeStrategy`] trait and implementations for recursive
//! (default), resolve, ours, and theirs strategies.

pub mod ours;
pub mod resolve;

use std::sync::Arc;

use patch_hash::ContentId;
use patch_object::ObjectReader;

use crate::{MergeError, MergeOptions, MergeStrategyKind, TreeMerge};

/// Trait for merge strategies.
///
/// Each strategy takes the two parent commits of a merge and produces a
/// [`TreeMerge`], which may contain unresolved paths.
pub trait MergeStrategy: Send + Sync {
    fn kind(&self) -> MergeStrategyKind;

    /// Merge commit `theirs` into commit `ours`.
    fn merge(
        &self,
        reader: &dyn ObjectReader,
        ours: &ContentId,
        theirs: &ContentId,
        options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError>;
}

/// The built-in strategy of the given kind.
pub fn strategy_for(kind: MergeStrategyKind) -> Arc<dyn MergeStrategy> {
    match kind {
        MergeStrategyKind::Recursive => Arc::new(resolve::RecursiveStrategy),
        MergeStrategyKind::Resolve => Arc::new(resolve::ResolveStrategy),
        MergeStrategyKind::Ours => Arc::new(ours::OursStrategy),
        MergeStrategyKind::Theirs => Arc::new(ours::TheirsStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_kind() {
        for kind in [
            MergeStrategyKind::Recursive,
            MergeStrategyKind::Resolve,
            MergeStrategyKind::Ours,
            MergeStrategyKind::Theirs,
        ] {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }
}
