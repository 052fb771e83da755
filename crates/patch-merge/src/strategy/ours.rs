//! "Ours" and "theirs" strategies: take one parent's tree unchanged.

use patch_hash::ContentId;
use patch_object::ObjectReader;

use crate::strategy::MergeStrategy;
use crate::{MergeError, MergeOptions, MergeStrategyKind, TreeMerge};

/// Always take the first parent's tree.
pub struct OursStrategy;

impl MergeStrategy for OursStrategy {
    fn kind(&self) -> MergeStrategyKind {
        MergeStrategyKind::Ours
    }

    fn merge(
        &self,
        reader: &dyn ObjectReader,
        ours: &ContentId,
        _theirs: &ContentId,
        _options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        let tree = reader.read_commit(ours)?.tree;
        Ok(TreeMerge::from_tree(reader, &tree)?)
    }
}

/// Always take the second parent's tree.
pub struct TheirsStrategy;

impl MergeStrategy for TheirsStrategy {
    fn kind(&self) -> MergeStrategyKind {
        MergeStrategyKind::Theirs
    }

    fn merge(
        &self,
        reader: &dyn ObjectReader,
        _ours: &ContentId,
        theirs: &ContentId,
        _options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        let tree = reader.read_commit(theirs)?.tree;
        Ok(TreeMerge::from_tree(reader, &tree)?)
    }
}
