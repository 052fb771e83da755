//! Cache keys of the layers.
//!
//! Two keys equal in every field always describe the same result, so keys
//! hold only content ids and comparison parameters, never ref names.

use bstr::BString;
use patch_diff::{DiffAlgorithm, Edit, Whitespace};
use patch_hash::ContentId;
use patch_merge::MergeStrategyKind;
use patch_object::ProjectName;
use serde::{Deserialize, Serialize};

use crate::comparison::ComparisonType;
use crate::CacheError;

/// Tree pair of the git tree diff layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeDiffKey {
    pub project: ProjectName,
    /// `None` is the empty tree.
    pub old_tree: Option<ContentId>,
    pub new_tree: ContentId,
    pub rename_score: Option<u8>,
}

/// One path between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitFileDiffKey {
    pub project: ProjectName,
    pub old_tree: Option<ContentId>,
    pub new_tree: ContentId,
    /// The new path, or the old path of a deleted file.
    pub path: BString,
    pub rename_score: Option<u8>,
    pub algorithm: DiffAlgorithm,
    pub whitespace: Whitespace,
    pub use_timeout: bool,
}

impl GitFileDiffKey {
    pub fn tree_diff_key(&self) -> TreeDiffKey {
        TreeDiffKey {
            project: self.project.clone(),
            old_tree: self.old_tree,
            new_tree: self.new_tree,
            rename_score: self.rename_score,
        }
    }

    /// The key recomputing a timed-out diff without a budget.
    pub fn fallback(&self) -> Self {
        Self {
            algorithm: DiffAlgorithm::HistogramNoFallback,
            use_timeout: false,
            ..self.clone()
        }
    }
}

/// One path between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDiffKey {
    pub project: ProjectName,
    /// `None` compares against nothing (a root commit).
    pub old_commit: Option<ContentId>,
    pub new_commit: ContentId,
    pub path: BString,
    pub comparison: ComparisonType,
    pub rename_score: Option<u8>,
    pub algorithm: DiffAlgorithm,
    pub whitespace: Whitespace,
    pub use_timeout: bool,
}

impl FileDiffKey {
    pub fn fallback(&self) -> Self {
        Self {
            algorithm: DiffAlgorithm::HistogramNoFallback,
            use_timeout: false,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.path.is_empty() {
            return Err(CacheError::InvalidKey("file path is empty".into()));
        }
        validate_comparison(self.old_commit.as_ref(), self.comparison)
    }
}

/// Changed paths between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifiedFilesKey {
    pub project: ProjectName,
    pub old_commit: Option<ContentId>,
    pub new_commit: ContentId,
    pub comparison: ComparisonType,
    pub rename_score: Option<u8>,
}

impl ModifiedFilesKey {
    pub fn validate(&self) -> Result<(), CacheError> {
        validate_comparison(self.old_commit.as_ref(), self.comparison)
    }
}

/// Summary of the changes between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffSummaryKey {
    pub project: ProjectName,
    pub old_commit: Option<ContentId>,
    pub new_commit: ContentId,
    pub comparison: ComparisonType,
    pub whitespace: Whitespace,
}

impl DiffSummaryKey {
    pub fn validate(&self) -> Result<(), CacheError> {
        validate_comparison(self.old_commit.as_ref(), self.comparison)
    }
}

/// Refinement of the replace edits between two blobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntraLineKey {
    pub project: ProjectName,
    pub old_blob: ContentId,
    pub new_blob: ContentId,
    pub whitespace: Whitespace,
    pub algorithm: DiffAlgorithm,
    /// Edits never joined with their neighbours.
    pub rebase_edits: Vec<Edit>,
}

/// Auto-merge of one merge commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutoMergeKey {
    pub project: ProjectName,
    pub merge_commit: ContentId,
    pub strategy: MergeStrategyKind,
    pub save: bool,
}

fn validate_comparison(
    old: Option<&ContentId>,
    comparison: ComparisonType,
) -> Result<(), CacheError> {
    match (old, comparison) {
        (_, ComparisonType::AgainstParent(0)) => {
            Err(CacheError::InvalidKey("parent numbers start at 1".into()))
        }
        (Some(_), ComparisonType::AgainstRoot) => Err(CacheError::InvalidKey(
            "a root comparison has no old commit".into(),
        )),
        (None, ComparisonType::AgainstRoot) => Ok(()),
        (None, _) => Err(CacheError::InvalidKey("old commit missing".into())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_key(path: &str, comparison: ComparisonType, old: Option<ContentId>) -> FileDiffKey {
        FileDiffKey {
            project: "p".into(),
            old_commit: old,
            new_commit: ContentId::NULL,
            path: path.into(),
            comparison,
            rename_score: Some(60),
            algorithm: DiffAlgorithm::Histogram,
            whitespace: Whitespace::IgnoreNone,
            use_timeout: true,
        }
    }

    #[test]
    fn fallback_key_differs_only_in_algorithm_and_budget() {
        let key = file_key("a", ComparisonType::AgainstParent(1), Some(ContentId::EMPTY_TREE));
        let fallback = key.fallback();
        assert_ne!(key, fallback);
        assert_eq!(fallback.algorithm, DiffAlgorithm::HistogramNoFallback);
        assert!(!fallback.use_timeout);
        assert_eq!(fallback.path, key.path);
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let old = Some(ContentId::EMPTY_TREE);
        assert!(file_key("", ComparisonType::AgainstParent(1), old).validate().is_err());
        assert!(file_key("a", ComparisonType::AgainstParent(0), old).validate().is_err());
        assert!(file_key("a", ComparisonType::AgainstRoot, old).validate().is_err());
        assert!(file_key("a", ComparisonType::AgainstOtherSnapshot, None).validate().is_err());
        assert!(file_key("a", ComparisonType::AgainstRoot, None).validate().is_ok());
        assert!(file_key("a", ComparisonType::AgainstAutoMerge, old).validate().is_ok());
    }
}
