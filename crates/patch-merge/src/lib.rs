//! Merge engine for auto-merge synthesis.
//!
//! Provides a line-based three-way content merge with conflict markers, a
//! path-level three-way tree merge that records unresolved paths by stage,
//! and pluggable strategies (recursive, resolve, ours, theirs) that merge the
//! two parents of a merge commit.

pub mod content;
pub mod strategy;
pub mod tree;

use std::fmt;
use std::str::FromStr;

use patch_diff::DiffAlgorithm;
use patch_object::StoreError;
use serde::{Deserialize, Serialize};

pub use content::{merge_content, MergeLabels};
pub use strategy::{strategy_for, MergeStrategy};
pub use tree::{Conflict, TreeMerge};

/// Options for merge operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Diff algorithm for content merge.
    pub algorithm: DiffAlgorithm,
    /// Blobs larger than this are never content-merged and conflict as a
    /// whole.
    pub max_blob_size: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            algorithm: DiffAlgorithm::Histogram,
            max_blob_size: 1024 * 1024,
        }
    }
}

/// Available merge strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategyKind {
    /// Three-way merge over a virtual base built from all merge bases.
    #[default]
    Recursive,
    /// Three-way merge over the first merge base only.
    Resolve,
    /// Take the first parent's tree.
    Ours,
    /// Take the second parent's tree.
    Theirs,
}

impl MergeStrategyKind {
    /// Parse a strategy name. Accepted values: "recursive", "resolve",
    /// "ours", "theirs".
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "recursive" => Some(Self::Recursive),
            "resolve" => Some(Self::Resolve),
            "ours" => Some(Self::Ours),
            "theirs" => Some(Self::Theirs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Recursive => "recursive",
            Self::Resolve => "resolve",
            Self::Ours => "ours",
            Self::Theirs => "theirs",
        }
    }
}

impl fmt::Display for MergeStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MergeStrategyKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MergeError::UnknownStrategy(s.to_owned()))
    }
}

/// Result of a three-way content merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentMergeResult {
    /// Clean merge, no conflicts.
    Clean(Vec<u8>),
    /// Conflict with markers in the content.
    Conflict {
        /// Merged content including conflict markers.
        content: Vec<u8>,
        /// Number of conflict regions.
        conflict_count: usize,
    },
}

impl ContentMergeResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    /// The merged content (with or without conflict markers).
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Clean(data) => data,
            Self::Conflict { content, .. } => content,
        }
    }

    pub fn into_content(self) -> Vec<u8> {
        match self {
            Self::Clean(data) => data,
            Self::Conflict { content, .. } => content,
        }
    }
}

/// Error types for merge operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MergeError {
    #[error("unknown merge strategy: {0}")]
    UnknownStrategy(String),

    #[error("a merge needs exactly two commits, got {0}")]
    UnsupportedParentCount(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = MergeOptions::default();
        assert_eq!(opts.algorithm, DiffAlgorithm::Histogram);
        assert_eq!(opts.max_blob_size, 1024 * 1024);
    }

    #[test]
    fn strategy_names_round_trip() {
        for kind in [
            MergeStrategyKind::Recursive,
            MergeStrategyKind::Resolve,
            MergeStrategyKind::Ours,
            MergeStrategyKind::Theirs,
        ] {
            assert_eq!(kind.name().parse::<MergeStrategyKind>().unwrap(), kind);
        }
        assert!(matches!(
            "octopus".parse::<MergeStrategyKind>(),
            Err(MergeError::UnknownStrategy(name)) if name == "octopus"
        ));
    }

    #[test]
    fn content_merge_result_accessors() {
        let clean = ContentMergeResult::Clean(b"hello world\n".to_vec());
        assert!(clean.is_clean());
        assert_eq!(clean.content(), b"hello world\n");

        let conflict = ContentMergeResult::Conflict {
            content: b"<<<<<<< ours\nfoo\n=======\nbar\n>>>>>>> theirs\n".to_vec(),
            conflict_count: 1,
        };
        assert!(!conflict.is_clean());
        assert!(conflict.into_content().starts_with(b"<<<<<<<"));
    }
}
