//! Diff engines for the patch-set cache.
//!
//! Provides Myers and histogram line diffs over interned lines, the per-file
//! diff with a compute budget, git-style file headers, tree diffs with rename
//! detection, word-level refinement of replaced regions, and the position
//! mapping used to tell which edits between two rebased patch sets were
//! introduced by the rebase.

pub mod algorithm;
pub mod edit;
mod error;
pub mod file;
pub mod header;
pub mod intraline;
pub mod position;
pub mod rebase;
pub mod text;
pub mod tree;

pub use algorithm::{CancelToken, Cancelled, DiffAlgorithm};
pub use edit::{Edit, EditKind, ReplaceEdit};
pub use error::DiffError;
pub use file::{
    FileDiffEngine, FileDiffInput, FileDiffOptions, FileSide, GitFileDiff, PatchType,
};
pub use intraline::{IntraLineDiff, IntraLineDiffEngine, IntraLineHeuristics, IntraLineStatus};
pub use rebase::{ContextAwareEdit, EditTransformer, FileEdits, RebaseEdits};
pub use text::Whitespace;
pub use tree::{ModifiedFile, TreeDiffEngine};
