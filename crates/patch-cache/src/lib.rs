//! Layered diff caches for code review.
//!
//! Every layer is a loading cache keyed by content ids and comparison
//! options, so equal keys always describe equal results and concurrent
//! requests for one key share a single computation:
//!
//! * tree diffs list the paths changed between two trees,
//! * git file diffs hold the line edits of one path between two trees,
//! * file diffs lift those to commits and mark the edits a rebase brought in,
//! * modified files list a change's paths with its synthetic files,
//! * diff summaries count a change's lines,
//! * intra-line diffs refine replaced lines character by character,
//! * auto-merges provide the base a merge commit is compared against.
//!
//! [`DiffOperations`] wires the layers together over a
//! [`RepositoryManager`](patch_object::RepositoryManager). Layers may be
//! written through to a sled database so that a restart starts warm.

pub mod automerge;
pub mod comparison;
pub mod config;
mod error;
pub mod file_diff;
pub mod git_file_diff;
pub mod intraline;
pub mod keys;
pub mod loading;
pub mod modified_files;
mod operations;
pub mod persist;
mod source;
pub mod summary;
pub mod tree_diff;

pub use automerge::AutoMerge;
pub use comparison::ComparisonType;
pub use config::{DiffConfig, LayerConfig};
pub use error::CacheError;
pub use file_diff::FileDiff;
pub use loading::CacheStats;
pub use operations::{DiffOperations, DiffOptions, ModifiedFilesListing};
pub use summary::DiffSummary;
