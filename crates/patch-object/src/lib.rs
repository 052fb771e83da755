//! Object model and object-store interfaces.
//!
//! Provides the blob/tree/commit model addressed by [`ContentId`], the
//! [`RepositoryManager`] / [`Repository`] / [`ObjectReader`] contract the diff
//! cache consumes, tree walking with rename detection, commit ancestry, and
//! an in-memory store implementation.

pub mod ancestry;
pub mod cache;
mod commit;
mod error;
pub mod flat;
pub mod memory;
mod object;
pub mod overlay;
pub mod rename;
pub mod store;
mod tree;
pub mod walk;

pub use commit::{Commit, Signature};
pub use error::StoreError;
pub use object::{Object, ObjectKind};
pub use patch_hash::ContentId;
pub use rename::RenameOptions;
pub use store::{ObjectInserter, ObjectReader, ProjectName, Repository, RepositoryManager};
pub use tree::{FileMode, Tree, TreeEntry};
pub use walk::{ChangeKind, TreeChange};
