//! Tree-level diff: which paths changed between two trees.

use std::collections::HashMap;

use bstr::BString;
use patch_hash::ContentId;
use patch_object::{ChangeKind, FileMode, ObjectReader, RenameOptions, StoreError, TreeChange};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A changed path, before any content is diffed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub kind: ChangeKind,
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub old_id: Option<ContentId>,
    pub new_id: Option<ContentId>,
    pub score: Option<u8>,
}

impl ModifiedFile {
    /// The path the change is reported under: the new path, or the old path
    /// for deletions.
    pub fn path(&self) -> &[u8] {
        self.new_path
            .as_ref()
            .or(self.old_path.as_ref())
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }
}

impl From<TreeChange> for ModifiedFile {
    fn from(change: TreeChange) -> Self {
        Self {
            kind: change.kind,
            old_path: change.old_path,
            new_path: change.new_path,
            old_mode: change.old_mode,
            new_mode: change.new_mode,
            old_id: change.old_id,
            new_id: change.new_id,
            score: change.score,
        }
    }
}

/// Computes changed paths between trees through the store's walker and
/// rename detection.
#[derive(Debug, Clone, Default)]
pub struct TreeDiffEngine {
    rename: RenameOptions,
}

impl TreeDiffEngine {
    /// `rename` supplies everything but the score, which is chosen per call.
    pub fn new(rename: RenameOptions) -> Self {
        Self { rename }
    }

    /// Changed paths between `old` (the empty tree when `None`) and `new`,
    /// sorted by path. Renames and copies are detected when a score is given.
    pub fn diff_trees<R: ObjectReader + ?Sized>(
        &self,
        reader: &R,
        old: Option<&ContentId>,
        new: &ContentId,
        rename_score: Option<u8>,
    ) -> Result<Vec<ModifiedFile>, StoreError> {
        let mut changes = reader.diff_trees(old, Some(new))?;
        if let Some(score) = rename_score {
            let options = RenameOptions {
                score,
                ..self.rename
            };
            changes = reader.detect_renames(changes, &options)?;
        }
        let mut files: Vec<ModifiedFile> = changes.into_iter().map(ModifiedFile::from).collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        debug!(
            old = ?old,
            new = %new,
            files = files.len(),
            "computed tree diff"
        );
        Ok(files)
    }
}

/// Collapse a deletion and an addition of the same path (a change between
/// file types the walker cannot diff in place) into one rewrite.
pub fn merge_type_changes(files: Vec<ModifiedFile>) -> Vec<ModifiedFile> {
    let mut added: HashMap<BString, ModifiedFile> = HashMap::new();
    let mut rest = Vec::with_capacity(files.len());
    for file in files {
        match (&file.kind, &file.new_path) {
            (ChangeKind::Added, Some(path)) => {
                added.insert(path.clone(), file);
            }
            _ => rest.push(file),
        }
    }

    let mut merged: Vec<ModifiedFile> = rest
        .into_iter()
        .map(|file| {
            let addition = match (&file.kind, &file.old_path) {
                (ChangeKind::Deleted, Some(path)) => added.remove(path),
                _ => None,
            };
            match addition {
                Some(addition) => ModifiedFile {
                    kind: ChangeKind::Rewrite,
                    new_path: addition.new_path,
                    new_mode: addition.new_mode,
                    new_id: addition.new_id,
                    ..file
                },
                None => file,
            }
        })
        .collect();
    merged.extend(added.into_values());
    merged.sort_by(|a, b| a.path().cmp(b.path()));
    merged
}
