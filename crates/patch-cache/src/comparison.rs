//! How the old side of a comparison relates to the new commit, and the
//! synthetic files derived from commits.

use bstr::{BString, ByteSlice};
use patch_hash::ContentId;
use patch_object::ancestry::reachable_excluding;
use patch_object::{Commit, ObjectReader};
use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Path of the pseudo file holding the commit message.
pub const COMMIT_MSG: &str = "/COMMIT_MSG";

/// Path of the pseudo file listing the commits a merge brings in.
pub const MERGE_LIST: &str = "/MERGE_LIST";

/// Upper bound on the commits rendered into a merge list.
const MERGE_LIST_LIMIT: usize = 1000;

pub fn is_magic_path(path: &[u8]) -> bool {
    path == COMMIT_MSG.as_bytes() || path == MERGE_LIST.as_bytes()
}

/// What the old side of a comparison is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonType {
    /// Some unrelated commit.
    AgainstOtherSnapshot,
    /// The given parent of the new commit, counting from 1.
    AgainstParent(u32),
    /// The auto-merge of the new commit's parents.
    AgainstAutoMerge,
    /// Nothing: the new commit is a root commit.
    AgainstRoot,
}

impl ComparisonType {
    /// Classify an explicit old commit against the new commit's parents.
    pub fn between(old: Option<&ContentId>, new: &Commit) -> Self {
        match old {
            None if new.parents.is_empty() => Self::AgainstRoot,
            None => Self::AgainstAutoMerge,
            Some(old) => match new.parents.iter().position(|p| p == old) {
                Some(i) => Self::AgainstParent(i as u32 + 1),
                None => Self::AgainstOtherSnapshot,
            },
        }
    }

    pub fn parent_num(&self) -> Option<u32> {
        match self {
            Self::AgainstParent(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the synthetic files show a real old side. Against a parent,
    /// the auto-merge or nothing, their old side is empty.
    pub fn has_magic_old_side(&self) -> bool {
        matches!(self, Self::AgainstOtherSnapshot)
    }
}

/// Whether the diff between two commits can contain edits brought in by a
/// rebase. That needs two non-root, non-merge commits that are neither
/// parent and child nor siblings on the same parent.
pub fn may_contain_rebase(
    old_id: &ContentId,
    old: &Commit,
    new_id: &ContentId,
    new: &Commit,
) -> bool {
    match (old.parents.as_slice(), new.parents.as_slice()) {
        ([old_parent], [new_parent]) => {
            old_parent != new_id && new_parent != old_id && old_parent != new_parent
        }
        _ => false,
    }
}

/// Text of a synthetic file for `commit`. Unknown paths yield `None`.
pub fn magic_file_content<R: ObjectReader + ?Sized>(
    reader: &R,
    path: &[u8],
    commit: &Commit,
    comparison: ComparisonType,
) -> Result<Option<Vec<u8>>, CacheError> {
    if path == COMMIT_MSG.as_bytes() {
        Ok(Some(commit.message_file_content()))
    } else if path == MERGE_LIST.as_bytes() {
        Ok(Some(merge_list(reader, commit, comparison)?))
    } else {
        Ok(None)
    }
}

/// The commits merged in by `commit`: those reachable from its other parents
/// but not from the parent being compared against (the first one unless a
/// specific parent is). Empty for non-merge commits.
pub fn merge_list<R: ObjectReader + ?Sized>(
    reader: &R,
    commit: &Commit,
    comparison: ComparisonType,
) -> Result<Vec<u8>, CacheError> {
    if !commit.is_merge() {
        return Ok(Vec::new());
    }
    let base = comparison
        .parent_num()
        .map_or(0, |n| n as usize - 1)
        .min(commit.parents.len() - 1);
    let exclude = [commit.parents[base]];
    let include: Vec<ContentId> = commit
        .parents
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != base)
        .map(|(_, p)| *p)
        .collect();

    let mut out = BString::from("Merge List:\n\n");
    for id in reachable_excluding(reader, &include, &exclude, MERGE_LIST_LIMIT)? {
        let merged = reader.read_commit(&id)?;
        out.extend_from_slice(b"* ");
        out.extend_from_slice(id.abbreviate(8).as_bytes());
        out.push(b' ');
        out.extend_from_slice(merged.summary().trim());
        out.push(b'\n');
    }
    Ok(out.into())
}
