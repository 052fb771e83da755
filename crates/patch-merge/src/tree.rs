//! Path-level three-way tree merge.
//!
//! Trees are compared as flat `path -> entry` maps. A path changed on one
//! side only takes that side; a path changed identically on both sides is
//! clean; a text file changed differently on both sides is content-merged.
//! Everything else is recorded as a [`Conflict`] holding the per-stage
//! entries, for the caller to resolve.

use std::collections::{BTreeMap, BTreeSet};

use bstr::BString;
use patch_diff::text::is_binary;
use patch_hash::ContentId;
use patch_object::flat::{flatten_tree, FlatEntry};
use patch_object::{FileMode, Object, ObjectReader, StoreError};
use tracing::debug;

use crate::content::{merge_content, MergeLabels};
use crate::{MergeError, MergeOptions};

/// An unresolved path. Stages are numbered base = 1, ours = 2, theirs = 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub base: Option<FlatEntry>,
    pub ours: Option<FlatEntry>,
    pub theirs: Option<FlatEntry>,
    /// Content with conflict markers, when a content merge was attempted.
    pub merged: Option<FlatEntry>,
}

impl Conflict {
    /// Present stages, lowest first.
    pub fn stages(&self) -> Vec<FlatEntry> {
        [self.base, self.ours, self.theirs]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn stage_count(&self) -> usize {
        self.stages().len()
    }
}

/// Outcome of a tree merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeMerge {
    /// Resolved paths.
    pub entries: BTreeMap<BString, FlatEntry>,
    /// Unresolved paths.
    pub conflicts: BTreeMap<BString, Conflict>,
    /// Objects created by the merge (merged contents, virtual base blobs)
    /// that entries and conflicts may reference. They must be stored
    /// together with any tree built from this merge.
    pub objects: Vec<Object>,
}

impl TreeMerge {
    /// A clean merge whose result is an existing tree.
    pub fn from_tree<R: ObjectReader + ?Sized>(
        reader: &R,
        tree: &ContentId,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            entries: flatten_tree(reader, tree)?,
            ..Self::default()
        })
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge `ours` and `theirs` against `base` (all tree ids; the empty tree
/// stands for an absent base).
pub fn merge_trees<R: ObjectReader + ?Sized>(
    reader: &R,
    base: &ContentId,
    ours: &ContentId,
    theirs: &ContentId,
    options: &MergeOptions,
    labels: &MergeLabels,
) -> Result<TreeMerge, MergeError> {
    if ours == theirs || base == theirs {
        return Ok(TreeMerge::from_tree(reader, ours)?);
    }
    if base == ours {
        return Ok(TreeMerge::from_tree(reader, theirs)?);
    }

    let base_map = flatten_tree(reader, base)?;
    let ours_map = flatten_tree(reader, ours)?;
    let theirs_map = flatten_tree(reader, theirs)?;
    let paths: BTreeSet<&BString> = base_map
        .keys()
        .chain(ours_map.keys())
        .chain(theirs_map.keys())
        .collect();

    let mut merge = TreeMerge::default();
    for path in paths {
        let b = base_map.get(path).copied();
        let o = ours_map.get(path).copied();
        let t = theirs_map.get(path).copied();

        let taken = if o == t || t == b {
            Some(o)
        } else if o == b {
            Some(t)
        } else {
            None
        };
        if let Some(side) = taken {
            if let Some(entry) = side {
                merge.entries.insert(path.clone(), entry);
            }
            continue;
        }

        match (o, t) {
            (Some(o), Some(t)) if o.id == t.id => match merge_mode(b, o.mode, t.mode) {
                Some(mode) => {
                    merge.entries.insert(path.clone(), FlatEntry { id: o.id, mode });
                }
                None => {
                    merge.conflicts.insert(path.clone(), conflict(b, Some(o), Some(t)));
                }
            },
            (Some(o), Some(t)) if is_content_mergeable(b, o, t) => {
                merge_file(reader, path, b, o, t, options, labels, &mut merge)?;
            }
            _ => {
                merge.conflicts.insert(path.clone(), conflict(b, o, t));
            }
        }
    }

    debug!(
        base = %base,
        ours = %ours,
        theirs = %theirs,
        entries = merge.entries.len(),
        conflicts = merge.conflicts.len(),
        "merged trees"
    );
    Ok(merge)
}

fn conflict(
    base: Option<FlatEntry>,
    ours: Option<FlatEntry>,
    theirs: Option<FlatEntry>,
) -> Conflict {
    Conflict {
        base,
        ours,
        theirs,
        merged: None,
    }
}

fn is_content_mergeable(base: Option<FlatEntry>, ours: FlatEntry, theirs: FlatEntry) -> bool {
    ours.mode.is_blob() && theirs.mode.is_blob() && base.map_or(true, |b| b.mode.is_blob())
}

/// The merged mode, or `None` when both sides changed it differently.
fn merge_mode(base: Option<FlatEntry>, ours: FileMode, theirs: FileMode) -> Option<FileMode> {
    let base = base.map(|b| b.mode);
    if ours == theirs || base == Some(theirs) {
        Some(ours)
    } else if base == Some(ours) {
        Some(theirs)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_file<R: ObjectReader + ?Sized>(
    reader: &R,
    path: &BString,
    base: Option<FlatEntry>,
    ours: FlatEntry,
    theirs: FlatEntry,
    options: &MergeOptions,
    labels: &MergeLabels,
    merge: &mut TreeMerge,
) -> Result<(), MergeError> {
    let base_content = match base {
        Some(entry) => mergeable_content(reader, &entry.id, options.max_blob_size)?,
        None => Some(Vec::new()),
    };
    let ours_content = mergeable_content(reader, &ours.id, options.max_blob_size)?;
    let theirs_content = mergeable_content(reader, &theirs.id, options.max_blob_size)?;
    let (Some(base_content), Some(ours_content), Some(theirs_content)) =
        (base_content, ours_content, theirs_content)
    else {
        merge
            .conflicts
            .insert(path.clone(), conflict(base, Some(ours), Some(theirs)));
        return Ok(());
    };

    let mode = merge_mode(base, ours.mode, theirs.mode).unwrap_or(ours.mode);
    let result = merge_content(
        &base_content,
        &ours_content,
        &theirs_content,
        options.algorithm,
        labels,
    );
    let clean = result.is_clean();
    let blob = Object::Blob(result.into_content());
    let merged = FlatEntry {
        id: blob.compute_id(),
        mode,
    };
    merge.objects.push(blob);
    if clean {
        merge.entries.insert(path.clone(), merged);
    } else {
        merge.conflicts.insert(
            path.clone(),
            Conflict {
                merged: Some(merged),
                ..conflict(base, Some(ours), Some(theirs))
            },
        );
    }
    Ok(())
}

/// Blob content eligible for a content merge: text within the size limit.
fn mergeable_content<R: ObjectReader + ?Sized>(
    reader: &R,
    id: &ContentId,
    limit: u64,
) -> Result<Option<Vec<u8>>, StoreError> {
    match reader.read_blob(id, limit) {
        Ok(data) if is_binary(&data) => Ok(None),
        Ok(data) => Ok(Some(data)),
        Err(StoreError::TooLarge { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
