//! Three-way strategies.
//!
//! Both merge the parents' trees over a common base. `resolve` uses the
//! first merge base as is; `recursive` first folds multiple merge bases into
//! one virtual base tree, whose objects live in a private overlay for the
//! duration of the merge.

use std::sync::Arc;

use patch_hash::ContentId;
use patch_object::ancestry::{merge_base, merge_bases};
use patch_object::flat::write_flat_tree;
use patch_object::overlay::{ObjectOverlay, OverlayInserter, OverlayReader};
use patch_object::ObjectReader;
use tracing::debug;

use crate::content::MergeLabels;
use crate::strategy::MergeStrategy;
use crate::tree::merge_trees;
use crate::{MergeError, MergeOptions, MergeStrategyKind, TreeMerge};

/// Three-way merge over the first merge base.
pub struct ResolveStrategy;

impl MergeStrategy for ResolveStrategy {
    fn kind(&self) -> MergeStrategyKind {
        MergeStrategyKind::Resolve
    }

    fn merge(
        &self,
        reader: &dyn ObjectReader,
        ours: &ContentId,
        theirs: &ContentId,
        options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        let base = match merge_base(reader, ours, theirs)? {
            Some(base) => reader.read_commit(&base)?.tree,
            None => ContentId::EMPTY_TREE,
        };
        merge_parents(reader, &base, ours, theirs, options)
    }
}

/// Three-way merge over a virtual base built from every merge base.
pub struct RecursiveStrategy;

impl MergeStrategy for RecursiveStrategy {
    fn kind(&self) -> MergeStrategyKind {
        MergeStrategyKind::Recursive
    }

    fn merge(
        &self,
        reader: &dyn ObjectReader,
        ours: &ContentId,
        theirs: &ContentId,
        options: &MergeOptions,
    ) -> Result<TreeMerge, MergeError> {
        let bases = merge_bases(reader, ours, theirs)?;
        match bases.as_slice() {
            [] => merge_parents(reader, &ContentId::EMPTY_TREE, ours, theirs, options),
            [base] => {
                let base = reader.read_commit(base)?.tree;
                merge_parents(reader, &base, ours, theirs, options)
            }
            [first, rest @ ..] => {
                let overlay = Arc::new(ObjectOverlay::new());
                let view = OverlayReader::new(Box::new(reader), overlay.clone());
                let (base, mut objects) = virtual_base(&view, &overlay, first, rest, options)?;
                debug!(bases = bases.len(), base = %base, "built virtual merge base");
                let mut merge = merge_parents(&view, &base, ours, theirs, options)?;
                objects.append(&mut merge.objects);
                merge.objects = objects;
                Ok(merge)
            }
        }
    }
}

fn merge_parents<R: ObjectReader + ?Sized>(
    reader: &R,
    base: &ContentId,
    ours: &ContentId,
    theirs: &ContentId,
    options: &MergeOptions,
) -> Result<TreeMerge, MergeError> {
    let ours_commit = reader.read_commit(ours)?;
    let theirs_commit = reader.read_commit(theirs)?;
    let labels = MergeLabels::for_commits(ours, &ours_commit, theirs, &theirs_commit);
    merge_trees(
        reader,
        base,
        &ours_commit.tree,
        &theirs_commit.tree,
        options,
        &labels,
    )
}

/// Fold the merge bases into one tree. Each further base is merged over its
/// merge base with the first; unresolved paths take the marker content, or
/// else whichever side still has the path.
fn virtual_base(
    view: &OverlayReader<'_>,
    overlay: &Arc<ObjectOverlay>,
    first: &ContentId,
    rest: &[ContentId],
    options: &MergeOptions,
) -> Result<(ContentId, Vec<patch_object::Object>), MergeError> {
    let labels = MergeLabels {
        ours: "Temporary merge branch 1".into(),
        theirs: "Temporary merge branch 2".into(),
    };
    let mut tree = view.read_commit(first)?.tree;
    let mut objects = Vec::new();
    for next in rest {
        let next_tree = view.read_commit(next)?.tree;
        let common = match merge_base(view, first, next)? {
            Some(common) => view.read_commit(&common)?.tree,
            None => ContentId::EMPTY_TREE,
        };
        let merged = merge_trees(view, &common, &tree, &next_tree, options, &labels)?;
        for object in &merged.objects {
            overlay.insert(object.clone());
        }
        objects.extend(merged.objects);

        let mut entries = merged.entries;
        for (path, conflict) in merged.conflicts {
            if let Some(entry) = conflict.merged.or(conflict.ours).or(conflict.theirs) {
                entries.insert(path, entry);
            }
        }
        let mut inserter = OverlayInserter::new(overlay.clone());
        tree = write_flat_tree(&mut inserter, &entries)?;
    }
    Ok((tree, objects))
}
