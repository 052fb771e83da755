//! Identifying edits that a rebase brought in.
//!
//! When an old commit O and a new commit N sit on different parents, the
//! diff O..N also contains everything that changed between those parents.
//! The parent-vs-parent edits are expressed in parent coordinates; pushing
//! their A side through parent(O)..O and their B side through parent(N)..N
//! turns them into edits in O/N coordinates, which can then be matched
//! against the edits of O..N.

use std::collections::{HashMap, HashSet};

use bstr::BString;

use crate::edit::Edit;
use crate::position::{
    ConflictStrategy, FileMapping, Mapping, Position, PositionTransformer, PositionedEntity, Range,
    RangeMapping,
};

/// The edits of one file between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdits {
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub edits: Vec<Edit>,
}

impl FileEdits {
    pub fn new(old_path: Option<BString>, new_path: Option<BString>, edits: Vec<Edit>) -> Self {
        Self {
            old_path,
            new_path,
            edits,
        }
    }

    /// The position mapping described by these edits.
    pub fn to_mapping(&self) -> Mapping {
        Mapping {
            file: FileMapping {
                old_path: self.old_path.clone(),
                new_path: self.new_path.clone(),
            },
            ranges: self
                .edits
                .iter()
                .map(|e| RangeMapping {
                    old: Range::new(e.begin_a(), e.end_a()),
                    new: Range::new(e.begin_b(), e.end_b()),
                })
                .collect(),
        }
    }

    /// One entry per edit, or a single content-less entry when the file
    /// changed without edits (a pure rename or mode change).
    pub fn to_context_aware(&self) -> Vec<ContextAwareEdit> {
        if self.edits.is_empty() {
            return vec![ContextAwareEdit::new(
                self.old_path.clone(),
                self.new_path.clone(),
                None,
            )];
        }
        self.edits
            .iter()
            .map(|e| ContextAwareEdit::new(self.old_path.clone(), self.new_path.clone(), Some(*e)))
            .collect()
    }
}

/// An edit together with the paths it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextAwareEdit {
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    /// `None` for a file-level change without content edits.
    pub edit: Option<Edit>,
}

impl ContextAwareEdit {
    pub fn new(old_path: Option<BString>, new_path: Option<BString>, edit: Option<Edit>) -> Self {
        Self {
            old_path,
            new_path,
            edit,
        }
    }

    /// The new path, or the old path of a deleted file.
    pub fn lookup_path(&self) -> Option<&BString> {
        self.new_path.as_ref().or(self.old_path.as_ref())
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    A,
    B,
}

impl Side {
    fn position(&self, edit: &ContextAwareEdit) -> Position {
        match self {
            Side::A => Position {
                path: edit.old_path.clone(),
                range: edit.edit.map(|e| Range::new(e.begin_a(), e.end_a())),
            },
            Side::B => Position {
                path: edit.new_path.clone(),
                range: edit.edit.map(|e| Range::new(e.begin_b(), e.end_b())),
            },
        }
    }

    fn relocate(&self, edit: ContextAwareEdit, position: Position) -> ContextAwareEdit {
        let moved = match (edit.edit, position.range) {
            (Some(e), Some(r)) => Some(match self {
                Side::A => Edit::new(r.start, r.end, e.begin_b(), e.end_b()),
                Side::B => Edit::new(e.begin_a(), e.end_a(), r.start, r.end),
            }),
            _ => None,
        };
        match self {
            Side::A => ContextAwareEdit::new(position.path, edit.new_path, moved),
            Side::B => ContextAwareEdit::new(edit.old_path, position.path, moved),
        }
    }
}

/// Re-expresses parent-vs-parent edits in the coordinates of the two
/// commits being compared. Edits that cannot be mapped exactly are dropped.
#[derive(Debug, Clone)]
pub struct EditTransformer {
    edits: Vec<ContextAwareEdit>,
    transformer: PositionTransformer,
}

impl EditTransformer {
    /// Start from the edits between the two parents.
    pub fn new(parent_edits: &[FileEdits]) -> Self {
        Self {
            edits: parent_edits
                .iter()
                .flat_map(FileEdits::to_context_aware)
                .collect(),
            transformer: PositionTransformer::new(ConflictStrategy::Omit),
        }
    }

    /// Move the A side from the old commit's parent to the old commit,
    /// given the edits parent(O)..O.
    pub fn transform_side_a(&mut self, old_edits: &[FileEdits]) {
        self.transform(old_edits, Side::A);
    }

    /// Move the B side from the new commit's parent to the new commit,
    /// given the edits parent(N)..N.
    pub fn transform_side_b(&mut self, new_edits: &[FileEdits]) {
        self.transform(new_edits, Side::B);
    }

    pub fn edits(&self) -> &[ContextAwareEdit] {
        &self.edits
    }

    /// Transformed edits grouped by [`ContextAwareEdit::lookup_path`].
    pub fn edits_per_file_path(&self) -> HashMap<BString, Vec<ContextAwareEdit>> {
        let mut grouped: HashMap<BString, Vec<ContextAwareEdit>> = HashMap::new();
        for edit in &self.edits {
            if let Some(path) = edit.lookup_path() {
                grouped.entry(path.clone()).or_default().push(edit.clone());
            }
        }
        grouped
    }

    fn transform(&mut self, file_edits: &[FileEdits], side: Side) {
        if file_edits.is_empty() {
            return;
        }
        let mappings: Vec<Mapping> = file_edits.iter().map(FileEdits::to_mapping).collect();
        let entities = std::mem::take(&mut self.edits)
            .into_iter()
            .map(|edit| {
                let position = side.position(&edit);
                PositionedEntity::new(edit, position)
            })
            .collect();
        self.edits = self
            .transformer
            .transform(entities, &mappings)
            .into_iter()
            .map(|moved| side.relocate(moved.entity, moved.position))
            .collect();
    }
}

/// Which edits of a file diff a rebase accounts for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseEdits {
    /// Edits of the file diff that equal a transformed parent edit, in
    /// file-diff order.
    pub edits: Vec<Edit>,
    /// Every change of the file, including a content-less one, is due to
    /// the rebase.
    pub whole_file: bool,
}

/// Match the edits of one file diff against transformed parent edits
/// looked up for that file. Only exact matches count.
pub fn match_rebase_edits(file: &FileEdits, candidates: &[ContextAwareEdit]) -> RebaseEdits {
    if candidates.is_empty() {
        return RebaseEdits::default();
    }
    let candidate_edits: HashSet<Edit> = candidates.iter().filter_map(|c| c.edit).collect();
    let edits: Vec<Edit> = file
        .edits
        .iter()
        .filter(|e| candidate_edits.contains(e))
        .copied()
        .collect();
    let candidates: HashSet<&ContextAwareEdit> = candidates.iter().collect();
    let whole_file = file
        .to_context_aware()
        .iter()
        .all(|edit| candidates.contains(edit));
    RebaseEdits { edits, whole_file }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(path: &str, edits: &[(usize, usize, usize, usize)]) -> FileEdits {
        FileEdits::new(
            Some(BString::from(path)),
            Some(BString::from(path)),
            edits
                .iter()
                .map(|&(ba, ea, bb, eb)| Edit::new(ba, ea, bb, eb))
                .collect(),
        )
    }

    fn run(parents: &[FileEdits], old: &[FileEdits], new: &[FileEdits]) -> EditTransformer {
        let mut transformer = EditTransformer::new(parents);
        transformer.transform_side_a(old);
        transformer.transform_side_b(new);
        transformer
    }

    #[test]
    fn upstream_change_is_attributed_to_rebase() {
        // Both patch sets change line 8; upstream changed line 2.
        let transformer = run(
            &[f("f", &[(1, 2, 1, 2)])],
            &[f("f", &[(7, 8, 7, 8)])],
            &[f("f", &[(7, 8, 7, 8)])],
        );
        let per_path = transformer.edits_per_file_path();
        let main = f("f", &[(1, 2, 1, 2)]);
        let matched = match_rebase_edits(&main, &per_path[&BString::from("f")]);
        assert_eq!(matched.edits, vec![Edit::new(1, 2, 1, 2)]);
        assert!(matched.whole_file);
    }

    #[test]
    fn sides_shift_independently() {
        // The new patch set added three lines above the upstream change.
        let transformer = run(
            &[f("f", &[(5, 6, 5, 6)])],
            &[],
            &[f("f", &[(0, 0, 0, 3)])],
        );
        assert_eq!(
            transformer.edits(),
            &[ContextAwareEdit::new(
                Some(BString::from("f")),
                Some(BString::from("f")),
                Some(Edit::new(5, 6, 8, 9))
            )]
        );

        let main = f("f", &[(0, 0, 0, 3), (5, 6, 8, 9)]);
        let matched = match_rebase_edits(&main, transformer.edits());
        assert_eq!(matched.edits, vec![Edit::new(5, 6, 8, 9)]);
        assert!(!matched.whole_file);
    }

    #[test]
    fn overlapping_change_is_never_guessed() {
        let transformer = run(
            &[f("f", &[(3, 5, 3, 5)])],
            &[f("f", &[(4, 6, 4, 7)])],
            &[],
        );
        assert!(transformer.edits().is_empty());
    }

    #[test]
    fn rename_on_old_side_follows_path() {
        let renamed = FileEdits::new(
            Some(BString::from("old.txt")),
            Some(BString::from("renamed.txt")),
            vec![],
        );
        let transformer = run(&[f("old.txt", &[(2, 3, 2, 3)])], &[renamed], &[]);
        let edit = &transformer.edits()[0];
        assert_eq!(edit.old_path, Some(BString::from("renamed.txt")));
        assert_eq!(edit.new_path, Some(BString::from("old.txt")));
        assert_eq!(edit.edit, Some(Edit::new(2, 3, 2, 3)));
    }

    #[test]
    fn content_less_change_matches_as_whole_file() {
        let mode_change = f("script.sh", &[]);
        let transformer = run(&[mode_change.clone()], &[], &[]);
        let matched = match_rebase_edits(&mode_change, transformer.edits());
        assert!(matched.edits.is_empty());
        assert!(matched.whole_file);
    }

    #[test]
    fn deleted_file_is_keyed_by_old_path() {
        let deleted =
            FileEdits::new(Some(BString::from("gone")), None, vec![Edit::new(0, 4, 0, 0)]);
        let transformer = EditTransformer::new(&[deleted]);
        assert!(transformer
            .edits_per_file_path()
            .contains_key(&BString::from("gone")));
    }
}
