//! Edit model: half-open line (or character) ranges on two sides.

use serde::{Deserialize, Serialize};

/// Shape of an edit, derived from which of its ranges are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    /// Only side B has content.
    Insert,
    /// Only side A has content.
    Delete,
    /// Both sides have content.
    Replace,
    /// Neither side has content.
    Empty,
}

/// A pair of half-open ranges `[begin_a, end_a)` and `[begin_b, end_b)`.
///
/// Construction never produces an inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edit {
    begin_a: usize,
    end_a: usize,
    begin_b: usize,
    end_b: usize,
}

impl Edit {
    /// Create an edit. Inverted ranges are clamped to empty ones at their begin.
    pub fn new(begin_a: usize, end_a: usize, begin_b: usize, end_b: usize) -> Self {
        Self {
            begin_a,
            end_a: end_a.max(begin_a),
            begin_b,
            end_b: end_b.max(begin_b),
        }
    }

    pub fn begin_a(&self) -> usize {
        self.begin_a
    }

    pub fn end_a(&self) -> usize {
        self.end_a
    }

    pub fn begin_b(&self) -> usize {
        self.begin_b
    }

    pub fn end_b(&self) -> usize {
        self.end_b
    }

    pub fn length_a(&self) -> usize {
        self.end_a - self.begin_a
    }

    pub fn length_b(&self) -> usize {
        self.end_b - self.begin_b
    }

    pub fn kind(&self) -> EditKind {
        match (self.length_a() == 0, self.length_b() == 0) {
            (true, true) => EditKind::Empty,
            (true, false) => EditKind::Insert,
            (false, true) => EditKind::Delete,
            (false, false) => EditKind::Replace,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind() == EditKind::Empty
    }

    /// Same edit with both sides moved by the given offsets.
    pub fn shifted(&self, delta_a: usize, delta_b: usize) -> Self {
        Self::new(
            self.begin_a + delta_a,
            self.end_a + delta_a,
            self.begin_b + delta_b,
            self.end_b + delta_b,
        )
    }

    /// Smallest edit covering `self` and `other`.
    pub fn union(&self, other: &Edit) -> Self {
        Self::new(
            self.begin_a.min(other.begin_a),
            self.end_a.max(other.end_a),
            self.begin_b.min(other.begin_b),
            self.end_b.max(other.end_b),
        )
    }
}

/// A replace edit together with its character-level refinement.
///
/// Sub-edit offsets are relative to the first byte of the line range on
/// each side, so a sub-edit of `(0, 1, 0, 1)` covers the first character of
/// both ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplaceEdit {
    pub edit: Edit,
    pub sub_edits: Vec<Edit>,
}

impl ReplaceEdit {
    pub fn new(edit: Edit, sub_edits: Vec<Edit>) -> Self {
        Self { edit, sub_edits }
    }
}

/// Counts of lines deleted and inserted by an edit list.
pub fn line_counts<'a>(edits: impl IntoIterator<Item = &'a Edit>) -> (usize, usize) {
    edits.into_iter().fold((0, 0), |(deleted, inserted), edit| {
        (deleted + edit.length_a(), inserted + edit.length_b())
    })
}
