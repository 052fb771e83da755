//! Histogram diff algorithm.
//!
//! A variant of patience diff that uses occurrence counting to pick the
//! least frequent element common to both sides as a pivot, then recurses
//! on the regions before and after it. Tends to produce more readable diffs
//! for code changes. Regions with no usable pivot, or reached past the
//! recursion limit, are handed to the configured [`Fallback`].

use std::collections::HashMap;
use std::hash::Hash;

use super::{myers, CancelToken, Cancelled, EditSink};
use crate::edit::Edit;

/// Maximum recursion depth before the fallback takes over.
const MAX_RECURSION: usize = 64;

/// Elements occurring more often than this on side A are never pivots.
const MAX_CHAIN_LENGTH: usize = 64;

/// What to do with a region the histogram cannot split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fallback {
    /// Diff the region with Myers.
    Myers,
    /// Report the whole region as a single replace edit.
    Replace,
}

pub(crate) fn diff<T: Eq + Hash>(
    a: &[T],
    b: &[T],
    fallback: Fallback,
    cancel: &CancelToken,
    sink: &mut EditSink,
) -> Result<(), Cancelled> {
    let mut state = State {
        a,
        b,
        fallback,
        cancel,
        sink,
    };
    state.recurse(0, a.len(), 0, b.len(), 0)
}

struct State<'a, 's, T> {
    a: &'a [T],
    b: &'a [T],
    fallback: Fallback,
    cancel: &'a CancelToken,
    sink: &'s mut EditSink,
}

impl<T: Eq + Hash> State<'_, '_, T> {
    fn recurse(
        &mut self,
        mut a_lo: usize,
        mut a_hi: usize,
        mut b_lo: usize,
        mut b_hi: usize,
        depth: usize,
    ) -> Result<(), Cancelled> {
        self.cancel.check()?;

        // Trim common prefix
        while a_lo < a_hi && b_lo < b_hi && self.a[a_lo] == self.b[b_lo] {
            a_lo += 1;
            b_lo += 1;
        }

        // Trim common suffix
        while a_lo < a_hi && b_lo < b_hi && self.a[a_hi - 1] == self.b[b_hi - 1] {
            a_hi -= 1;
            b_hi -= 1;
        }

        if a_lo == a_hi || b_lo == b_hi {
            self.sink.push(Edit::new(a_lo, a_hi, b_lo, b_hi));
            return Ok(());
        }

        if depth >= MAX_RECURSION {
            return self.fall_back(a_lo, a_hi, b_lo, b_hi);
        }

        match self.find_pivot(a_lo, a_hi, b_lo, b_hi) {
            Some((ai, bi)) => {
                self.recurse(a_lo, ai, b_lo, bi, depth + 1)?;
                self.recurse(ai + 1, a_hi, bi + 1, b_hi, depth + 1)
            }
            None => self.fall_back(a_lo, a_hi, b_lo, b_hi),
        }
    }

    /// Lowest-occurrence element of the A region that also appears in the
    /// B region. Ties keep the earliest occurrence in B.
    fn find_pivot(
        &self,
        a_lo: usize,
        a_hi: usize,
        b_lo: usize,
        b_hi: usize,
    ) -> Option<(usize, usize)> {
        // Build histogram of elements in A (element -> indices)
        let mut histogram: HashMap<&T, Vec<usize>> = HashMap::new();
        for i in a_lo..a_hi {
            histogram.entry(&self.a[i]).or_default().push(i);
        }

        let mut best_count = usize::MAX;
        let mut best = None;
        for j in b_lo..b_hi {
            if let Some(indices) = histogram.get(&self.b[j]) {
                let count = indices.len();
                if count <= MAX_CHAIN_LENGTH && count < best_count {
                    best_count = count;
                    best = Some((indices[0], j));
                }
            }
        }
        best
    }

    fn fall_back(
        &mut self,
        a_lo: usize,
        a_hi: usize,
        b_lo: usize,
        b_hi: usize,
    ) -> Result<(), Cancelled> {
        match self.fallback {
            Fallback::Myers => {
                myers::diff_range(self.a, a_lo, a_hi, self.b, b_lo, b_hi, self.cancel, self.sink)
            }
            Fallback::Replace => {
                self.sink.push(Edit::new(a_lo, a_hi, b_lo, b_hi));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(a: &[&str], b: &[&str], fallback: Fallback) -> Vec<Edit> {
        let mut sink = EditSink::default();
        diff(a, b, fallback, &CancelToken::new(), &mut sink).unwrap();
        sink.into_edits()
    }

    #[test]
    fn identical() {
        assert!(run(&["a", "b", "c"], &["a", "b", "c"], Fallback::Myers).is_empty());
    }

    #[test]
    fn insert_line() {
        let edits = run(&["a", "c"], &["a", "b", "c"], Fallback::Myers);
        assert_eq!(edits, vec![Edit::new(1, 1, 1, 2)]);
    }

    #[test]
    fn delete_line() {
        let edits = run(&["a", "b", "c"], &["a", "c"], Fallback::Myers);
        assert_eq!(edits, vec![Edit::new(1, 2, 1, 1)]);
    }

    #[test]
    fn unique_pivot_anchors_moved_block() {
        let a = ["}", "fn one", "}", "fn two", "}"];
        let b = ["}", "fn two", "}", "fn one", "}"];
        let edits = run(&a, &b, Fallback::Myers);
        let (deleted, inserted) = crate::edit::line_counts(&edits);
        assert_eq!(deleted, inserted);
        assert!(deleted <= 2);
    }

    #[test]
    fn no_common_element_without_fallback_is_one_replace() {
        let edits = run(&["a", "b", "x"], &["c", "d", "x"], Fallback::Replace);
        assert_eq!(edits, vec![Edit::new(0, 2, 0, 2)]);
    }

    #[test]
    fn repetitive_region_falls_back() {
        let a: Vec<&str> = std::iter::repeat("x").take(100).chain(["a"]).collect();
        let b: Vec<&str> = ["b"].into_iter().chain(std::iter::repeat("x").take(100)).collect();
        let with_myers = run(&a, &b, Fallback::Myers);
        assert_eq!(
            with_myers,
            vec![Edit::new(0, 0, 0, 1), Edit::new(100, 101, 101, 101)]
        );
        let replace = run(&a, &b, Fallback::Replace);
        assert_eq!(replace, vec![Edit::new(0, 101, 0, 101)]);
    }
}
