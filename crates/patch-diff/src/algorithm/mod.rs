//! Sequence diff algorithms: Myers and histogram.
//!
//! Both algorithms work on any `Eq` element type; lines are compared through
//! interned keys (see [`crate::text::intern_lines`]) and the intra-line
//! engine runs them directly over bytes. Results are lists of [`Edit`]s
//! sorted by position, adjacent regions merged.

pub mod histogram;
pub mod myers;

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::edit::Edit;
use crate::text::{intern_lines, Text, Whitespace};

/// Available diff algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAlgorithm {
    /// Myers O(ND), linear space.
    Myers,
    /// Histogram diff; regions without a usable pivot are handed to Myers.
    #[default]
    Histogram,
    /// Histogram diff that reports pivot-less regions as one replace edit.
    /// Always terminates in near-linear time.
    HistogramNoFallback,
}

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Checkpoint used inside the algorithms.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The computation observed a cancelled [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("diff computation cancelled")]
pub struct Cancelled;

/// Diff two sequences.
pub fn diff<T: Eq + Hash>(
    algorithm: DiffAlgorithm,
    a: &[T],
    b: &[T],
    cancel: &CancelToken,
) -> Result<Vec<Edit>, Cancelled> {
    let mut sink = EditSink::default();
    match algorithm {
        DiffAlgorithm::Myers => myers::diff(a, b, cancel, &mut sink)?,
        DiffAlgorithm::Histogram => {
            histogram::diff(a, b, histogram::Fallback::Myers, cancel, &mut sink)?
        }
        DiffAlgorithm::HistogramNoFallback => {
            histogram::diff(a, b, histogram::Fallback::Replace, cancel, &mut sink)?
        }
    }
    Ok(sink.into_edits())
}

/// Diff two texts line by line, comparing lines under `whitespace`.
pub fn diff_lines(
    algorithm: DiffAlgorithm,
    a: &Text<'_>,
    b: &Text<'_>,
    whitespace: Whitespace,
    cancel: &CancelToken,
) -> Result<Vec<Edit>, Cancelled> {
    let (a_keys, b_keys) = intern_lines(a, b, whitespace);
    diff(algorithm, &a_keys, &b_keys, cancel)
}

/// Ordered edit accumulator that merges touching regions.
#[derive(Debug, Default)]
pub(crate) struct EditSink {
    edits: Vec<Edit>,
}

impl EditSink {
    pub(crate) fn push(&mut self, edit: Edit) {
        if edit.is_empty() {
            return;
        }
        if let Some(last) = self.edits.last_mut() {
            if last.end_a() == edit.begin_a() && last.end_b() == edit.begin_b() {
                *last = last.union(&edit);
                return;
            }
        }
        self.edits.push(edit);
    }

    pub(crate) fn into_edits(self) -> Vec<Edit> {
        self.edits
    }
}
