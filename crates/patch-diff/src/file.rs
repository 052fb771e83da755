//! Per-file line diff under a time budget.
//!
//! [`FileDiffEngine`] owns a bounded worker pool. A budgeted diff runs on a
//! worker while the caller waits on a channel; when the budget expires the
//! worker is asked to cancel and the caller either reports the timeout or
//! recomputes synchronously with [`DiffAlgorithm::HistogramNoFallback`],
//! which always terminates.

use std::sync::Arc;
use std::time::Duration;

use bstr::{BString, ByteSlice};
use crossbeam::channel::{self, RecvTimeoutError};
use patch_hash::ContentId;
use patch_object::{ChangeKind, FileMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::algorithm::{diff_lines, CancelToken, Cancelled, DiffAlgorithm};
use crate::edit::Edit;
use crate::header::FileHeader;
use crate::text::{is_binary, Text, Whitespace};
use crate::DiffError;

/// How the content of a file diff is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchType {
    Unified,
    Binary,
}

/// One side of a file comparison.
#[derive(Debug, Clone)]
pub struct FileSide {
    pub path: BString,
    pub mode: FileMode,
    pub id: ContentId,
    pub content: Arc<Vec<u8>>,
}

/// A file comparison to compute. An absent side is the missing blob.
#[derive(Debug, Clone)]
pub struct FileDiffInput {
    pub kind: ChangeKind,
    pub old: Option<FileSide>,
    pub new: Option<FileSide>,
    pub score: Option<u8>,
}

/// Knobs for a single file diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileDiffOptions {
    pub algorithm: DiffAlgorithm,
    pub whitespace: Whitespace,
    /// Run under the engine's time budget.
    pub use_timeout: bool,
}

/// Result of diffing one file between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitFileDiff {
    pub edits: Vec<Edit>,
    pub header: BString,
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub old_id: Option<ContentId>,
    pub new_id: Option<ContentId>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub change_kind: ChangeKind,
    pub patch_type: PatchType,
    /// Content sizes; zero for modes without a content size.
    pub old_size: u64,
    pub new_size: u64,
    /// The computation timed out; only the metadata is meaningful.
    pub negative: bool,
}

impl GitFileDiff {
    /// Sentinel for a path that does not differ between the trees.
    pub fn empty() -> Self {
        Self {
            edits: Vec::new(),
            header: BString::default(),
            old_path: None,
            new_path: None,
            old_id: None,
            new_id: None,
            old_mode: None,
            new_mode: None,
            change_kind: ChangeKind::Modified,
            patch_type: PatchType::Unified,
            old_size: 0,
            new_size: 0,
            negative: false,
        }
    }

    /// Placeholder recorded when the diff of `input` did not finish in time.
    pub fn negative(input: &FileDiffInput) -> Self {
        let mut diff = Self::with_metadata(input, PatchType::Unified);
        diff.negative = true;
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.old_id.is_none() && self.new_id.is_none() && !self.negative
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The path the diff is reported under: the new path, or the old path
    /// for deletions.
    pub fn path(&self) -> Option<&BString> {
        self.new_path.as_ref().or(self.old_path.as_ref())
    }

    fn with_metadata(input: &FileDiffInput, patch_type: PatchType) -> Self {
        let old = input.old.as_ref();
        let new = input.new.as_ref();
        let header = FileHeader {
            kind: input.kind,
            old_path: old.map(|s| s.path.as_bstr()),
            new_path: new.map(|s| s.path.as_bstr()),
            old_mode: old.map(|s| s.mode),
            new_mode: new.map(|s| s.mode),
            old_id: old.map(|s| s.id),
            new_id: new.map(|s| s.id),
            score: input.score,
            binary: patch_type == PatchType::Binary,
        }
        .format();
        Self {
            edits: Vec::new(),
            header,
            old_path: old.map(|s| s.path.clone()),
            new_path: new.map(|s| s.path.clone()),
            old_id: old.map(|s| s.id),
            new_id: new.map(|s| s.id),
            old_mode: old.map(|s| s.mode),
            new_mode: new.map(|s| s.mode),
            change_kind: input.kind,
            patch_type,
            old_size: content_size(old),
            new_size: content_size(new),
            negative: false,
        }
    }
}

/// Line diff engine with a bounded worker pool and a wall-clock budget.
pub struct FileDiffEngine {
    pool: rayon::ThreadPool,
    timeout: Duration,
}

impl FileDiffEngine {
    /// Create an engine with `threads` workers (at least one).
    pub fn new(threads: usize, timeout: Duration) -> Result<Self, DiffError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("diff-worker-{i}"))
            .panic_handler(|_| error!("diff worker panicked"))
            .build()
            .map_err(|e| DiffError::Worker(e.to_string()))?;
        Ok(Self { pool, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Diff one file. Binary content yields no edits.
    ///
    /// With `use_timeout` the line diff runs on a worker and a budget overrun
    /// is reported as [`DiffError::Timeout`]; otherwise it runs on the calling
    /// thread without a budget.
    pub fn compute(
        &self,
        input: &FileDiffInput,
        options: &FileDiffOptions,
    ) -> Result<GitFileDiff, DiffError> {
        let old = side_content(input.old.as_ref());
        let new = side_content(input.new.as_ref());
        if is_binary(&old) || is_binary(&new) {
            return Ok(GitFileDiff::with_metadata(input, PatchType::Binary));
        }

        let edits = if options.use_timeout {
            self.diff_with_budget(old, new, options.algorithm, options.whitespace)?
        } else {
            Self::diff_text(&old, &new, options.algorithm, options.whitespace)
        };
        let mut diff = GitFileDiff::with_metadata(input, PatchType::Unified);
        diff.edits = edits;
        Ok(diff)
    }

    /// Diff one file under the budget, falling back to
    /// [`DiffAlgorithm::HistogramNoFallback`] on the calling thread when the
    /// budget is exceeded.
    pub fn diff_file(
        &self,
        input: &FileDiffInput,
        algorithm: DiffAlgorithm,
        whitespace: Whitespace,
    ) -> Result<GitFileDiff, DiffError> {
        let options = FileDiffOptions {
            algorithm,
            whitespace,
            use_timeout: true,
        };
        match self.compute(input, &options) {
            Err(DiffError::Timeout(budget)) => {
                warn!(
                    timeout_ms = budget.as_millis() as u64,
                    old = ?input.old.as_ref().map(|s| s.id),
                    new = ?input.new.as_ref().map(|s| s.id),
                    "file diff timed out, recomputing with fallback algorithm"
                );
                let fallback = FileDiffOptions {
                    algorithm: DiffAlgorithm::HistogramNoFallback,
                    whitespace,
                    use_timeout: false,
                };
                self.compute(input, &fallback)
            }
            other => other,
        }
    }

    /// Budgeted line diff of two contents.
    pub fn diff_with_budget(
        &self,
        old: Arc<Vec<u8>>,
        new: Arc<Vec<u8>>,
        algorithm: DiffAlgorithm,
        whitespace: Whitespace,
    ) -> Result<Vec<Edit>, DiffError> {
        let (tx, rx) = channel::bounded(1);
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        self.pool.spawn(move || {
            let result = line_edits(&old, &new, algorithm, whitespace, &worker_cancel);
            // The caller may have given up already.
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(edits)) => Ok(edits),
            Ok(Err(Cancelled)) => Err(DiffError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Timeout) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "cancelling diff worker");
                cancel.cancel();
                Err(DiffError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DiffError::Worker(
                "diff worker exited without a result".into(),
            )),
        }
    }

    /// Unbudgeted line diff on the calling thread.
    pub fn diff_text(
        old: &[u8],
        new: &[u8],
        algorithm: DiffAlgorithm,
        whitespace: Whitespace,
    ) -> Vec<Edit> {
        match line_edits(old, new, algorithm, whitespace, &CancelToken::new()) {
            Ok(edits) => edits,
            Err(Cancelled) => whole_file_edit(&Text::new(old), &Text::new(new)),
        }
    }
}

fn content_size(side: Option<&FileSide>) -> u64 {
    side.filter(|s| s.mode.has_content_size())
        .map_or(0, |s| s.content.len() as u64)
}

fn side_content(side: Option<&FileSide>) -> Arc<Vec<u8>> {
    side.map(|s| Arc::clone(&s.content)).unwrap_or_default()
}

fn line_edits(
    old: &[u8],
    new: &[u8],
    algorithm: DiffAlgorithm,
    whitespace: Whitespace,
    cancel: &CancelToken,
) -> Result<Vec<Edit>, Cancelled> {
    let a = Text::new(old);
    let b = Text::new(new);
    let edits = diff_lines(algorithm, &a, &b, whitespace, cancel)?;
    Ok(normalize_trailing_newline(&a, &b, edits))
}

fn whole_file_edit(a: &Text<'_>, b: &Text<'_>) -> Vec<Edit> {
    let edit = Edit::new(0, a.len(), 0, b.len());
    if edit.is_empty() {
        Vec::new()
    } else {
        vec![edit]
    }
}

/// Make a difference in the final line feed show up as a change of the last
/// line on both sides.
///
/// Line keys ignore the line feed, so `"x\ny"` and `"x\ny\n"` diff as equal.
/// This covers the last line of each side with an edit, either by adding a
/// new one or by widening the final edit.
pub fn normalize_trailing_newline(a: &Text<'_>, b: &Text<'_>, mut edits: Vec<Edit>) -> Vec<Edit> {
    let (na, nb) = (a.len(), b.len());
    if na == 0 || nb == 0 || a.ends_with_newline() == b.ends_with_newline() {
        return edits;
    }

    let last_line = Edit::new(na - 1, na, nb - 1, nb);
    let Some(last) = edits.last().copied() else {
        edits.push(last_line);
        return edits;
    };

    if last.end_a() == na && last.end_b() == nb {
        if last.length_a() > 0 && last.length_b() > 0 {
            return edits;
        }
        let (Some(begin_a), Some(begin_b)) =
            (last.begin_a().checked_sub(1), last.begin_b().checked_sub(1))
        else {
            return edits;
        };
        let widened = Edit::new(begin_a, na, begin_b, nb);
        edits.pop();
        match edits.last_mut() {
            Some(prev) if prev.end_a() == begin_a && prev.end_b() == begin_b => {
                *prev = prev.union(&widened);
            }
            _ => edits.push(widened),
        }
    } else if last.end_a() == na - 1 && last.end_b() == nb - 1 {
        if let Some(last) = edits.last_mut() {
            *last = Edit::new(last.begin_a(), na, last.begin_b(), nb);
        }
    } else {
        edits.push(last_line);
    }
    edits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(path: &str, content: &[u8]) -> FileSide {
        FileSide {
            path: BString::from(path),
            mode: FileMode::Regular,
            id: patch_hash::Hasher::hash_object("blob", content),
            content: Arc::new(content.to_vec()),
        }
    }

    fn modified(old: &[u8], new: &[u8]) -> FileDiffInput {
        FileDiffInput {
            kind: ChangeKind::Modified,
            old: Some(side("f.txt", old)),
            new: Some(side("f.txt", new)),
            score: None,
        }
    }

    fn engine() -> FileDiffEngine {
        FileDiffEngine::new(2, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn single_line_change() {
        let diff = engine()
            .diff_file(
                &modified(b"a\nb\nc", b"a\nB\nc"),
                DiffAlgorithm::Histogram,
                Whitespace::IgnoreNone,
            )
            .unwrap();
        assert_eq!(diff.edits, vec![Edit::new(1, 2, 1, 2)]);
        assert_eq!(diff.patch_type, PatchType::Unified);
        assert!(!diff.is_negative());
        assert!(diff.header.starts_with(b"diff --git a/f.txt b/f.txt\n"));
    }

    fn text_diff(old: &[u8], new: &[u8], algorithm: DiffAlgorithm) -> Vec<Edit> {
        FileDiffEngine::diff_text(old, new, algorithm, Whitespace::IgnoreNone)
    }

    #[test]
    fn missing_final_newline_touches_last_line_only() {
        let added = text_diff(b"x\ny", b"x\ny\n", DiffAlgorithm::Histogram);
        assert_eq!(added, vec![Edit::new(1, 2, 1, 2)]);
        let removed = text_diff(b"x\ny\n", b"x\ny", DiffAlgorithm::Myers);
        assert_eq!(removed, vec![Edit::new(1, 2, 1, 2)]);
    }

    #[test]
    fn appended_line_after_unterminated_line() {
        let edits = text_diff(b"a\nb", b"a\nb\nc\n", DiffAlgorithm::Histogram);
        assert_eq!(edits, vec![Edit::new(1, 2, 1, 3)]);
    }

    #[test]
    fn change_before_last_line_is_extended() {
        let edits = text_diff(b"a\nb\nc", b"a\nB\nc\n", DiffAlgorithm::Histogram);
        assert_eq!(edits, vec![Edit::new(1, 3, 1, 3)]);
    }

    #[test]
    fn binary_content_has_no_edits() {
        let diff = engine()
            .diff_file(
                &modified(b"a\0b", b"a\0c"),
                DiffAlgorithm::Histogram,
                Whitespace::IgnoreNone,
            )
            .unwrap();
        assert_eq!(diff.patch_type, PatchType::Binary);
        assert!(diff.edits.is_empty());
        assert!(diff.header.ends_with(b"differ\n"));
    }

    #[test]
    fn added_file_is_one_insert() {
        let input = FileDiffInput {
            kind: ChangeKind::Added,
            old: None,
            new: Some(side("new.txt", b"1\n2\n")),
            score: None,
        };
        let diff = engine()
            .diff_file(&input, DiffAlgorithm::Histogram, Whitespace::IgnoreNone)
            .unwrap();
        assert_eq!(diff.edits, vec![Edit::new(0, 0, 0, 2)]);
        assert_eq!(diff.old_path, None);
    }

    #[test]
    fn budget_overrun_is_reported_then_recovered() {
        let engine = FileDiffEngine::new(1, Duration::from_millis(50)).unwrap();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        // Occupy the only worker so the diff cannot start in time.
        engine.pool.spawn(move || {
            let _ = gate_rx.recv();
        });

        let input = modified(b"a\nb\nc\n", b"a\nx\nc\n");
        let bounded = FileDiffOptions {
            use_timeout: true,
            ..FileDiffOptions::default()
        };
        let err = engine.compute(&input, &bounded).unwrap_err();
        assert!(err.is_timeout());

        let diff = engine
            .diff_file(&input, DiffAlgorithm::Histogram, Whitespace::IgnoreNone)
            .unwrap();
        assert_eq!(diff.edits, vec![Edit::new(1, 2, 1, 2)]);
        drop(gate_tx);
    }

    #[test]
    fn negative_entry_keeps_metadata() {
        let input = modified(b"a\n", b"b\n");
        let negative = GitFileDiff::negative(&input);
        assert!(negative.is_negative());
        assert!(!negative.is_empty());
        assert_eq!(negative.new_path, Some(BString::from("f.txt")));
        assert!(GitFileDiff::empty().is_empty());
    }
}
