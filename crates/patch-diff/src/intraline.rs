//! Character-level refinement of replace edits.
//!
//! Each replace edit is re-diffed character by character over the text of
//! its line ranges (line feeds included), then cleaned up so that the
//! highlighted spans read naturally: nearby spans are joined, spans are
//! trimmed of shared edges and slid onto line boundaries. Offsets of
//! sub-edits count characters from the start of the edit's first line.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bstr::ByteSlice;
use crossbeam::channel::{self, RecvTimeoutError};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::algorithm::{self, CancelToken, Cancelled, DiffAlgorithm};
use crate::edit::{Edit, EditKind, ReplaceEdit};
use crate::text::Text;
use crate::DiffError;

/// Lines that carry no meaning of their own: blank, a lone brace, or a
/// comment opener/continuation.
pub const DEFAULT_BLANK_LINE_PATTERN: &str = r"^[ \t]*(|[{}]|/\*\*?|\*)[ \t]*$";

/// Lines opening a control block.
pub const DEFAULT_CONTROL_BLOCK_PATTERN: &str = r"[{:][ \t]*$";

/// Sub-edits at most this many characters apart are joined.
pub const DEFAULT_COALESCE_DISTANCE: usize = 5;

/// Outcome of a refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntraLineStatus {
    Ok,
    Timeout,
    Error,
}

/// Refined edits of one file. Non-replace edits carry no sub-edits. When
/// the status is not `Ok` the edit list is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntraLineDiff {
    pub status: IntraLineStatus,
    pub edits: Vec<ReplaceEdit>,
}

impl IntraLineDiff {
    fn failed(status: IntraLineStatus) -> Self {
        Self {
            status,
            edits: Vec::new(),
        }
    }
}

/// Tunable thresholds of the clean-up heuristics.
#[derive(Debug, Clone)]
pub struct IntraLineHeuristics {
    coalesce_distance: usize,
    blank_line: Regex,
    control_block: Regex,
}

impl IntraLineHeuristics {
    pub fn new(
        coalesce_distance: usize,
        blank_line_pattern: &str,
        control_block_pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            coalesce_distance,
            blank_line: Regex::new(blank_line_pattern)?,
            control_block: Regex::new(control_block_pattern)?,
        })
    }

    /// Whether every line in `[begin, end)` may be absorbed into a
    /// surrounding edit.
    fn is_filler(&self, text: &Text<'_>, begin: usize, end: usize) -> bool {
        (begin..end).all(|i| {
            let line = text.line_content(i);
            self.blank_line.is_match(line) || self.control_block.is_match(line)
        })
    }
}

impl Default for IntraLineHeuristics {
    fn default() -> Self {
        Self {
            coalesce_distance: DEFAULT_COALESCE_DISTANCE,
            blank_line: Regex::new(DEFAULT_BLANK_LINE_PATTERN).expect("built-in pattern compiles"),
            control_block: Regex::new(DEFAULT_CONTROL_BLOCK_PATTERN)
                .expect("built-in pattern compiles"),
        }
    }
}

/// Runs refinements on a bounded worker pool under a time budget.
pub struct IntraLineDiffEngine {
    pool: rayon::ThreadPool,
    timeout: Duration,
    heuristics: Arc<IntraLineHeuristics>,
}

impl IntraLineDiffEngine {
    pub fn new(
        threads: usize,
        timeout: Duration,
        heuristics: IntraLineHeuristics,
    ) -> Result<Self, DiffError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("intraline-worker-{i}"))
            .panic_handler(|_| error!("intra-line worker panicked"))
            .build()
            .map_err(|e| DiffError::Worker(e.to_string()))?;
        Ok(Self {
            pool,
            timeout,
            heuristics: Arc::new(heuristics),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Refine the replace edits of one file. `rebase_edits` are never joined
    /// with their neighbours.
    pub fn refine(
        &self,
        old: Arc<Vec<u8>>,
        new: Arc<Vec<u8>>,
        edits: Vec<Edit>,
        rebase_edits: HashSet<Edit>,
    ) -> IntraLineDiff {
        let (tx, rx) = channel::bounded(1);
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let heuristics = Arc::clone(&self.heuristics);
        self.pool.spawn(move || {
            let a = Text::new(&old);
            let b = Text::new(&new);
            let result = refine_all(&a, &b, edits, &rebase_edits, &heuristics, &worker_cancel);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(edits)) => IntraLineDiff {
                status: IntraLineStatus::Ok,
                edits,
            },
            Ok(Err(Cancelled)) | Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                debug!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "intra-line diff timed out"
                );
                IntraLineDiff::failed(IntraLineStatus::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => IntraLineDiff::failed(IntraLineStatus::Error),
        }
    }
}

/// Refine every replace edit of a file.
pub fn refine_all(
    a: &Text<'_>,
    b: &Text<'_>,
    edits: Vec<Edit>,
    rebase_edits: &HashSet<Edit>,
    heuristics: &IntraLineHeuristics,
    cancel: &CancelToken,
) -> Result<Vec<ReplaceEdit>, Cancelled> {
    let edits = combine_line_edits(edits, rebase_edits, a, b, heuristics);
    edits
        .into_iter()
        .map(|edit| match edit.kind() {
            EditKind::Replace => refine_edit(a, b, edit, heuristics, cancel),
            _ => Ok(ReplaceEdit::new(edit, Vec::new())),
        })
        .collect()
}

/// Join line edits separated by a single filler line on both sides.
fn combine_line_edits(
    mut edits: Vec<Edit>,
    rebase_edits: &HashSet<Edit>,
    a: &Text<'_>,
    b: &Text<'_>,
    heuristics: &IntraLineHeuristics,
) -> Vec<Edit> {
    let mut j = 0;
    while j + 1 < edits.len() {
        let c = edits[j];
        let n = edits[j + 1];
        if rebase_edits.contains(&c) || rebase_edits.contains(&n) {
            j += 1;
            continue;
        }
        if n.begin_a() - c.end_a() == 1
            && n.begin_b() - c.end_b() == 1
            && heuristics.is_filler(a, c.end_a(), n.begin_a())
            && heuristics.is_filler(b, c.end_b(), n.begin_b())
        {
            edits[j] = Edit::new(c.begin_a(), n.end_a(), c.begin_b(), n.end_b());
            edits.remove(j + 1);
            continue;
        }
        j += 1;
    }
    edits
}

/// Refine a single replace edit into character-level sub-edits.
pub fn refine_edit(
    a: &Text<'_>,
    b: &Text<'_>,
    edit: Edit,
    heuristics: &IntraLineHeuristics,
    cancel: &CancelToken,
) -> Result<ReplaceEdit, Cancelled> {
    let a_chars: Vec<char> = a.data()[a.byte_range(edit.begin_a(), edit.end_a())]
        .chars()
        .collect();
    let b_chars: Vec<char> = b.data()[b.byte_range(edit.begin_b(), edit.end_b())]
        .chars()
        .collect();
    let a = a_chars.as_slice();
    let b = b_chars.as_slice();

    let mut subs = algorithm::diff(DiffAlgorithm::Myers, a, b, cancel)?;
    coalesce(&mut subs, a, b, heuristics.coalesce_distance);

    let mut j = 0;
    while j < subs.len() {
        let c = subs[j];
        let (mut ab, mut ae, mut bb, mut be) = (c.begin_a(), c.end_a(), c.begin_b(), c.end_b());

        // An insert or delete that ended up flush against this edit
        // belongs to it.
        if j > 0 {
            let p = subs[j - 1];
            if p.end_a() == ab || p.end_b() == bb {
                if p.end_a() == ab && p.begin_a() < p.end_a() {
                    ab = p.begin_a();
                }
                if p.end_b() == bb && p.begin_b() < p.end_b() {
                    bb = p.begin_b();
                }
                subs.remove(j - 1);
                j -= 1;
            }
        }

        // Drop edges that are identical on both sides.
        while ab < ae && bb < be && a[ab] == b[bb] {
            ab += 1;
            bb += 1;
        }
        while ab < ae && bb < be && a[ae - 1] == b[be - 1] {
            ae -= 1;
            be -= 1;
        }

        (ab, ae) = slide(a, ab, ae);
        (bb, be) = slide(b, bb, be);
        ae = swallow_line_feed(a, ab, ae);
        be = swallow_line_feed(b, bb, be);

        subs[j] = Edit::new(ab, ae, bb, be);
        j += 1;
    }

    Ok(ReplaceEdit::new(edit, subs))
}

/// Join sub-edits separated by a short run of characters without a line
/// break.
fn coalesce(subs: &mut Vec<Edit>, a: &[char], b: &[char], distance: usize) {
    let mut j = 0;
    while j + 1 < subs.len() {
        let c = subs[j];
        let n = subs[j + 1];
        if (n.begin_a() - c.end_a() <= distance || n.begin_b() - c.end_b() <= distance)
            && !a[c.end_a()..n.begin_a()].contains(&'\n')
            && !b[c.end_b()..n.begin_b()].contains(&'\n')
        {
            subs[j] = Edit::new(c.begin_a(), n.end_a(), c.begin_b(), n.end_b());
            subs.remove(j + 1);
            continue;
        }
        j += 1;
    }
}

/// Move a span whose leading part repeats its trailing part so that it
/// starts at a line start, or ends at a line end, where possible.
fn slide(text: &[char], mut begin: usize, mut end: usize) -> (usize, usize) {
    while 0 < begin && begin < end && text[begin - 1] != '\n' && text[begin - 1] == text[end - 1] {
        begin -= 1;
        end -= 1;
    }
    let at_line_start = begin == 0 || text[begin - 1] == '\n';
    if !at_line_start || !text[begin..end].contains(&'\n') {
        while begin < end && end < text.len() && text[begin] == text[end] {
            begin += 1;
            end += 1;
            if text[end - 1] == '\n' {
                break;
            }
        }
    }
    (begin, end)
}

/// Extend a span covering a whole line except its line feed to include
/// the line feed, unless that line feed ends the region.
fn swallow_line_feed(text: &[char], begin: usize, end: usize) -> usize {
    if begin < end
        && (begin == 0 || text[begin - 1] == '\n')
        && end + 1 < text.len()
        && text[end - 1] != '\n'
        && text[end] == '\n'
    {
        end + 1
    } else {
        end
    }
}
