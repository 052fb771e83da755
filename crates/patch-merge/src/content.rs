//! Three-way content merge using line edits.
//!
//! Takes base, ours, and theirs versions of a file and produces a merged
//! result, inserting conflict markers where changes overlap or touch.

use bstr::ByteSlice;
use patch_diff::text::Text;
use patch_diff::{DiffAlgorithm, Edit, FileDiffEngine, Whitespace};
use patch_hash::ContentId;
use patch_object::Commit;

use crate::ContentMergeResult;

/// Labels for conflict markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLabels {
    pub ours: String,
    pub theirs: String,
}

impl Default for MergeLabels {
    fn default() -> Self {
        Self {
            ours: "HEAD".into(),
            theirs: "BRANCH".into(),
        }
    }
}

impl MergeLabels {
    /// `HEAD (<abbrev> <subject>)` and `BRANCH (<abbrev> <subject>)`.
    pub fn for_commits(
        ours_id: &ContentId,
        ours: &Commit,
        theirs_id: &ContentId,
        theirs: &Commit,
    ) -> Self {
        Self {
            ours: format!("HEAD ({} {})", ours_id.abbreviate(6), ours.summary().as_bstr()),
            theirs: format!(
                "BRANCH ({} {})",
                theirs_id.abbreviate(6),
                theirs.summary().as_bstr()
            ),
        }
    }
}

/// Perform a three-way content merge.
///
/// Diffs base->ours and base->theirs, then interleaves non-overlapping
/// changes and reports conflicts for regions both sides changed differently.
pub fn merge_content(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    algorithm: DiffAlgorithm,
    labels: &MergeLabels,
) -> ContentMergeResult {
    if ours == theirs || base == theirs {
        return ContentMergeResult::Clean(ours.to_vec());
    }
    if base == ours {
        return ContentMergeResult::Clean(theirs.to_vec());
    }

    let base_text = Text::new(base);
    let ours_text = Text::new(ours);
    let theirs_text = Text::new(theirs);
    let ours_edits = FileDiffEngine::diff_text(base, ours, algorithm, Whitespace::IgnoreNone);
    let theirs_edits = FileDiffEngine::diff_text(base, theirs, algorithm, Whitespace::IgnoreNone);

    let mut output = Vec::with_capacity(base.len().max(ours.len()).max(theirs.len()));
    let mut conflict_count = 0;
    let mut base_pos = 0;
    let (mut oi, mut ti) = (0, 0);

    loop {
        let first = match (ours_edits.get(oi), theirs_edits.get(ti)) {
            (Some(o), Some(t)) if o.begin_a() <= t.begin_a() => *o,
            (Some(_), Some(t)) => *t,
            (Some(o), None) => *o,
            (None, Some(t)) => *t,
            (None, None) => break,
        };

        // Grow the region while either side has an edit inside or touching it.
        let start = first.begin_a();
        let mut end = first.end_a();
        let (ours_from, theirs_from) = (oi, ti);
        loop {
            let mut grew = false;
            while let Some(e) = ours_edits.get(oi).filter(|e| e.begin_a() <= end) {
                end = end.max(e.end_a());
                oi += 1;
                grew = true;
            }
            while let Some(e) = theirs_edits.get(ti).filter(|e| e.begin_a() <= end) {
                end = end.max(e.end_a());
                ti += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        output.extend_from_slice(lines(&base_text, base_pos, start));
        let ours_region = &ours_edits[ours_from..oi];
        let theirs_region = &theirs_edits[theirs_from..ti];
        let ours_chunk = side_chunk(&base_text, &ours_text, ours_region, start, end);
        let theirs_chunk = side_chunk(&base_text, &theirs_text, theirs_region, start, end);

        if theirs_region.is_empty() || ours_chunk == theirs_chunk {
            output.extend_from_slice(ours_chunk);
        } else if ours_region.is_empty() {
            output.extend_from_slice(theirs_chunk);
        } else {
            conflict_count += 1;
            emit_conflict(&mut output, ours_chunk, theirs_chunk, labels);
        }
        base_pos = end;
    }
    output.extend_from_slice(lines(&base_text, base_pos, base_text.len()));

    if conflict_count > 0 {
        ContentMergeResult::Conflict {
            content: output,
            conflict_count,
        }
    } else {
        ContentMergeResult::Clean(output)
    }
}

fn lines<'a>(text: &Text<'a>, begin: usize, end: usize) -> &'a [u8] {
    &text.data()[text.byte_range(begin, end)]
}

/// The content a side has in place of base lines `[start, end)`, given the
/// side's edits inside that region.
fn side_chunk<'a>(
    base: &Text<'a>,
    side: &Text<'a>,
    region: &[Edit],
    start: usize,
    end: usize,
) -> &'a [u8] {
    match (region.first(), region.last()) {
        (Some(first), Some(last)) => {
            let begin = first.begin_b() - (first.begin_a() - start);
            let stop = last.end_b() + (end - last.end_a());
            lines(side, begin, stop)
        }
        _ => lines(base, start, end),
    }
}

fn emit_conflict(output: &mut Vec<u8>, ours: &[u8], theirs: &[u8], labels: &MergeLabels) {
    output.extend_from_slice(b"<<<<<<< ");
    output.extend_from_slice(labels.ours.as_bytes());
    output.push(b'\n');
    push_terminated(output, ours);
    output.extend_from_slice(b"=======\n");
    push_terminated(output, theirs);
    output.extend_from_slice(b">>>>>>> ");
    output.extend_from_slice(labels.theirs.as_bytes());
    output.push(b'\n');
}

fn push_terminated(output: &mut Vec<u8>, chunk: &[u8]) {
    output.extend_from_slice(chunk);
    if !chunk.is_empty() && !chunk.ends_with(b"\n") {
        output.push(b'\n');
    }
}
