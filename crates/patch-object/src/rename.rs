//! Rename and copy detection.
//!
//! Pairs deleted and added entries into renames using exact id matching
//! first and line-based similarity scoring second. Copy detection looks for
//! sources of added files among modified files.

use std::collections::HashMap;

use bstr::ByteSlice;
use tracing::debug;

use crate::store::ObjectReader;
use crate::walk::{ChangeKind, TreeChange};
use crate::StoreError;

/// Settings for rename and copy detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameOptions {
    /// Minimum similarity percentage (0-100) to pair two files.
    pub score: u8,
    /// Also report copies.
    pub detect_copies: bool,
    /// Blobs larger than this are only matched by exact id.
    pub max_blob_size: u64,
    /// Skip fuzzy matching when sources × destinations exceeds this.
    pub max_candidates: usize,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            score: 60,
            detect_copies: false,
            max_blob_size: 10 * 1024 * 1024,
            max_candidates: 1000 * 1000,
        }
    }
}

/// Convert matching delete+add pairs into renames, and optionally added files
/// into copies. The output is ordered by reported path.
pub fn detect_renames<R: ObjectReader + ?Sized>(
    reader: &R,
    changes: Vec<TreeChange>,
    options: &RenameOptions,
) -> Result<Vec<TreeChange>, StoreError> {
    let mut slots: Vec<Option<TreeChange>> = changes.into_iter().map(Some).collect();

    let deleted: Vec<usize> = indices_of(&slots, ChangeKind::Deleted);
    let added: Vec<usize> = indices_of(&slots, ChangeKind::Added);
    let mut matched_deleted = vec![false; deleted.len()];
    let mut matched_added = vec![false; added.len()];
    // (deleted slot, added slot, score)
    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();

    // Phase 1: exact id match.
    for (di, &del) in deleted.iter().enumerate() {
        let Some(old_id) = slot(&slots, del).and_then(|c| c.old_id) else {
            continue;
        };
        for (ai, &add) in added.iter().enumerate() {
            if matched_added[ai] || is_type_change(&slots, del, add) {
                continue;
            }
            if slot(&slots, add).and_then(|c| c.new_id) == Some(old_id) {
                matched_deleted[di] = true;
                matched_added[ai] = true;
                pairs.push((del, add, 100));
                break;
            }
        }
    }

    // Phase 2: similarity.
    let remaining_pairs = deleted.len().saturating_mul(added.len());
    if options.score < 100 && remaining_pairs <= options.max_candidates {
        let mut added_content: HashMap<usize, Vec<u8>> = HashMap::new();
        for (di, &del) in deleted.iter().enumerate() {
            if matched_deleted[di] {
                continue;
            }
            let old_id = slot(&slots, del).and_then(|c| c.old_id);
            let Some(old_data) = load(reader, old_id, options)? else {
                continue;
            };

            let mut best: Option<(usize, u8)> = None;
            for (ai, &add) in added.iter().enumerate() {
                if matched_added[ai] || is_type_change(&slots, del, add) {
                    continue;
                }
                if !added_content.contains_key(&add) {
                    match load(reader, slot(&slots, add).and_then(|c| c.new_id), options)? {
                        Some(data) => {
                            added_content.insert(add, data);
                        }
                        None => continue,
                    }
                }
                let new_data = &added_content[&add];
                let score = similarity_score(&old_data, new_data);
                if score >= options.score && best.map_or(true, |(_, s)| score > s) {
                    best = Some((ai, score));
                }
            }

            if let Some((ai, score)) = best {
                matched_deleted[di] = true;
                matched_added[ai] = true;
                pairs.push((del, added[ai], score));
            }
        }
    } else if options.score < 100 {
        debug!(
            sources = deleted.len(),
            destinations = added.len(),
            "skipping inexact rename detection, too many candidates"
        );
    }

    for (del, add, score) in pairs {
        let Some(source) = slots[del].take() else {
            continue;
        };
        if let Some(target) = slots[add].as_mut() {
            target.kind = ChangeKind::Renamed;
            target.old_path = source.old_path;
            target.old_mode = source.old_mode;
            target.old_id = source.old_id;
            target.score = Some(score);
        }
    }

    if options.detect_copies {
        detect_copies(reader, &mut slots, options)?;
    }

    let mut result: Vec<TreeChange> = slots.into_iter().flatten().collect();
    result.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(result)
}

/// Mark added files whose content comes from a modified file as copies.
fn detect_copies<R: ObjectReader + ?Sized>(
    reader: &R,
    slots: &mut [Option<TreeChange>],
    options: &RenameOptions,
) -> Result<(), StoreError> {
    let sources: Vec<TreeChange> = slots
        .iter()
        .flatten()
        .filter(|c| matches!(c.kind, ChangeKind::Modified | ChangeKind::Renamed))
        .cloned()
        .collect();
    if sources.is_empty() {
        return Ok(());
    }

    for entry in slots.iter_mut() {
        let Some(change) = entry.as_mut() else {
            continue;
        };
        if change.kind != ChangeKind::Added {
            continue;
        }
        let Some(new_id) = change.new_id else {
            continue;
        };

        let mut best: Option<(&TreeChange, u8)> = None;
        if let Some(exact) = sources.iter().find(|s| s.old_id == Some(new_id)) {
            best = Some((exact, 100));
        } else if options.score < 100 {
            let Some(new_data) = load(reader, Some(new_id), options)? else {
                continue;
            };
            for source in &sources {
                let Some(src_data) = load(reader, source.old_id, options)? else {
                    continue;
                };
                let score = similarity_score(&src_data, &new_data);
                if score >= options.score && best.map_or(true, |(_, s)| score > s) {
                    best = Some((source, score));
                }
            }
        }

        if let Some((source, score)) = best {
            change.kind = ChangeKind::Copied;
            change.old_path = source.old_path.clone();
            change.old_mode = source.old_mode;
            change.old_id = source.old_id;
            change.score = Some(score);
        }
    }
    Ok(())
}

fn indices_of(slots: &[Option<TreeChange>], kind: ChangeKind) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_ref().is_some_and(|c| c.kind == kind))
        .map(|(i, _)| i)
        .collect()
}

/// A delete and an add at the same path are a type change, never a rename.
fn is_type_change(slots: &[Option<TreeChange>], del: usize, add: usize) -> bool {
    match (slot(slots, del), slot(slots, add)) {
        (Some(d), Some(a)) => d.old_path == a.new_path,
        _ => false,
    }
}

fn slot(slots: &[Option<TreeChange>], index: usize) -> Option<&TreeChange> {
    slots.get(index).and_then(|c| c.as_ref())
}

/// Read content for similarity scoring. Oversized blobs yield `None`; any
/// other failure propagates.
fn load<R: ObjectReader + ?Sized>(
    reader: &R,
    id: Option<patch_hash::ContentId>,
    options: &RenameOptions,
) -> Result<Option<Vec<u8>>, StoreError> {
    let Some(id) = id else {
        return Ok(None);
    };
    match reader.read_blob(&id, options.max_blob_size) {
        Ok(data) => Ok(Some(data)),
        Err(StoreError::TooLarge { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Similarity between two byte sequences (0-100).
///
/// `(base_size - delta_size) * 100 / base_size`, where the delta is the number
/// of bytes in lines present on only one side.
pub fn similarity_score(old: &[u8], new: &[u8]) -> u8 {
    if old.is_empty() && new.is_empty() {
        return 100;
    }
    if old.is_empty() || new.is_empty() {
        return 0;
    }

    let base_size = old.len().max(new.len());
    let delta_size = edit_distance_approx(old, new);
    if delta_size >= base_size {
        0
    } else {
        ((base_size - delta_size) * 100 / base_size) as u8
    }
}

fn edit_distance_approx(old: &[u8], new: &[u8]) -> usize {
    let mut old_counts: HashMap<&[u8], usize> = HashMap::new();
    for line in old.lines_with_terminator() {
        *old_counts.entry(line).or_insert(0) += 1;
    }

    let mut unmatched = 0usize;
    for line in new.lines_with_terminator() {
        match old_counts.get_mut(line) {
            Some(count) if *count > 0 => *count -= 1,
            _ => unmatched += line.len(),
        }
    }
    unmatched + old_counts.iter().map(|(line, count)| line.len() * count).sum::<usize>()
}
