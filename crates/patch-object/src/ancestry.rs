//! Commit ancestry: merge bases and reachability.
//!
//! Merge bases use the paint algorithm. Commits reachable from each input are
//! marked with a different flag; a commit carrying both flags is a common
//! ancestor, and its own ancestors are marked stale so that only the lowest
//! common ancestors are reported.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use patch_hash::ContentId;

use crate::store::ObjectReader;
use crate::StoreError;

const PARENT1: u8 = 1;
const PARENT2: u8 = 2;
const STALE: u8 = 4;
const RESULT: u8 = 8;

struct PaintEntry {
    id: ContentId,
    date: i64,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PaintEntry {}

impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap by date (newest first).
        self.date.cmp(&other.date).then_with(|| self.id.cmp(&other.id))
    }
}

/// All merge bases of two commits, best first.
pub fn merge_bases<R: ObjectReader + ?Sized>(
    reader: &R,
    a: &ContentId,
    b: &ContentId,
) -> Result<Vec<ContentId>, StoreError> {
    if a == b {
        return Ok(vec![*a]);
    }
    let candidates = paint_down_to_common(reader, a, b)?;
    remove_redundant(reader, candidates)
}

/// The single best merge base, if the commits share history.
pub fn merge_base<R: ObjectReader + ?Sized>(
    reader: &R,
    a: &ContentId,
    b: &ContentId,
) -> Result<Option<ContentId>, StoreError> {
    Ok(merge_bases(reader, a, b)?.into_iter().next())
}

fn paint_down_to_common<R: ObjectReader + ?Sized>(
    reader: &R,
    a: &ContentId,
    b: &ContentId,
) -> Result<Vec<ContentId>, StoreError> {
    let mut flags: HashMap<ContentId, u8> = HashMap::new();
    let mut queue: BinaryHeap<PaintEntry> = BinaryHeap::new();
    let mut results: Vec<ContentId> = Vec::new();

    for (id, flag) in [(*a, PARENT1), (*b, PARENT2)] {
        let commit = reader.read_commit(&id)?;
        flags.insert(id, flag);
        queue.push(PaintEntry {
            id,
            date: commit.committer.time,
        });
    }

    while queue_has_nonstale(&queue, &flags) {
        let Some(entry) = queue.pop() else {
            break;
        };
        let mut current = flags.get(&entry.id).copied().unwrap_or(0);

        if current & (PARENT1 | PARENT2) == (PARENT1 | PARENT2) {
            if current & RESULT == 0 && current & STALE == 0 {
                results.push(entry.id);
            }
            current |= RESULT | STALE;
            flags.insert(entry.id, current);
        }

        let commit = reader.read_commit(&entry.id)?;
        let propagate = current & (PARENT1 | PARENT2 | STALE);
        for parent in &commit.parents {
            let parent_flags = flags.entry(*parent).or_insert(0);
            if *parent_flags & propagate == propagate {
                continue;
            }
            *parent_flags |= propagate;
            let parent_commit = reader.read_commit(parent)?;
            queue.push(PaintEntry {
                id: *parent,
                date: parent_commit.committer.time,
            });
        }
    }

    Ok(results)
}

fn queue_has_nonstale(queue: &BinaryHeap<PaintEntry>, flags: &HashMap<ContentId, u8>) -> bool {
    queue.iter().any(|entry| {
        let f = flags.get(&entry.id).copied().unwrap_or(0);
        f & STALE == 0
    })
}

/// Drop bases that are ancestors of another base.
fn remove_redundant<R: ObjectReader + ?Sized>(
    reader: &R,
    bases: Vec<ContentId>,
) -> Result<Vec<ContentId>, StoreError> {
    if bases.len() <= 1 {
        return Ok(bases);
    }

    let mut redundant: HashSet<usize> = HashSet::new();
    for i in 0..bases.len() {
        for j in 0..bases.len() {
            if i == j || redundant.contains(&j) {
                continue;
            }
            if is_ancestor(reader, &bases[i], &bases[j])? {
                redundant.insert(i);
                break;
            }
        }
    }

    Ok(bases
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !redundant.contains(idx))
        .map(|(_, id)| id)
        .collect())
}

/// Whether `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor).
pub fn is_ancestor<R: ObjectReader + ?Sized>(
    reader: &R,
    ancestor: &ContentId,
    descendant: &ContentId,
) -> Result<bool, StoreError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(*descendant);
    visited.insert(*descendant);

    while let Some(current) = queue.pop_front() {
        if current == *ancestor {
            return Ok(true);
        }
        let commit = reader.read_commit(&current)?;
        for parent in &commit.parents {
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(false)
}

/// Commits reachable from `include` but not from any of `exclude`, newest
/// first. At most `limit` commits are returned.
pub fn reachable_excluding<R: ObjectReader + ?Sized>(
    reader: &R,
    include: &[ContentId],
    exclude: &[ContentId],
    limit: usize,
) -> Result<Vec<ContentId>, StoreError> {
    let mut excluded: HashSet<ContentId> = HashSet::new();
    let mut queue: VecDeque<ContentId> = exclude.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !excluded.insert(id) {
            continue;
        }
        let commit = reader.read_commit(&id)?;
        queue.extend(commit.parents.iter().copied());
    }

    let mut seen: HashSet<ContentId> = HashSet::new();
    let mut heap: BinaryHeap<PaintEntry> = BinaryHeap::new();
    for id in include {
        if !excluded.contains(id) && seen.insert(*id) {
            let commit = reader.read_commit(id)?;
            heap.push(PaintEntry {
                id: *id,
                date: commit.committer.time,
            });
        }
    }

    let mut result = Vec::new();
    while let Some(entry) = heap.pop() {
        if result.len() >= limit {
            break;
        }
        result.push(entry.id);
        let commit = reader.read_commit(&entry.id)?;
        for parent in &commit.parents {
            if excluded.contains(parent) || !seen.insert(*parent) {
                continue;
            }
            let parent_commit = reader.read_commit(parent)?;
            heap.push(PaintEntry {
                id: *parent,
                date: parent_commit.committer.time,
            });
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::Repository;

    struct History {
        repo: MemoryRepository,
        root: ContentId,
        left: ContentId,
        right: ContentId,
        merge: ContentId,
    }

    //   root -- left ---- merge
    //       \            /
    //        -- right --
    fn history() -> History {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[("f", b"1\n")]);
        let root = repo.commit(tree, &[], "root\n");
        let left = repo.commit(tree, &[root], "left\n");
        let right = repo.commit(tree, &[root], "right\n");
        let merge = repo.commit(tree, &[left, right], "merge\n");
        History {
            repo,
            root,
            left,
            right,
            merge,
        }
    }

    #[test]
    fn base_of_diverged_branches() {
        let h = history();
        let reader = h.repo.reader();
        assert_eq!(merge_base(&*reader, &h.left, &h.right).unwrap(), Some(h.root));
    }

    #[test]
    fn base_with_ancestor_is_ancestor() {
        let h = history();
        let reader = h.repo.reader();
        assert_eq!(merge_base(&*reader, &h.merge, &h.left).unwrap(), Some(h.left));
        assert!(is_ancestor(&*reader, &h.root, &h.merge).unwrap());
        assert!(!is_ancestor(&*reader, &h.left, &h.right).unwrap());
    }

    #[test]
    fn unrelated_roots_have_no_base() {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[]);
        let a = repo.commit(tree, &[], "a\n");
        let b = repo.commit(tree, &[], "b\n");
        assert_eq!(merge_base(&*repo.reader(), &a, &b).unwrap(), None);
    }

    #[test]
    fn reachable_from_second_parent_only() {
        let h = history();
        let reader = h.repo.reader();
        let commits = reachable_excluding(&*reader, &[h.right], &[h.left], 10).unwrap();
        assert_eq!(commits, vec![h.right]);
        let limited = reachable_excluding(&*reader, &[h.merge], &[], 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0], h.merge);
    }
}
