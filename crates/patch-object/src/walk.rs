//! Tree-to-tree walk.
//!
//! Walks two tree objects in parallel (sorted by git's tree entry order) and
//! reports entry-level changes. Blob content is never read here; changes are
//! decided from modes and ids alone.

use std::cmp::Ordering;

use bstr::BString;
use patch_hash::ContentId;
use serde::{Deserialize, Serialize};

use crate::store::ObjectReader;
use crate::{FileMode, StoreError, TreeEntry};

/// How a file changed between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    /// Content type changed at the same path (e.g. file became a symlink).
    Rewrite,
}

impl ChangeKind {
    /// Single-letter status code.
    pub fn as_char(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Rewrite => 'W',
        }
    }
}

/// A single file-level change between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeChange {
    pub kind: ChangeKind,
    pub old_path: Option<BString>,
    pub new_path: Option<BString>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub old_id: Option<ContentId>,
    pub new_id: Option<ContentId>,
    /// Similarity percentage for renames and copies.
    pub score: Option<u8>,
}

impl TreeChange {
    pub fn added(path: BString, mode: FileMode, id: ContentId) -> Self {
        Self {
            kind: ChangeKind::Added,
            old_path: None,
            new_path: Some(path),
            old_mode: None,
            new_mode: Some(mode),
            old_id: None,
            new_id: Some(id),
            score: None,
        }
    }

    pub fn deleted(path: BString, mode: FileMode, id: ContentId) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            old_path: Some(path),
            new_path: None,
            old_mode: Some(mode),
            new_mode: None,
            old_id: Some(id),
            new_id: None,
            score: None,
        }
    }

    /// The path this change is reported under: the new path, or the old path
    /// for deletions.
    pub fn path(&self) -> &[u8] {
        self.new_path
            .as_ref()
            .or(self.old_path.as_ref())
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }
}

/// Diff two trees. Either id can be `None` to represent the empty tree.
pub fn diff_trees<R: ObjectReader + ?Sized>(
    reader: &R,
    old_tree: Option<&ContentId>,
    new_tree: Option<&ContentId>,
) -> Result<Vec<TreeChange>, StoreError> {
    let old = match old_tree {
        Some(id) => Some(reader.read_tree(id)?),
        None => None,
    };
    let new = match new_tree {
        Some(id) => Some(reader.read_tree(id)?),
        None => None,
    };

    let old_entries = old.as_ref().map_or(&[][..], |t| &t.entries);
    let new_entries = new.as_ref().map_or(&[][..], |t| &t.entries);

    let mut changes = Vec::new();
    diff_tree_entries(reader, old_entries, new_entries, &BString::from(""), &mut changes)?;
    Ok(changes)
}

fn diff_tree_entries<R: ObjectReader + ?Sized>(
    reader: &R,
    old_entries: &[TreeEntry],
    new_entries: &[TreeEntry],
    prefix: &BString,
    changes: &mut Vec<TreeChange>,
) -> Result<(), StoreError> {
    let mut oi = 0;
    let mut ni = 0;

    loop {
        match (old_entries.get(oi), new_entries.get(ni)) {
            (Some(old_entry), Some(new_entry)) => {
                match TreeEntry::cmp_entries(old_entry, new_entry) {
                    Ordering::Less => {
                        collect_deleted(reader, old_entry, prefix, changes)?;
                        oi += 1;
                    }
                    Ordering::Greater => {
                        collect_added(reader, new_entry, prefix, changes)?;
                        ni += 1;
                    }
                    Ordering::Equal => {
                        if old_entry.id != new_entry.id || old_entry.mode != new_entry.mode {
                            collect_modified(reader, old_entry, new_entry, prefix, changes)?;
                        }
                        oi += 1;
                        ni += 1;
                    }
                }
            }
            (Some(old_entry), None) => {
                collect_deleted(reader, old_entry, prefix, changes)?;
                oi += 1;
            }
            (None, Some(new_entry)) => {
                collect_added(reader, new_entry, prefix, changes)?;
                ni += 1;
            }
            (None, None) => break,
        }
    }

    Ok(())
}

fn full_path(prefix: &BString, name: &BString) -> BString {
    if prefix.is_empty() {
        name.clone()
    } else {
        let mut p = prefix.clone();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

fn collect_deleted<R: ObjectReader + ?Sized>(
    reader: &R,
    entry: &TreeEntry,
    prefix: &BString,
    changes: &mut Vec<TreeChange>,
) -> Result<(), StoreError> {
    let path = full_path(prefix, &entry.name);
    if entry.mode.is_tree() {
        let tree = reader.read_tree(&entry.id)?;
        diff_tree_entries(reader, &tree.entries, &[], &path, changes)
    } else {
        changes.push(TreeChange::deleted(path, entry.mode, entry.id));
        Ok(())
    }
}

fn collect_added<R: ObjectReader + ?Sized>(
    reader: &R,
    entry: &TreeEntry,
    prefix: &BString,
    changes: &mut Vec<TreeChange>,
) -> Result<(), StoreError> {
    let path = full_path(prefix, &entry.name);
    if entry.mode.is_tree() {
        let tree = reader.read_tree(&entry.id)?;
        diff_tree_entries(reader, &[], &tree.entries, &path, changes)
    } else {
        changes.push(TreeChange::added(path, entry.mode, entry.id));
        Ok(())
    }
}

fn collect_modified<R: ObjectReader + ?Sized>(
    reader: &R,
    old_entry: &TreeEntry,
    new_entry: &TreeEntry,
    prefix: &BString,
    changes: &mut Vec<TreeChange>,
) -> Result<(), StoreError> {
    let path = full_path(prefix, &new_entry.name);

    if old_entry.mode.is_tree() && new_entry.mode.is_tree() {
        let old_tree = reader.read_tree(&old_entry.id)?;
        let new_tree = reader.read_tree(&new_entry.id)?;
        return diff_tree_entries(reader, &old_tree.entries, &new_tree.entries, &path, changes);
    }

    // A change of content type is reported as a delete followed by an add so
    // that each side keeps a consistent mode.
    if !old_entry.mode.same_content_type(new_entry.mode) {
        changes.push(TreeChange::deleted(path.clone(), old_entry.mode, old_entry.id));
        changes.push(TreeChange::added(path, new_entry.mode, new_entry.id));
        return Ok(());
    }

    changes.push(TreeChange {
        kind: ChangeKind::Modified,
        old_path: Some(path.clone()),
        new_path: Some(path),
        old_mode: Some(old_entry.mode),
        new_mode: Some(new_entry.mode),
        old_id: Some(old_entry.id),
        new_id: Some(new_entry.id),
        score: None,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::Repository;

    #[test]
    fn added_modified_deleted() {
        let repo = MemoryRepository::new();
        let old = repo.write_tree(&[
            ("keep.txt", b"same\n"),
            ("mod.txt", b"a\n"),
            ("gone.txt", b"x\n"),
        ]);
        let new = repo.write_tree(&[
            ("keep.txt", b"same\n"),
            ("mod.txt", b"b\n"),
            ("new.txt", b"y\n"),
        ]);

        let reader = repo.reader();
        let changes = diff_trees(&*reader, Some(&old), Some(&new)).unwrap();
        let summary: Vec<(char, &[u8])> = changes
            .iter()
            .map(|c| (c.kind.as_char(), c.path()))
            .collect();
        assert_eq!(
            summary,
            vec![('D', &b"gone.txt"[..]), ('M', &b"mod.txt"[..]), ('A', &b"new.txt"[..])]
        );
    }

    #[test]
    fn nested_paths_are_joined() {
        let repo = MemoryRepository::new();
        let new = repo.write_tree(&[("dir/sub/file.rs", b"fn main() {}\n")]);
        let reader = repo.reader();
        let changes = diff_trees(&*reader, None, Some(&new)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), b"dir/sub/file.rs");
        assert_eq!(changes[0].kind, ChangeKind::Added);
    }

    #[test]
    fn type_change_splits_into_delete_and_add() {
        let repo = MemoryRepository::new();
        let old = repo.write_tree_with_modes(&[("link", FileMode::Regular, b"target")]);
        let new = repo.write_tree_with_modes(&[("link", FileMode::Symlink, b"target")]);
        let reader = repo.reader();
        let changes = diff_trees(&*reader, Some(&old), Some(&new)).unwrap();
        let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Deleted, ChangeKind::Added]);
    }

    #[test]
    fn mode_only_change_is_modification() {
        let repo = MemoryRepository::new();
        let old = repo.write_tree_with_modes(&[("run.sh", FileMode::Regular, b"echo\n")]);
        let new = repo.write_tree_with_modes(&[("run.sh", FileMode::Executable, b"echo\n")]);
        let reader = repo.reader();
        let changes = diff_trees(&*reader, Some(&old), Some(&new)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[0].old_id, changes[0].new_id);
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[("a", b"1\n")]);
        let reader = repo.reader();
        assert!(diff_trees(&*reader, Some(&tree), Some(&tree)).unwrap().is_empty());
    }
}
