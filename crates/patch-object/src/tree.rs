use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use patch_hash::ContentId;
use serde::{Deserialize, Serialize};

/// File mode for tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule link (160000)
    Gitlink,
    /// Subdirectory (040000)
    Tree,
    /// Unknown mode (preserved for round-trip)
    Unknown(u32),
}

impl FileMode {
    /// Create from the raw numeric value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Gitlink,
            0o040000 => Self::Tree,
            other => Self::Unknown(other),
        }
    }

    /// Get the raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o40000,
            Self::Unknown(v) => *v,
        }
    }

    /// Octal representation as used in tree objects and diff headers.
    pub fn to_octal(&self) -> String {
        format!("{:o}", self.raw())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    /// Regular or executable file.
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub fn is_gitlink(&self) -> bool {
        matches!(self, Self::Gitlink)
    }

    /// Whether content of this mode counts toward file sizes.
    pub fn has_content_size(&self) -> bool {
        self.is_blob() || self.is_symlink()
    }

    /// Whether two modes carry the same kind of content (e.g. regular and
    /// executable are both plain blobs, a symlink is not).
    pub fn same_content_type(self, other: FileMode) -> bool {
        self.is_blob() == other.is_blob()
            && self.is_symlink() == other.is_symlink()
            && self.is_gitlink() == other.is_gitlink()
    }
}

/// A single entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub id: ContentId,
}

impl TreeEntry {
    /// Compare entries using git's tree sorting rules.
    ///
    /// Directories sort as if they have a trailing '/'.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        base_name_compare(
            a.name.as_ref(),
            a.mode.is_tree(),
            b.name.as_ref(),
            b.mode.is_tree(),
        )
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

fn base_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let next = |name: &[u8], is_dir: bool| {
        if name.len() > min_len {
            name[min_len]
        } else if is_dir {
            b'/'
        } else {
            0
        }
    };
    next(name1, is_dir1).cmp(&next(name2, is_dir2))
}

/// A directory listing. Entries are kept in git canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from entries in any order.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Canonical binary encoding: `<mode-octal> <name>\0<20-byte id>` per entry.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort();

        let mut out = Vec::new();
        for entry in sorted {
            out.extend_from_slice(entry.mode.to_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: FileMode, name: &str) -> TreeEntry {
        TreeEntry {
            mode,
            name: BString::from(name),
            id: ContentId::NULL,
        }
    }

    #[test]
    fn mode_predicates() {
        assert!(FileMode::Tree.is_tree());
        assert!(FileMode::Regular.is_blob());
        assert!(FileMode::Executable.is_blob());
        assert!(!FileMode::Symlink.is_blob());
        assert!(FileMode::Symlink.has_content_size());
        assert!(!FileMode::Gitlink.has_content_size());
    }

    #[test]
    fn mode_content_type() {
        assert!(FileMode::Regular.same_content_type(FileMode::Executable));
        assert!(!FileMode::Regular.same_content_type(FileMode::Symlink));
        assert!(!FileMode::Gitlink.same_content_type(FileMode::Regular));
    }

    #[test]
    fn mode_octal() {
        assert_eq!(FileMode::Regular.to_octal(), "100644");
        assert_eq!(FileMode::Tree.to_octal(), "40000");
        assert_eq!(FileMode::from_raw(0o100755), FileMode::Executable);
    }

    #[test]
    fn dir_sorts_after_dotted_file() {
        // "foo/" > "foo.c" because '/' (0x2F) > '.' (0x2E).
        let dir = entry(FileMode::Tree, "foo");
        let file = entry(FileMode::Regular, "foo.c");
        assert_eq!(TreeEntry::cmp_entries(&dir, &file), Ordering::Greater);
    }

    #[test]
    fn from_entries_sorts() {
        let tree = Tree::from_entries(vec![
            entry(FileMode::Regular, "b.txt"),
            entry(FileMode::Tree, "a-dir"),
        ]);
        assert_eq!(tree.entries[0].name, "a-dir");
        assert!(tree.find(BStr::new("b.txt")).is_some());
        assert!(tree.find(BStr::new("missing")).is_none());
    }

    #[test]
    fn empty_tree_serializes_empty() {
        assert!(Tree::new().serialize_content().is_empty());
    }
}
