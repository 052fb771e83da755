//! Conversion between nested trees and flat `path -> entry` maps.

use std::collections::BTreeMap;

use bstr::BString;
use patch_hash::ContentId;

use crate::store::{ObjectInserter, ObjectReader};
use crate::{FileMode, Object, StoreError, Tree, TreeEntry};

/// A non-tree entry in a flattened tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatEntry {
    pub id: ContentId,
    pub mode: FileMode,
}

/// Flatten a tree into a map of full path to entry (recursive).
pub fn flatten_tree<R: ObjectReader + ?Sized>(
    reader: &R,
    tree_id: &ContentId,
) -> Result<BTreeMap<BString, FlatEntry>, StoreError> {
    let mut map = BTreeMap::new();
    let tree = reader.read_tree(tree_id)?;
    flatten_into(reader, &tree, &BString::from(""), &mut map)?;
    Ok(map)
}

fn flatten_into<R: ObjectReader + ?Sized>(
    reader: &R,
    tree: &Tree,
    prefix: &BString,
    map: &mut BTreeMap<BString, FlatEntry>,
) -> Result<(), StoreError> {
    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            let mut p = prefix.clone();
            p.push(b'/');
            p.extend_from_slice(&entry.name);
            p
        };

        if entry.mode.is_tree() {
            let sub = reader.read_tree(&entry.id)?;
            flatten_into(reader, &sub, &path, map)?;
        } else {
            map.insert(
                path,
                FlatEntry {
                    id: entry.id,
                    mode: entry.mode,
                },
            );
        }
    }
    Ok(())
}

/// Write a flat map back as nested tree objects, returning the root id.
pub fn write_flat_tree(
    inserter: &mut dyn ObjectInserter,
    map: &BTreeMap<BString, FlatEntry>,
) -> Result<ContentId, StoreError> {
    let mut subdirs: BTreeMap<BString, BTreeMap<BString, FlatEntry>> = BTreeMap::new();
    let mut entries: Vec<TreeEntry> = Vec::new();

    for (path, entry) in map {
        if let Some(slash) = path.iter().position(|&b| b == b'/') {
            let dir = BString::from(&path[..slash]);
            let rest = BString::from(&path[slash + 1..]);
            subdirs.entry(dir).or_default().insert(rest, *entry);
        } else {
            entries.push(TreeEntry {
                mode: entry.mode,
                name: path.clone(),
                id: entry.id,
            });
        }
    }

    for (name, sub_map) in &subdirs {
        let id = write_flat_tree(inserter, sub_map)?;
        entries.push(TreeEntry {
            mode: FileMode::Tree,
            name: name.clone(),
            id,
        });
    }

    inserter.insert(Object::Tree(Tree::from_entries(entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::Repository;

    #[test]
    fn flatten_then_write_reproduces_tree() {
        let repo = MemoryRepository::new();
        let tree = repo.write_tree(&[
            ("README", b"hi\n"),
            ("src/lib.rs", b"pub fn f() {}\n"),
            ("src/bin/main.rs", b"fn main() {}\n"),
        ]);

        let map = flatten_tree(&*repo.reader(), &tree).unwrap();
        let paths: Vec<&[u8]> = map.keys().map(|k| k.as_slice()).collect();
        assert_eq!(paths, vec![&b"README"[..], b"src/bin/main.rs", b"src/lib.rs"]);

        let mut inserter = repo.inserter();
        let rebuilt = write_flat_tree(&mut *inserter, &map).unwrap();
        inserter.flush().unwrap();
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn empty_map_is_empty_tree() {
        let repo = MemoryRepository::new();
        let mut inserter = repo.inserter();
        let id = write_flat_tree(&mut *inserter, &BTreeMap::new()).unwrap();
        assert_eq!(id, ContentId::EMPTY_TREE);
    }
}
