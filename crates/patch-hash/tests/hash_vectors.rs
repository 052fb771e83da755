//! Known object ids produced by git for canonical objects.

use patch_hash::{ContentId, Hasher};
use proptest::prelude::*;

#[test]
fn empty_blob() {
    assert_eq!(
        Hasher::hash_object("blob", b"").to_hex(),
        "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
    );
}

#[test]
fn hello_world_blob() {
    assert_eq!(
        Hasher::hash_object("blob", b"hello world\n").to_hex(),
        "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
    );
}

#[test]
fn empty_tree_constant_matches_hash() {
    assert_eq!(Hasher::hash_object("tree", b""), ContentId::EMPTY_TREE);
}

#[test]
fn kind_is_part_of_identity() {
    assert_ne!(
        Hasher::hash_object("blob", b"same"),
        Hasher::hash_object("tree", b"same")
    );
}

proptest! {
    #[test]
    fn hex_parse_inverts_display(bytes in proptest::array::uniform20(any::<u8>())) {
        let id = ContentId::from_raw(bytes);
        let parsed: ContentId = id.to_string().parse().unwrap();
        prop_assert_eq!(parsed, id);
    }
}
