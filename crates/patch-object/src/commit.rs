use bstr::{BString, ByteSlice};
use patch_hash::ContentId;
use serde::{Deserialize, Serialize};

/// Author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub time: i64,
    /// Offset from UTC in minutes.
    pub tz_offset: i32,
}

impl Signature {
    pub fn new(
        name: impl Into<BString>,
        email: impl Into<BString>,
        time: i64,
        tz_offset: i32,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
            tz_offset,
        }
    }

    /// `Name <email> 1234567890 +0000`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.time.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(format_tz(self.tz_offset).as_bytes());
        out
    }
}

fn format_tz(offset: i32) -> String {
    let sign = if offset < 0 { '-' } else { '+' };
    let abs = offset.unsigned_abs();
    format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
}

/// A commit: a tree snapshot plus an ordered parent list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ContentId,
    pub parents: Vec<ContentId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: BString,
}

impl Commit {
    /// Canonical encoding, hashed to produce the commit id.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');
        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// The full text shown for the commit-message pseudo file.
    ///
    /// Parent lines appear only for merges, followed by author, committer,
    /// a blank line and the message.
    pub fn message_file_content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.parents.len() > 1 {
            out.extend_from_slice(b"Merge Of:   ");
            for (i, parent) in self.parents.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b"\n            ");
                }
                out.extend_from_slice(parent.abbreviate(7).as_bytes());
            }
            out.push(b'\n');
        }
        out.extend_from_slice(b"Author:     ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Commit:     ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(&self.message);
        out
    }

    /// First line of the message.
    pub fn summary(&self) -> &[u8] {
        self.message.lines().next().unwrap_or(b"")
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::new("A U Thor", "author@example.com", 1_700_000_000, -90)
    }

    #[test]
    fn signature_formatting() {
        assert_eq!(
            sig().to_bytes().as_bstr(),
            "A U Thor <author@example.com> 1700000000 -0130"
        );
    }

    #[test]
    fn merge_message_file_lists_parents() {
        let commit = Commit {
            tree: ContentId::EMPTY_TREE,
            parents: vec![ContentId::NULL, ContentId::EMPTY_TREE],
            author: sig(),
            committer: sig(),
            message: BString::from("Merge branch\n"),
        };
        let text = commit.message_file_content();
        assert!(text.starts_with(b"Merge Of:   0000000\n            4b825dc\n"));
        assert!(text.ends_with(b"\n\nMerge branch\n"));
        assert!(commit.is_merge());
        assert_eq!(commit.summary(), b"Merge branch");
    }

    #[test]
    fn serialization_lists_parents_in_order() {
        let commit = Commit {
            tree: ContentId::EMPTY_TREE,
            parents: vec![ContentId::EMPTY_TREE, ContentId::NULL],
            author: sig(),
            committer: sig(),
            message: BString::from("msg"),
        };
        let text = commit.serialize_content();
        let first = text.find(b"parent 4b825dc").unwrap();
        let second = text.find(b"parent 00000000").unwrap();
        assert!(first < second);
    }
}
