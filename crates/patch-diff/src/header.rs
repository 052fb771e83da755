//! Git-style per-file diff headers.

use bstr::{BStr, BString, ByteSlice};
use patch_hash::ContentId;
use patch_object::{ChangeKind, FileMode};

const DEV_NULL: &[u8] = b"/dev/null";
const ABBREV: usize = 7;

/// Everything the header of one file diff describes.
#[derive(Debug, Clone)]
pub struct FileHeader<'a> {
    pub kind: ChangeKind,
    pub old_path: Option<&'a BStr>,
    pub new_path: Option<&'a BStr>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub old_id: Option<ContentId>,
    pub new_id: Option<ContentId>,
    pub score: Option<u8>,
    pub binary: bool,
}

impl FileHeader<'_> {
    /// Render the header, ending with a line feed.
    pub fn format(&self) -> BString {
        let old_name = self.old_path.or(self.new_path).unwrap_or(b"".as_bstr());
        let new_name = self.new_path.or(self.old_path).unwrap_or(b"".as_bstr());
        let mut out = Vec::new();

        out.extend_from_slice(b"diff --git a/");
        out.extend_from_slice(old_name);
        out.extend_from_slice(b" b/");
        out.extend_from_slice(new_name);
        out.push(b'\n');

        match self.kind {
            ChangeKind::Added => {
                if let Some(mode) = self.new_mode {
                    line(&mut out, &["new file mode ", &mode.to_octal()]);
                }
            }
            ChangeKind::Deleted => {
                if let Some(mode) = self.old_mode {
                    line(&mut out, &["deleted file mode ", &mode.to_octal()]);
                }
            }
            _ => {
                if let (Some(old), Some(new)) = (self.old_mode, self.new_mode) {
                    if old != new {
                        line(&mut out, &["old mode ", &old.to_octal()]);
                        line(&mut out, &["new mode ", &new.to_octal()]);
                    }
                }
            }
        }

        let verb = match self.kind {
            ChangeKind::Renamed => Some("rename"),
            ChangeKind::Copied => Some("copy"),
            _ => None,
        };
        if let Some(verb) = verb {
            let score = self.score.unwrap_or(100).to_string();
            line(&mut out, &["similarity index ", &score, "%"]);
            out.extend_from_slice(verb.as_bytes());
            out.extend_from_slice(b" from ");
            out.extend_from_slice(old_name);
            out.push(b'\n');
            out.extend_from_slice(verb.as_bytes());
            out.extend_from_slice(b" to ");
            out.extend_from_slice(new_name);
            out.push(b'\n');
        }

        if self.old_id == self.new_id {
            return out.into();
        }

        let old_abbrev = abbreviate(self.old_id);
        let new_abbrev = abbreviate(self.new_id);
        match (self.old_mode, self.new_mode) {
            (Some(old), Some(new)) if old == new => {
                line(&mut out, &["index ", &old_abbrev, "..", &new_abbrev, " ", &old.to_octal()]);
            }
            _ => line(&mut out, &["index ", &old_abbrev, "..", &new_abbrev]),
        }

        let old_label = side_label(b"a/", self.old_path);
        let new_label = side_label(b"b/", self.new_path);
        if self.binary {
            out.extend_from_slice(b"Binary files ");
            out.extend_from_slice(&old_label);
            out.extend_from_slice(b" and ");
            out.extend_from_slice(&new_label);
            out.extend_from_slice(b" differ\n");
        } else {
            out.extend_from_slice(b"--- ");
            out.extend_from_slice(&old_label);
            out.extend_from_slice(b"\n+++ ");
            out.extend_from_slice(&new_label);
            out.push(b'\n');
        }
        out.into()
    }
}

/// Header of a synthetic file whose old side may be absent.
pub fn magic_file_header(path: &BStr, has_old_side: bool) -> BString {
    let mut out = Vec::new();
    out.extend_from_slice(b"diff --git ");
    if has_old_side {
        out.extend_from_slice(b"a/");
        out.extend_from_slice(path);
    } else {
        out.extend_from_slice(DEV_NULL);
    }
    out.extend_from_slice(b" b/");
    out.extend_from_slice(path);
    out.extend_from_slice(b"\n--- ");
    if has_old_side {
        out.extend_from_slice(b"a/");
        out.extend_from_slice(path);
    } else {
        out.extend_from_slice(DEV_NULL);
    }
    out.extend_from_slice(b"\n+++ b/");
    out.extend_from_slice(path);
    out.push(b'\n');
    out.into()
}

fn line(out: &mut Vec<u8>, parts: &[&str]) {
    for part in parts {
        out.extend_from_slice(part.as_bytes());
    }
    out.push(b'\n');
}

fn abbreviate(id: Option<ContentId>) -> String {
    id.unwrap_or(ContentId::NULL).abbreviate(ABBREV)
}

fn side_label(prefix: &[u8], path: Option<&BStr>) -> Vec<u8> {
    match path {
        Some(path) => [prefix, path.as_bytes()].concat(),
        None => DEV_NULL.to_vec(),
    }
}
