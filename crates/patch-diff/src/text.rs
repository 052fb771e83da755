//! Line splitting, whitespace-aware line keys and binary detection.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Number of leading bytes inspected for a NUL when sniffing binary content.
pub const BINARY_SNIFF_LEN: usize = 8000;

/// How whitespace differences affect line equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Whitespace {
    #[default]
    IgnoreNone,
    IgnoreTrailing,
    IgnoreLeadingAndTrailing,
    IgnoreAll,
}

impl Whitespace {
    /// Comparison key for a line (without its line feed).
    pub fn normalize<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Whitespace::IgnoreNone => Cow::Borrowed(line),
            Whitespace::IgnoreTrailing => Cow::Borrowed(trim_end(line)),
            Whitespace::IgnoreLeadingAndTrailing => Cow::Borrowed(trim_start(trim_end(line))),
            Whitespace::IgnoreAll => {
                if line.iter().any(|b| is_space(*b)) {
                    Cow::Owned(line.iter().copied().filter(|b| !is_space(*b)).collect())
                } else {
                    Cow::Borrowed(line)
                }
            }
        }
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c')
}

fn trim_end(line: &[u8]) -> &[u8] {
    let end = line.iter().rposition(|b| !is_space(*b)).map_or(0, |i| i + 1);
    &line[..end]
}

fn trim_start(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !is_space(*b)).unwrap_or(line.len());
    &line[start..]
}

/// Raw content indexed by line. A final line without a line feed is still a
/// line.
#[derive(Debug, Clone)]
pub struct Text<'a> {
    data: &'a [u8],
    lines: Vec<Range<usize>>,
}

impl<'a> Text<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for (i, &byte) in data.iter().enumerate() {
            if byte == b'\n' {
                lines.push(start..i + 1);
                start = i + 1;
            }
        }
        if start < data.len() {
            lines.push(start..data.len());
        }
        Self { data, lines }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line `i` including its line feed, if any.
    pub fn line(&self, i: usize) -> &'a [u8] {
        &self.data[self.lines[i].clone()]
    }

    /// Line `i` without its line feed.
    pub fn line_content(&self, i: usize) -> &'a [u8] {
        let line = self.line(i);
        line.strip_suffix(b"\n").unwrap_or(line)
    }

    /// Whether the content is empty or ends with a line feed.
    pub fn ends_with_newline(&self) -> bool {
        self.data.is_empty() || self.data.ends_with(b"\n")
    }

    /// Byte range covering lines `[begin, end)`.
    pub fn byte_range(&self, begin: usize, end: usize) -> Range<usize> {
        let start = self
            .lines
            .get(begin)
            .map_or(self.data.len(), |range| range.start);
        let stop = if end == 0 {
            0
        } else {
            self.lines
                .get(end - 1)
                .map_or(self.data.len(), |range| range.end)
        };
        start..stop.max(start)
    }
}

/// Map the lines of both texts onto shared integer keys, so that line
/// equality under `whitespace` becomes integer equality.
pub fn intern_lines<'t>(
    a: &Text<'t>,
    b: &Text<'t>,
    whitespace: Whitespace,
) -> (Vec<u32>, Vec<u32>) {
    let mut table: HashMap<Cow<'t, [u8]>, u32> = HashMap::with_capacity(a.len() + b.len());
    let a_keys = line_keys(a, whitespace, &mut table);
    let b_keys = line_keys(b, whitespace, &mut table);
    (a_keys, b_keys)
}

fn line_keys<'t>(
    text: &Text<'t>,
    whitespace: Whitespace,
    table: &mut HashMap<Cow<'t, [u8]>, u32>,
) -> Vec<u32> {
    (0..text.len())
        .map(|i| {
            let key = whitespace.normalize(text.line_content(i));
            let next = table.len() as u32;
            *table.entry(key).or_insert(next)
        })
        .collect()
}

/// Whether content looks binary: a NUL byte among the first
/// [`BINARY_SNIFF_LEN`] bytes.
pub fn is_binary(data: &[u8]) -> bool {
    let check_len = data.len().min(BINARY_SNIFF_LEN);
    data[..check_len].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_unterminated_last_line() {
        let text = Text::new(b"a\nb\nc");
        assert_eq!(text.len(), 3);
        assert_eq!(text.line(0), b"a\n");
        assert_eq!(text.line(2), b"c");
        assert_eq!(text.line_content(1), b"b");
        assert!(!text.ends_with_newline());
    }

    #[test]
    fn empty_text_has_no_lines() {
        let text = Text::new(b"");
        assert!(text.is_empty());
        assert!(text.ends_with_newline());
        assert_eq!(text.byte_range(0, 0), 0..0);
    }

    #[test]
    fn byte_range_spans_lines() {
        let text = Text::new(b"one\ntwo\nthree\n");
        assert_eq!(text.byte_range(1, 3), 4..14);
        assert_eq!(text.byte_range(1, 1), 4..4);
    }

    #[test]
    fn line_feed_is_not_part_of_key() {
        let a = Text::new(b"x\ny");
        let b = Text::new(b"x\ny\n");
        let (ka, kb) = intern_lines(&a, &b, Whitespace::IgnoreNone);
        assert_eq!(ka, kb);
    }

    #[test]
    fn whitespace_modes() {
        let line = b"  a  b \t";
        assert_eq!(&*Whitespace::IgnoreNone.normalize(line), line);
        assert_eq!(&*Whitespace::IgnoreTrailing.normalize(line), b"  a  b");
        assert_eq!(&*Whitespace::IgnoreLeadingAndTrailing.normalize(line), b"a  b");
        assert_eq!(&*Whitespace::IgnoreAll.normalize(line), b"ab");
    }

    #[test]
    fn binary_sniffing_stops_at_limit() {
        assert!(is_binary(b"abc\x00def"));
        assert!(!is_binary(b"plain text\n"));
        let mut data = vec![b'a'; BINARY_SNIFF_LEN + 10];
        data[BINARY_SNIFF_LEN + 5] = 0;
        assert!(!is_binary(&data));
    }
}
