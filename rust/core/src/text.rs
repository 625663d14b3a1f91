// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spans, locations and line tables
//!
//! Every offset in this crate is a byte offset into the source.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Identifier of a source (a path, a URI or a synthetic name).
pub type SourceId = Arc<str>;

/// Half-open byte range `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextSpan {
    pub start: u64,
    pub length: u32,
}

impl TextSpan {
    #[inline]
    pub const fn new(start: u64, length: u32) -> Self {
        Self { start, length }
    }

    /// Span covering `[start, end)`. `end` before `start` collapses to an empty span.
    #[inline]
    pub fn from_bounds(start: u64, end: u64) -> Self {
        let length = end.saturating_sub(start).min(u32::MAX as u64) as u32;
        Self { start, length }
    }

    #[inline]
    pub const fn end(&self) -> u64 {
        self.start + self.length as u64
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn overlaps_with(&self, other: TextSpan) -> bool {
        self.start < other.end() && self.end() > other.start
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end())
    }
}

/// Start offsets of every line of an in-memory source.
///
/// `\r\n`, `\r` and `\n` all count as a single line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<u64>,
}

impl LineIndex {
    pub fn new(bytes: &[u8]) -> Self {
        let mut starts = Vec::with_capacity(bytes.len() / 40 + 1);
        starts.push(0);
        let mut pos = 0;
        while let Some(offset) = memchr::memchr2(b'\r', b'\n', &bytes[pos..]) {
            let at = pos + offset;
            let width = if bytes[at] == b'\r' && bytes.get(at + 1) == Some(&b'\n') {
                2
            } else {
                1
            };
            pos = at + width;
            starts.push(pos as u64);
        }
        Self { starts }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Zero-based line containing `position`.
    pub fn line_of(&self, position: u64) -> usize {
        self.starts.partition_point(|&start| start <= position).saturating_sub(1)
    }

    pub fn line_start(&self, line: usize) -> Option<u64> {
        self.starts.get(line).copied()
    }
}

/// A span within a named source, with lazy line/column lookup.
#[derive(Debug, Clone)]
pub struct TextLocation {
    source: SourceId,
    span: TextSpan,
    lines: Option<Arc<LineIndex>>,
}

impl TextLocation {
    pub fn new(source: SourceId, span: TextSpan, lines: Option<Arc<LineIndex>>) -> Self {
        Self { source, span, lines }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn span(&self) -> TextSpan {
        self.span
    }

    /// Zero-based line of the span start, `-1` when the source keeps no line table.
    pub fn start_line(&self) -> i64 {
        self.line_of(self.span.start)
    }

    /// Zero-based column of the span start, `-1` when the source keeps no line table.
    pub fn start_character(&self) -> i64 {
        self.column_of(self.span.start)
    }

    pub fn end_line(&self) -> i64 {
        self.line_of(self.span.end())
    }

    pub fn end_character(&self) -> i64 {
        self.column_of(self.span.end())
    }

    fn line_of(&self, position: u64) -> i64 {
        match &self.lines {
            Some(lines) => lines.line_of(position) as i64,
            None => -1,
        }
    }

    fn column_of(&self, position: u64) -> i64 {
        let Some(lines) = &self.lines else {
            return -1;
        };
        let line = lines.line_of(position);
        lines
            .line_start(line)
            .map_or(-1, |start| (position - start) as i64)
    }
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_some() {
            write!(
                f,
                "{}({},{}->{},{})",
                self.source,
                self.start_line() + 1,
                self.start_character() + 1,
                self.end_line() + 1,
                self.end_character() + 1
            )
        } else {
            write!(f, "{}[{}]", self.source, self.span)
        }
    }
}

/// Interpret token bytes as text.
///
/// Conforming Part21 data is 7-bit, but legacy exporters write raw ISO-8859-1 or
/// UTF-8 inside strings. Valid UTF-8 is kept as is, anything else is read one
/// byte per character (ISO-8859-1).
pub fn text_from_bytes(bytes: Cow<'_, [u8]>) -> String {
    match bytes {
        Cow::Borrowed(slice) => match std::str::from_utf8(slice) {
            Ok(text) => text.to_owned(),
            Err(_) => latin1(slice),
        },
        Cow::Owned(vec) => match String::from_utf8(vec) {
            Ok(text) => text,
            Err(err) => latin1(err.as_bytes()),
        },
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_bounds_and_overlap() {
        let span = TextSpan::from_bounds(3, 10);
        assert_eq!(span, TextSpan::new(3, 7));
        assert_eq!(span.end(), 10);
        assert!(span.overlaps_with(TextSpan::new(9, 4)));
        assert!(!span.overlaps_with(TextSpan::new(10, 4)));
        assert!(TextSpan::from_bounds(5, 2).is_empty());
        assert_eq!(span.to_string(), "3..10");
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new(b"ab\r\ncd\nef\rgh");
        assert_eq!(lines.line_count(), 4);
        assert_eq!(lines.line_of(0), 0);
        assert_eq!(lines.line_of(3), 0);
        assert_eq!(lines.line_of(4), 1);
        assert_eq!(lines.line_of(7), 2);
        assert_eq!(lines.line_of(11), 3);
    }

    #[test]
    fn test_location_with_and_without_lines() {
        let lines = Arc::new(LineIndex::new(b"HEADER;\nDATA;\n"));
        let source: SourceId = Arc::from("mem");
        let located = TextLocation::new(source.clone(), TextSpan::new(9, 3), Some(lines));
        assert_eq!(located.start_line(), 1);
        assert_eq!(located.start_character(), 1);
        assert_eq!(located.end_character(), 4);
        assert_eq!(located.to_string(), "mem(2,2->2,5)");

        let streamed = TextLocation::new(source, TextSpan::new(9, 3), None);
        assert_eq!(streamed.start_line(), -1);
        assert_eq!(streamed.end_character(), -1);
        assert_eq!(streamed.to_string(), "mem[9..12]");
    }

    #[test]
    fn test_text_from_bytes_falls_back_to_latin1() {
        assert_eq!(text_from_bytes(Cow::Borrowed("'Ä'".as_bytes())), "'Ä'");
        assert_eq!(text_from_bytes(Cow::Owned(vec![b'\'', 0xC4, b'\''])), "'Ä'");
    }
}
