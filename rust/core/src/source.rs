// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Character sources consumed by the lexer
//!
//! The lexer never indexes into the data directly: it asks a [`SourceWindow`] for
//! the current and next byte, marks where a token starts, advances one byte at a
//! time and finally asks for the bytes of the token. [`SourceText`] serves this
//! from memory; [`BufferedSource`](crate::BufferedSource) from a bounded window
//! over a reader.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::text::{LineIndex, SourceId, TextSpan};

/// Cursor-based access to the bytes of a STEP source.
///
/// Both `current` and `lookahead` return `0` past the end of input.
pub trait SourceWindow {
    /// Identifier of the data source
    fn source_id(&self) -> &SourceId;

    /// The byte under the cursor
    fn current(&self) -> u8;

    /// The byte after the cursor
    fn lookahead(&self) -> u8;

    /// Record the cursor as the start of the next token
    fn mark_token_start(&mut self);

    /// Move the cursor forward by one byte
    fn advance(&mut self);

    /// Bytes from the last mark to the cursor
    fn slice_from_mark(&self) -> Cow<'_, [u8]>;

    /// Absolute offset of the last mark
    fn token_start(&self) -> u64;

    /// Absolute offset of the cursor
    fn position(&self) -> u64;

    fn token_span(&self) -> TextSpan {
        TextSpan::from_bounds(self.token_start(), self.position())
    }

    /// Line table for line/column lookups, if the source keeps one.
    fn line_index(&self) -> Option<Arc<LineIndex>> {
        None
    }

    /// Read failure that ended the input early, if any.
    fn take_error(&mut self) -> Option<std::io::Error> {
        None
    }
}

impl<W: SourceWindow + ?Sized> SourceWindow for &mut W {
    fn source_id(&self) -> &SourceId {
        (**self).source_id()
    }
    fn current(&self) -> u8 {
        (**self).current()
    }
    fn lookahead(&self) -> u8 {
        (**self).lookahead()
    }
    fn mark_token_start(&mut self) {
        (**self).mark_token_start()
    }
    fn advance(&mut self) {
        (**self).advance()
    }
    fn slice_from_mark(&self) -> Cow<'_, [u8]> {
        (**self).slice_from_mark()
    }
    fn token_start(&self) -> u64 {
        (**self).token_start()
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
    fn line_index(&self) -> Option<Arc<LineIndex>> {
        (**self).line_index()
    }
    fn take_error(&mut self) -> Option<std::io::Error> {
        (**self).take_error()
    }
}

/// Fully materialised source. Not suitable for very large files.
#[derive(Debug, Clone)]
pub struct SourceText {
    source: SourceId,
    bytes: Arc<[u8]>,
    /// Absolute offset of `bytes[0]`; non-zero for fragments re-read from a file
    base: u64,
    lines: Option<Arc<LineIndex>>,
    position: usize,
    start: usize,
}

impl SourceText {
    /// Source over in-memory text, identified by a synthetic `data:` name.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes(), Arc::from("data:"))
    }

    pub fn new(bytes: impl Into<Arc<[u8]>>, source: SourceId) -> Self {
        let bytes = bytes.into();
        let lines = Some(Arc::new(LineIndex::new(&bytes)));
        Self {
            source,
            bytes,
            base: 0,
            lines,
            position: 0,
            start: 0,
        }
    }

    /// Read a whole file into memory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Loaded source into memory");
        Ok(Self::new(bytes, Arc::from(path.display().to_string())))
    }

    /// Source over a slice of a larger file that starts at absolute offset `base`.
    ///
    /// Spans of tokens lexed from a fragment are absolute. No line table is kept.
    pub fn fragment(bytes: impl Into<Arc<[u8]>>, source: SourceId, base: u64) -> Self {
        Self {
            source,
            bytes: bytes.into(),
            base,
            lines: None,
            position: 0,
            start: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes covered by an absolute span, if it lies within this source.
    pub fn span_bytes(&self, span: TextSpan) -> Option<&[u8]> {
        let start = usize::try_from(span.start.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(span.length as usize)?;
        self.bytes.get(start..end)
    }

    #[inline]
    fn peek(&self, offset: usize) -> u8 {
        self.bytes.get(self.position + offset).copied().unwrap_or(0)
    }
}

impl SourceWindow for SourceText {
    fn source_id(&self) -> &SourceId {
        &self.source
    }

    #[inline]
    fn current(&self) -> u8 {
        self.peek(0)
    }

    #[inline]
    fn lookahead(&self) -> u8 {
        self.peek(1)
    }

    #[inline]
    fn mark_token_start(&mut self) {
        self.start = self.position;
    }

    #[inline]
    fn advance(&mut self) {
        if self.position < self.bytes.len() {
            self.position += 1;
        }
    }

    fn slice_from_mark(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.bytes[self.start..self.position])
    }

    fn token_start(&self) -> u64 {
        self.base + self.start as u64
    }

    fn position(&self) -> u64 {
        self.base + self.position as u64
    }

    fn line_index(&self) -> Option<Arc<LineIndex>> {
        self.lines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_and_sentinel() {
        let mut text = SourceText::from_text("ab");
        assert_eq!(text.current(), b'a');
        assert_eq!(text.lookahead(), b'b');
        text.advance();
        assert_eq!(text.current(), b'b');
        assert_eq!(text.lookahead(), 0);
        text.advance();
        assert_eq!(text.current(), 0);
        text.advance();
        assert_eq!(text.position(), 2);
    }

    #[test]
    fn test_slice_from_mark() {
        let mut text = SourceText::from_text("#12=FOO");
        text.advance();
        text.mark_token_start();
        text.advance();
        text.advance();
        assert_eq!(&*text.slice_from_mark(), b"12");
        assert_eq!(text.token_span(), TextSpan::new(1, 2));
    }

    #[test]
    fn test_fragment_spans_are_absolute() {
        let mut text = SourceText::fragment(&b"#7=A();"[..], Arc::from("f"), 100);
        text.mark_token_start();
        text.advance();
        text.advance();
        assert_eq!(text.token_span(), TextSpan::new(100, 2));
        assert_eq!(text.span_bytes(TextSpan::new(103, 1)), Some(&b"A"[..]));
        assert_eq!(text.span_bytes(TextSpan::new(10, 1)), None);
        assert!(text.line_index().is_none());
    }
}
