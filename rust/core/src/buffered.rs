// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Windowed source over a byte stream
//!
//! Only a fixed-size block of the input is resident at any time. The block is
//! refilled whenever fewer than two bytes (current + lookahead) remain ahead of
//! the cursor. Bytes of the token in progress that fall out of the block during
//! a refill are moved into a spill accumulator and joined with the live block
//! only when the token text is requested.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::source::SourceWindow;
use crate::text::SourceId;

/// Default block size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 128_000;

/// Smallest accepted block size (current + lookahead)
pub const MIN_BUFFER_SIZE: usize = 2;

/// Block sizes below this are accepted for testing but logged as a warning
pub const RECOMMENDED_MIN_BUFFER_SIZE: usize = 16_000;

/// Bytes of the token in progress that no longer live in the block.
#[derive(Debug, Default)]
enum Spill {
    #[default]
    Idle,
    Accumulating(Vec<u8>),
}

impl Spill {
    fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        match self {
            Spill::Idle => *self = Spill::Accumulating(bytes.to_vec()),
            Spill::Accumulating(spilled) => spilled.extend_from_slice(bytes),
        }
    }
}

/// [`SourceWindow`] reading a stream through a fixed-size block.
///
/// Owns its reader; the file handle is closed when the source is dropped.
pub struct BufferedSource<R: Read = File> {
    source: SourceId,
    reader: R,
    buffer: Box<[u8]>,
    /// Valid bytes in `buffer`
    len: usize,
    /// Absolute offset of `buffer[0]`
    offset: u64,
    cursor: usize,
    /// Absolute offset of the token start
    start: u64,
    spill: Spill,
    exhausted: bool,
    error: Option<io::Error>,
}

impl BufferedSource<File> {
    /// Open a file with the default block size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), buffer_size, "Opened windowed source");
        Self::from_reader(Arc::from(path.display().to_string()), file, buffer_size)
    }
}

impl<R: Read> BufferedSource<R> {
    /// Wrap any reader. Sizes below [`MIN_BUFFER_SIZE`] are rejected.
    pub fn from_reader(source: SourceId, reader: R, buffer_size: usize) -> Result<Self> {
        if buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::BufferTooSmall {
                size: buffer_size,
                minimum: MIN_BUFFER_SIZE,
            });
        }
        if buffer_size < RECOMMENDED_MIN_BUFFER_SIZE {
            tracing::warn!(
                buffer_size,
                recommended = RECOMMENDED_MIN_BUFFER_SIZE,
                "Buffer size is below the recommended minimum, expect poor throughput"
            );
        }

        let mut window = Self {
            source,
            reader,
            buffer: vec![0u8; buffer_size].into_boxed_slice(),
            len: 0,
            offset: 0,
            cursor: 0,
            start: 0,
            spill: Spill::Idle,
            exhausted: false,
            error: None,
        };
        window.refill();
        Ok(window)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Give back the reader, dropping the block.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Index of the token start inside the block, `0` when it was spilled.
    #[inline]
    fn start_in_block(&self) -> usize {
        self.start.saturating_sub(self.offset) as usize
    }

    fn refill(&mut self) {
        let from = self.start_in_block().min(self.cursor);
        let (kept, spill) = (&self.buffer[from..self.cursor], &mut self.spill);
        spill.push(kept);

        self.buffer.copy_within(self.cursor..self.len, 0);
        self.len -= self.cursor;
        self.offset += self.cursor as u64;
        self.cursor = 0;

        while self.len < self.buffer.len() {
            match self.reader.read(&mut self.buffer[self.len..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(read) => self.len += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::error!(source = %self.source, offset = self.offset + self.len as u64, error = %err, "Read failed, treating as end of input");
                    self.error = Some(err);
                    self.exhausted = true;
                    break;
                }
            }
        }
        tracing::trace!(offset = self.offset, len = self.len, "Refilled window");
    }
}

impl<R: Read> SourceWindow for BufferedSource<R> {
    fn source_id(&self) -> &SourceId {
        &self.source
    }

    #[inline]
    fn current(&self) -> u8 {
        if self.cursor < self.len {
            self.buffer[self.cursor]
        } else {
            0
        }
    }

    #[inline]
    fn lookahead(&self) -> u8 {
        if self.cursor + 1 < self.len {
            self.buffer[self.cursor + 1]
        } else {
            0
        }
    }

    fn mark_token_start(&mut self) {
        self.start = self.offset + self.cursor as u64;
        self.spill = Spill::Idle;
    }

    fn advance(&mut self) {
        if self.cursor < self.len {
            self.cursor += 1;
        }
        if self.len - self.cursor < 2 && !self.exhausted {
            self.refill();
        }
    }

    fn slice_from_mark(&self) -> Cow<'_, [u8]> {
        let live = &self.buffer[self.start_in_block().min(self.cursor)..self.cursor];
        match &self.spill {
            Spill::Idle => Cow::Borrowed(live),
            Spill::Accumulating(spilled) => {
                let mut joined = Vec::with_capacity(spilled.len() + live.len());
                joined.extend_from_slice(spilled);
                joined.extend_from_slice(live);
                Cow::Owned(joined)
            }
        }
    }

    fn token_start(&self) -> u64 {
        self.start
    }

    fn position(&self) -> u64 {
        self.offset + self.cursor as u64
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: Read> std::fmt::Debug for BufferedSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSource")
            .field("source", &self.source)
            .field("buffer_size", &self.buffer.len())
            .field("offset", &self.offset)
            .field("cursor", &self.cursor)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
