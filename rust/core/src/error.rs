// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::kind::StepKind;
use crate::text::TextSpan;

/// Result type for step21 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures of the library.
///
/// Malformed STEP syntax is never an `Error`: the lexer and parser report it as
/// [`Diagnostic`](crate::Diagnostic)s and keep going. Hard failures are I/O,
/// configuration, Part21 string decoding and writing a node that has no Part21
/// form.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer size {size} is below the minimum of {minimum} bytes")]
    BufferTooSmall { size: usize, minimum: usize },

    #[error("Part21 string decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Entity #{0} not found")]
    EntityNotFound(u64),

    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("{kind} at {span} cannot be written as Part21: {reason}")]
    Unwritable {
        kind: StepKind,
        span: TextSpan,
        reason: &'static str,
    },
}

/// Errors raised while decoding the Part21 escape grammar of a string literal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of buffer.")]
    UnexpectedEof,

    #[error("Invalid hexadecimal representation '{0}'")]
    InvalidHex(String),

    #[error("Invalid codepage character '{0}'")]
    InvalidCodePage(char),

    #[error("Invalid codepage termination '{0}'")]
    InvalidCodePageTerminator(char),

    #[error("Invalid code point U+{0:X}")]
    InvalidCodePoint(u32),

    #[error("Invalid character '{0}' after \\S\\")]
    InvalidUpperAscii(char),
}
