// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lexical tokens

use std::borrow::Cow;
use std::fmt;

use crate::codec;
use crate::error::DecodeError;
use crate::kind::StepKind;
use crate::text::{SourceId, TextSpan};

/// Typed payload of a literal token.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenValue {
    Integer(i64),
    /// Entity label `#123`
    Identity(u64),
    Float(f64),
    Boolean(bool),
    /// String contents with `''` un-doubled; other escapes are kept raw
    String(String),
    /// Enumeration name without the surrounding dots
    Enumeration(String),
    /// Hex digits without the quotes
    Hex(String),
}

/// A leaf of the syntax tree.
///
/// `length` is stored separately from `text` so that spans stay exact when the
/// lexer skips text and values.
#[derive(Debug, Clone, PartialEq)]
pub struct StepToken {
    kind: StepKind,
    source: SourceId,
    position: u64,
    length: u32,
    text: Cow<'static, str>,
    value: Option<TokenValue>,
    missing: bool,
    malformed: bool,
}

impl StepToken {
    pub fn new(
        kind: StepKind,
        source: SourceId,
        span: TextSpan,
        text: Cow<'static, str>,
        value: Option<TokenValue>,
    ) -> Self {
        Self {
            kind,
            source,
            position: span.start,
            length: span.length,
            text,
            value,
            missing: false,
            malformed: false,
        }
    }

    /// Mark a lexeme the lexer reported as malformed.
    pub fn into_malformed(mut self) -> Self {
        self.malformed = true;
        self
    }

    /// Zero-width placeholder synthesised by the parser for an expected token.
    pub fn missing(kind: StepKind, source: SourceId, position: u64) -> Self {
        Self {
            kind,
            source,
            position,
            length: 0,
            text: Cow::Borrowed(""),
            value: None,
            missing: true,
            malformed: false,
        }
    }

    #[inline]
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn span(&self) -> TextSpan {
        TextSpan::new(self.position, self.length)
    }

    /// Raw lexeme; empty for missing tokens and for tokens lexed in value-skip mode.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Option<&TokenValue> {
        self.value.as_ref()
    }

    pub fn is_missing(&self) -> bool {
        self.missing
    }

    /// Whether the lexer reported a diagnostic while reading this token.
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    pub fn as_identity(&self) -> Option<u64> {
        match self.value {
            Some(TokenValue::Identity(id)) => Some(id),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            Some(TokenValue::Integer(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            Some(TokenValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Some(TokenValue::Boolean(v)) => Some(v),
            _ => None,
        }
    }

    /// String value with `''` un-doubled but Part21 escapes still encoded.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::Enumeration(name)) => Some(name),
            _ => None,
        }
    }

    /// Fully decoded string value (all Part21 escapes resolved).
    ///
    /// `Ok(None)` for tokens that are not strings or whose text was skipped.
    pub fn decoded_string(&self) -> Result<Option<String>, DecodeError> {
        if self.kind != StepKind::String || self.text.is_empty() {
            return Ok(None);
        }
        let inner = string_body(&self.text);
        codec::decode(inner).map(Some)
    }
}

/// Contents of a string lexeme without its delimiting quotes.
///
/// Follows the lexer's rules: `''` and `\\` are two-byte escapes and `\S\`
/// always takes the following byte, so `'20\S\''` has the body `20\S\'`.
pub(crate) fn string_body(text: &str) -> &str {
    let bytes = text.as_bytes();
    let start = usize::from(bytes.first() == Some(&b'\''));
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return &text[start..i],
            b'\\' if bytes.get(i + 1) == Some(&b'\\') => i += 2,
            b'\\' if bytes.get(i + 1) == Some(&b'S') && bytes.get(i + 2) == Some(&b'\\') => {
                i += 4
            }
            _ => i += 1,
        }
    }
    &text[start..]
}

impl fmt::Display for StepToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.span())?;
        if self.missing {
            return write!(f, " <missing>");
        }
        if self.malformed {
            write!(f, " <malformed>")?;
        }
        match &self.value {
            Some(TokenValue::Integer(v)) => write!(f, " {v}"),
            Some(TokenValue::Identity(id)) => write!(f, " #{id}"),
            Some(TokenValue::Float(v)) => write!(f, " {v:?}"),
            Some(TokenValue::Boolean(v)) => write!(f, " {v}"),
            Some(TokenValue::String(s)) => write!(f, " {s:?}"),
            Some(TokenValue::Enumeration(name)) => write!(f, " .{name}."),
            Some(TokenValue::Hex(digits)) => write!(f, " \"{digits}\""),
            None if !self.text.is_empty() && !self.kind.is_keyword() => {
                write!(f, " {:?}", self.text)
            }
            None => Ok(()),
        }
    }
}
