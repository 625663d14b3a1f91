// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP tokenizer
//!
//! A byte-at-a-time state machine over a [`SourceWindow`]. Every call to
//! [`Lexer::lex`] returns exactly one token, trivia included, and repeats
//! `EndOfFile` once the input is exhausted. Lexical problems are reported to the
//! lexer's [`DiagnosticBag`] and never stop the scan.

use std::borrow::Cow;
use std::sync::Arc;

use crate::diagnostics::DiagnosticBag;
use crate::kind::StepKind;
use crate::source::SourceWindow;
use crate::text::{text_from_bytes, LineIndex, SourceId, TextLocation};
use crate::token::{string_body, StepToken, TokenValue};

/// Tokenizer over any [`SourceWindow`].
pub struct Lexer<'a, S: SourceWindow> {
    window: S,
    source: SourceId,
    lines: Option<Arc<LineIndex>>,
    diagnostics: DiagnosticBag<'a>,
    ignore_values: bool,
}

impl<'a, S: SourceWindow> Lexer<'a, S> {
    pub fn new(window: S) -> Self {
        Self::with_diagnostics(window, DiagnosticBag::new())
    }

    pub fn with_diagnostics(window: S, diagnostics: DiagnosticBag<'a>) -> Self {
        let source = window.source_id().clone();
        let lines = window.line_index();
        Self {
            window,
            source,
            lines,
            diagnostics,
            ignore_values: false,
        }
    }

    /// Value-skip mode: token text and typed values are not computed.
    ///
    /// Enumeration-style literals are still classified (`.T.`, `.U.`, …).
    pub fn set_ignore_values(&mut self, ignore: bool) {
        self.ignore_values = ignore;
    }

    pub fn ignore_values(&self) -> bool {
        self.ignore_values
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source
    }

    pub fn diagnostics(&self) -> &DiagnosticBag<'a> {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticBag<'a> {
        &mut self.diagnostics
    }

    pub fn into_diagnostics(self) -> DiagnosticBag<'a> {
        self.diagnostics
    }

    /// Read failure of the underlying window, if the input ended early.
    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.window.take_error()
    }

    pub fn location(&self, span: crate::text::TextSpan) -> TextLocation {
        TextLocation::new(self.source.clone(), span, self.lines.clone())
    }

    fn here(&self) -> TextLocation {
        self.location(self.window.token_span())
    }

    /// Produce the next token.
    pub fn lex(&mut self) -> StepToken {
        let reported = self.diagnostics.len();
        self.window.mark_token_start();
        let current = self.window.current();
        let next = self.window.lookahead();

        let (kind, value) = match current {
            0 => (StepKind::EndOfFile, None),
            b'+' | b'-' if next.is_ascii_digit() || next == b'.' => self.read_number(),
            b'.' if next.is_ascii_digit() => self.read_number(),
            b'.' => self.read_enumeration(),
            b'0'..=b'9' => self.read_number(),
            b'*' => self.single(StepKind::Override),
            b'$' => self.single(StepKind::Undefined),
            b'#' if next.is_ascii_digit() => self.read_identity(),
            b'#' => self.single(StepKind::Hash),
            b'/' if next == b'*' => self.read_comment(),
            b'(' => self.single(StepKind::OpenParen),
            b')' => self.single(StepKind::CloseParen),
            b';' => self.single(StepKind::Semicolon),
            b',' => self.single(StepKind::Comma),
            b'=' => self.single(StepKind::Equals),
            b'\'' => self.read_string(),
            b'"' => self.read_hex(),
            c if c.is_ascii_whitespace() => self.read_whitespace(),
            c if c.is_ascii_alphabetic() || c == b'_' => self.read_identifier(),
            c => {
                self.window.advance();
                let location = self.here();
                self.diagnostics.report_bad_character(location, char::from(c));
                (StepKind::BadToken, None)
            }
        };

        let span = self.window.token_span();
        let text = match kind.fixed_text() {
            Some(fixed) if fixed.len() == span.length as usize => Cow::Borrowed(fixed),
            _ if self.ignore_values || kind == StepKind::EndOfFile => Cow::Borrowed(""),
            _ => Cow::Owned(text_from_bytes(self.window.slice_from_mark())),
        };
        let token = StepToken::new(kind, self.source.clone(), span, text, value);
        if self.diagnostics.len() > reported {
            token.into_malformed()
        } else {
            token
        }
    }

    fn single(&mut self, kind: StepKind) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        (kind, None)
    }

    fn advance_while(&mut self, mut accept: impl FnMut(u8) -> bool) {
        while accept(self.window.current()) {
            self.window.advance();
        }
    }

    fn read_whitespace(&mut self) -> (StepKind, Option<TokenValue>) {
        self.advance_while(|c| c.is_ascii_whitespace());
        (StepKind::Whitespace, None)
    }

    fn read_comment(&mut self) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        self.window.advance();
        loop {
            match (self.window.current(), self.window.lookahead()) {
                (b'*', b'/') => {
                    self.window.advance();
                    self.window.advance();
                    break;
                }
                (0, _) => {
                    let location = self.here();
                    self.diagnostics.report_unterminated_comment(location);
                    break;
                }
                _ => self.window.advance(),
            }
        }
        (StepKind::Comment, None)
    }

    fn read_identity(&mut self) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        self.advance_while(|c| c.is_ascii_digit());
        if self.ignore_values {
            return (StepKind::Identity, None);
        }

        let bytes = self.window.slice_from_mark();
        let id = match lexical_core::parse::<u64>(&bytes[1..]) {
            Ok(id) => id,
            Err(_) => {
                let text = text_from_bytes(Cow::Borrowed(&bytes[..]));
                let location = self.here();
                self.diagnostics.report_invalid_identity(location, &text);
                0
            }
        };
        (StepKind::Identity, Some(TokenValue::Identity(id)))
    }

    fn read_number(&mut self) -> (StepKind, Option<TokenValue>) {
        let mut kind = StepKind::Integer;
        if matches!(self.window.current(), b'+' | b'-') {
            self.window.advance();
        }
        self.advance_while(|c| c.is_ascii_digit());
        if self.window.current() == b'.' {
            kind = StepKind::Float;
            self.window.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }
        if matches!(self.window.current(), b'e' | b'E')
            && matches!(self.window.lookahead(), b'0'..=b'9' | b'+' | b'-')
        {
            kind = StepKind::Float;
            self.window.advance();
            if matches!(self.window.current(), b'+' | b'-') {
                self.window.advance();
            }
            self.advance_while(|c| c.is_ascii_digit());
        }

        let mantissa_len = (self.window.position() - self.window.token_start()) as usize;
        let has_suffix =
            self.window.current() == b'#' && self.window.lookahead().is_ascii_alphabetic();
        if has_suffix {
            kind = StepKind::Float;
            self.window.advance();
            self.advance_while(|c| c.is_ascii_alphabetic());
        }

        if self.ignore_values {
            return (kind, None);
        }

        let bytes = self.window.slice_from_mark();
        let mantissa = &bytes[..mantissa_len];
        let digits = mantissa.strip_prefix(b"+").unwrap_or(mantissa);

        if has_suffix {
            let value = match &bytes[mantissa_len..] {
                b"#INF" if mantissa.first() == Some(&b'-') => f64::NEG_INFINITY,
                b"#INF" => f64::INFINITY,
                b"#IND" => f64::NAN,
                _ => {
                    let text = text_from_bytes(Cow::Borrowed(&bytes[..]));
                    let location = self.here();
                    self.diagnostics
                        .report_invalid_number(location, &text, StepKind::Float);
                    f64::NAN
                }
            };
            return (kind, Some(TokenValue::Float(value)));
        }

        match kind {
            StepKind::Integer => match lexical_core::parse::<i64>(digits) {
                Ok(value) => (kind, Some(TokenValue::Integer(value))),
                Err(_) => {
                    let text = text_from_bytes(Cow::Borrowed(&bytes[..]));
                    let location = self.here();
                    self.diagnostics.report_invalid_number(location, &text, kind);
                    (kind, Some(TokenValue::Integer(0)))
                }
            },
            _ => match fast_float::parse::<f64, _>(digits) {
                Ok(value) if value.is_finite() => (kind, Some(TokenValue::Float(value))),
                _ => {
                    let text = text_from_bytes(Cow::Borrowed(&bytes[..]));
                    let location = self.here();
                    self.diagnostics.report_invalid_number(location, &text, kind);
                    (kind, Some(TokenValue::Float(f64::NAN)))
                }
            },
        }
    }

    fn read_enumeration(&mut self) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        self.advance_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        let terminated = self.window.current() == b'.';
        if terminated {
            self.window.advance();
        }
        if !terminated {
            let location = self.here();
            self.diagnostics.report_unterminated_enumeration(location);
        }

        let bytes = self.window.slice_from_mark();
        let name = if terminated {
            &bytes[1..bytes.len() - 1]
        } else {
            &bytes[1..]
        };
        match name {
            b"U" => (StepKind::Undefined, None),
            b"T" | b"F" if self.ignore_values => (StepKind::Boolean, None),
            b"T" => (StepKind::Boolean, Some(TokenValue::Boolean(true))),
            b"F" => (StepKind::Boolean, Some(TokenValue::Boolean(false))),
            _ if self.ignore_values => (StepKind::Enumeration, None),
            _ => {
                let name = text_from_bytes(Cow::Borrowed(name));
                (StepKind::Enumeration, Some(TokenValue::Enumeration(name)))
            }
        }
    }

    fn read_string(&mut self) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        loop {
            match (self.window.current(), self.window.lookahead()) {
                (0, _) => {
                    let location = self.here();
                    self.diagnostics.report_unterminated_string(location);
                    break;
                }
                (b'\'', b'\'') | (b'\\', b'\\') => {
                    self.window.advance();
                    self.window.advance();
                }
                (b'\'', _) => {
                    self.window.advance();
                    break;
                }
                (b'\\', b'S') => {
                    self.window.advance();
                    self.window.advance();
                    if self.window.current() == b'\\' {
                        // \S\ always takes the next byte, even a quote
                        self.window.advance();
                        self.window.advance();
                    }
                }
                _ => self.window.advance(),
            }
        }

        if self.ignore_values {
            return (StepKind::String, None);
        }
        let text = text_from_bytes(self.window.slice_from_mark());
        let value = unescape_quotes(string_body(&text));
        (StepKind::String, Some(TokenValue::String(value)))
    }

    fn read_hex(&mut self) -> (StepKind, Option<TokenValue>) {
        self.window.advance();
        let terminated = loop {
            match self.window.current() {
                b'"' => {
                    self.window.advance();
                    break true;
                }
                0 => {
                    let location = self.here();
                    self.diagnostics.report_unterminated_hex(location);
                    break false;
                }
                c if c.is_ascii_hexdigit() => self.window.advance(),
                c => {
                    let location = self.here();
                    self.diagnostics.report_invalid_hex(location, char::from(c));
                    break false;
                }
            }
        };

        if self.ignore_values {
            return (StepKind::Hex, None);
        }
        let bytes = self.window.slice_from_mark();
        let digits = if terminated {
            &bytes[1..bytes.len() - 1]
        } else {
            &bytes[1..]
        };
        let digits = text_from_bytes(Cow::Borrowed(digits));
        (StepKind::Hex, Some(TokenValue::Hex(digits)))
    }

    fn read_identifier(&mut self) -> (StepKind, Option<TokenValue>) {
        loop {
            match self.window.current() {
                c if c.is_ascii_alphanumeric() || c == b'_' => self.window.advance(),
                b'-' if self.allows_dash() => self.window.advance(),
                _ => break,
            }
        }

        let keyword = {
            let word = self.window.slice_from_mark();
            std::str::from_utf8(&word)
                .ok()
                .and_then(StepKind::keyword_kind)
        };
        let Some(kind) = keyword else {
            return (StepKind::Identifier, None);
        };

        if self.window.current() == b';' {
            self.window.advance();
        } else {
            let text = text_from_bytes(self.window.slice_from_mark());
            let location = self.here();
            self.diagnostics.report_invalid_keyword(location, &text);
        }
        (kind, None)
    }

    /// `ISO…` and `END…` words may carry dashes (`ISO-10303-21`).
    fn allows_dash(&self) -> bool {
        let word = self.window.slice_from_mark();
        word.starts_with(b"ISO") || word.starts_with(b"END")
    }
}

/// Un-double `''` in a string body, leaving every other escape raw.
fn unescape_quotes(body: &str) -> String {
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        value.push(c);
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
            }
            '\\' => match chars.peek() {
                Some('\\') => {
                    value.push('\\');
                    chars.next();
                }
                Some('S') => {
                    value.push('S');
                    chars.next();
                    if chars.peek() == Some(&'\\') {
                        value.push('\\');
                        chars.next();
                        if let Some(payload) = chars.next() {
                            value.push(payload);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    value
}
