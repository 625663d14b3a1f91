// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lexical and syntactic diagnostics
//!
//! Malformed input never aborts a parse. Every problem becomes a [`Diagnostic`]
//! in a [`DiagnosticBag`]; an optional observer sees each one as it is reported
//! and may ask the parser to stop.

use std::fmt;
use std::ops::ControlFlow;

use crate::kind::StepKind;
use crate::text::{TextLocation, TextSpan};

/// One reported problem.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    location: TextLocation,
    message: String,
}

impl Diagnostic {
    pub fn new(location: TextLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    pub fn location(&self) -> &TextLocation {
        &self.location
    }

    pub fn span(&self) -> TextSpan {
        self.location.span()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Live observer of diagnostics. Returning `Break` halts the parse.
pub type DiagnosticObserver<'a> = Box<dyn FnMut(&Diagnostic) -> ControlFlow<()> + 'a>;

/// Ordered, non-deduplicated collection of diagnostics.
#[derive(Default)]
pub struct DiagnosticBag<'a> {
    diagnostics: Vec<Diagnostic>,
    observer: Option<DiagnosticObserver<'a>>,
    halted: bool,
}

impl<'a> DiagnosticBag<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: impl FnMut(&Diagnostic) -> ControlFlow<()> + 'a) -> Self {
        Self {
            diagnostics: Vec::new(),
            observer: Some(Box::new(observer)),
            halted: false,
        }
    }

    pub fn report(&mut self, location: TextLocation, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(location, message);
        tracing::trace!(%diagnostic, "Diagnostic reported");
        if !self.halted {
            if let Some(observer) = self.observer.as_mut() {
                if observer(&diagnostic).is_break() {
                    tracing::debug!("Diagnostic observer requested a halt");
                    self.halted = true;
                }
            }
        }
        self.diagnostics.push(diagnostic);
    }

    /// Whether the observer asked to stop.
    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn report_invalid_identity(&mut self, location: TextLocation, text: &str) {
        self.report(
            location,
            format!("The identity {text} isn't valid, likely too long."),
        );
    }

    pub fn report_invalid_keyword(&mut self, location: TextLocation, text: &str) {
        self.report(
            location,
            format!("The keyword {text} isn't terminated as expected with a ';'."),
        );
    }

    pub fn report_invalid_number(&mut self, location: TextLocation, text: &str, kind: StepKind) {
        let expected = if kind == StepKind::Float { "Float" } else { "Int" };
        self.report(location, format!("The number {text} isn't valid {expected}."));
    }

    pub fn report_bad_character(&mut self, location: TextLocation, character: char) {
        self.report(location, format!("Bad character input: '{character}'."));
    }

    pub fn report_unterminated_string(&mut self, location: TextLocation) {
        self.report(location, "Unterminated string literal.");
    }

    pub fn report_unterminated_enumeration(&mut self, location: TextLocation) {
        self.report(location, "Unterminated enumeration literal.");
    }

    pub fn report_unterminated_comment(&mut self, location: TextLocation) {
        self.report(location, "Unterminated multi-line comment.");
    }

    pub fn report_unterminated_hex(&mut self, location: TextLocation) {
        self.report(location, "Unterminated hex literal.");
    }

    pub fn report_invalid_hex(&mut self, location: TextLocation, character: char) {
        self.report(location, format!("Invalid hex digit '{character}'."));
    }

    pub fn report_unexpected_token(
        &mut self,
        location: TextLocation,
        actual: StepKind,
        expected: impl fmt::Display,
    ) {
        self.report(
            location,
            format!("Unexpected token <{actual}>, expected <{expected}>."),
        );
    }
}

impl<'b, 'a> IntoIterator for &'b DiagnosticBag<'a> {
    type Item = &'b Diagnostic;
    type IntoIter = std::slice::Iter<'b, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

impl fmt::Debug for DiagnosticBag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticBag")
            .field("diagnostics", &self.diagnostics)
            .field("observed", &self.observer.is_some())
            .field("halted", &self.halted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn at(start: u64, length: u32) -> TextLocation {
        TextLocation::new(Arc::from("t"), TextSpan::new(start, length), None)
    }

    #[test]
    fn test_messages() {
        let mut bag = DiagnosticBag::new();
        bag.report_unterminated_string(at(0, 5));
        bag.report_invalid_number(at(0, 3), "1e9999999999", StepKind::Float);
        bag.report_unexpected_token(at(4, 1), StepKind::Semicolon, StepKind::CloseParen);
        let messages: Vec<_> = bag.iter().map(Diagnostic::message).collect();
        assert_eq!(
            messages,
            [
                "Unterminated string literal.",
                "The number 1e9999999999 isn't valid Float.",
                "Unexpected token <Semicolon>, expected <CloseParen>.",
            ]
        );
    }

    #[test]
    fn test_observer_halts_but_keeps_collecting() {
        let mut seen = 0;
        let mut bag = DiagnosticBag::with_observer(|_| {
            seen += 1;
            ControlFlow::Break(())
        });
        bag.report_bad_character(at(0, 1), '?');
        assert!(bag.halted());
        bag.report_bad_character(at(1, 1), '!');
        assert_eq!(bag.len(), 2);
        drop(bag);
        assert_eq!(seen, 1);
    }
}
