// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing entry points
//!
//! Thin wrappers that pair a source with a [`Lexer`] or [`Parser`], run one pass
//! and hand back the result with the collected diagnostics.

use std::io::{Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::Path;

use crate::buffered::BufferedSource;
use crate::config::ParseConfig;
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::kind::StepKind;
use crate::lexer::Lexer;
use crate::node::StepNode;
use crate::parser::{Fidelity, ParseSummary, Parser, StepHandler};
use crate::source::{SourceText, SourceWindow};
use crate::text::{SourceId, TextSpan};
use crate::token::StepToken;

/// Parse in-memory text into a file tree.
pub fn parse_text(text: &str, fidelity: Fidelity) -> (StepNode, Vec<Diagnostic>) {
    let mut parser = Parser::new(SourceText::from_text(text));
    let file = parser.parse_file(fidelity);
    (file, parser.into_diagnostics())
}

/// Parse any source into a file tree.
///
/// A read failure of the source is returned once the pass has finished.
pub fn parse_source<S: SourceWindow>(
    window: S,
    fidelity: Fidelity,
) -> Result<(StepNode, Vec<Diagnostic>)> {
    let mut parser = Parser::new(window);
    let file = parser.parse_file(fidelity);
    if let Some(err) = parser.take_error() {
        return Err(err.into());
    }
    Ok((file, parser.into_diagnostics()))
}

/// Parse a file through a windowed source sized by `config`.
pub fn parse_file(path: impl AsRef<Path>, config: &ParseConfig) -> Result<(StepNode, Vec<Diagnostic>)> {
    let window = BufferedSource::open_with_capacity(path, config.buffer_size)?;
    let mut parser = if config.stop_on_first_issue {
        Parser::with_observer(window, |_: &Diagnostic| ControlFlow::Break(()))
    } else {
        Parser::new(window)
    };
    let file = parser.parse_file(config.fidelity);
    if let Some(err) = parser.take_error() {
        return Err(err.into());
    }
    Ok((file, parser.into_diagnostics()))
}

/// Every token of `text` including trivia, without the final end-of-file token.
pub fn parse_tokens(text: &str) -> (Vec<StepToken>, Vec<Diagnostic>) {
    parse_tokens_from(SourceText::from_text(text))
}

pub fn parse_tokens_from<S: SourceWindow>(window: S) -> (Vec<StepToken>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(window);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.lex();
        if token.kind() == StepKind::EndOfFile {
            break;
        }
        tokens.push(token);
    }
    (tokens, lexer.into_diagnostics().into_vec())
}

/// Event-mode parse of any source.
pub fn parse_with_events<S: SourceWindow, H: StepHandler + ?Sized>(
    window: S,
    fidelity: Fidelity,
    handler: &mut H,
) -> Result<ParseSummary> {
    run_events(Parser::new(window), fidelity, handler)
}

/// Event-mode parse that also hands every diagnostic to `observer` as soon as
/// it is reported. Returning `Break` from `observer` halts the parse.
pub fn parse_with_events_observed<'a, S, H>(
    window: S,
    fidelity: Fidelity,
    handler: &mut H,
    observer: impl FnMut(&Diagnostic) -> ControlFlow<()> + 'a,
) -> Result<ParseSummary>
where
    S: SourceWindow,
    H: StepHandler + ?Sized,
{
    run_events(Parser::with_observer(window, observer), fidelity, handler)
}

/// Event-mode parse of a file; entries are dropped once `handler` returns.
pub fn parse_file_with_events<H: StepHandler + ?Sized>(
    path: impl AsRef<Path>,
    config: &ParseConfig,
    handler: &mut H,
) -> Result<ParseSummary> {
    parse_file_with_events_observed(path, config, handler, |_: &Diagnostic| {
        ControlFlow::Continue(())
    })
}

/// [`parse_file_with_events`] with a live diagnostic `observer`.
///
/// With `stop_on_first_issue` set the parse halts after the first diagnostic
/// whatever `observer` returns.
pub fn parse_file_with_events_observed<'a, H: StepHandler + ?Sized>(
    path: impl AsRef<Path>,
    config: &ParseConfig,
    handler: &mut H,
    mut observer: impl FnMut(&Diagnostic) -> ControlFlow<()> + 'a,
) -> Result<ParseSummary> {
    let window = BufferedSource::open_with_capacity(path, config.buffer_size)?;
    let stop_on_first_issue = config.stop_on_first_issue;
    let parser = Parser::with_observer(window, move |diagnostic: &Diagnostic| {
        let flow = observer(diagnostic);
        if stop_on_first_issue {
            ControlFlow::Break(())
        } else {
            flow
        }
    });
    run_events(parser, config.fidelity, handler)
}

fn run_events<S: SourceWindow, H: StepHandler + ?Sized>(
    mut parser: Parser<'_, S>,
    fidelity: Fidelity,
    handler: &mut H,
) -> Result<ParseSummary> {
    let summary = parser.parse_events(fidelity, handler);
    if let Some(err) = parser.take_error() {
        return Err(err.into());
    }
    Ok(summary)
}

/// Parse a lone `#id=TYPE(...);` fragment.
pub fn parse_entity_assignment(text: &str) -> (StepNode, Vec<Diagnostic>) {
    let mut parser = Parser::new(SourceText::from_text(text));
    let assignment = parser.parse_entity_assignment();
    (assignment, parser.into_diagnostics())
}

/// Re-read the bytes at `span` from `reader` and parse them as one assignment.
///
/// Spans in the resulting tree are absolute offsets of the original file.
pub fn read_entity_assignment<R: Read + Seek + ?Sized>(
    reader: &mut R,
    span: TextSpan,
    source: SourceId,
) -> Result<(StepNode, Vec<Diagnostic>)> {
    reader.seek(SeekFrom::Start(span.start))?;
    let mut bytes = vec![0u8; span.length as usize];
    reader.read_exact(&mut bytes)?;

    let mut parser = Parser::new(SourceText::fragment(bytes, source, span.start));
    let assignment = parser.parse_entity_assignment();
    Ok((assignment, parser.into_diagnostics()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn test_parse_tokens_keeps_trivia() {
        let (tokens, diagnostics) = parse_tokens("#1 = A(); /* c */");
        assert!(diagnostics.is_empty());
        let kinds: Vec<_> = tokens.iter().map(StepToken::kind).collect();
        assert_eq!(
            kinds,
            [
                StepKind::Identity,
                StepKind::Whitespace,
                StepKind::Equals,
                StepKind::Whitespace,
                StepKind::Identifier,
                StepKind::OpenParen,
                StepKind::CloseParen,
                StepKind::Semicolon,
                StepKind::Whitespace,
                StepKind::Comment,
            ]
        );
    }

    #[test]
    fn test_events_deliver_diagnostics_live() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);#2=B(1.#XYZ);#3=C(.X);#4=D();ENDSEC;END-ISO-10303-21;";
        let mut seen = Vec::new();
        let summary = parse_with_events_observed(
            SourceText::from_text(text),
            Fidelity::Full,
            &mut (),
            |diagnostic: &Diagnostic| {
                seen.push(diagnostic.message().to_string());
                ControlFlow::Continue(())
            },
        )
        .unwrap();
        assert!(!summary.halted);
        assert_eq!(summary.assignments, 4);
        assert_eq!(
            seen,
            [
                "The number 1.#XYZ isn't valid Float.",
                "Unterminated enumeration literal.",
            ]
        );
    }

    #[test]
    fn test_events_observer_can_halt() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);#2=B(?);#3=C();ENDSEC;END-ISO-10303-21;";
        let mut count = 0;
        let summary = parse_with_events_observed(
            SourceText::from_text(text),
            Fidelity::Full,
            &mut (),
            |_: &Diagnostic| {
                count += 1;
                ControlFlow::Break(())
            },
        )
        .unwrap();
        assert!(summary.halted);
        assert_eq!(count, 1);
        assert_eq!(summary.last_assignment.map(|mark| mark.identity), Some(1));
    }

    #[test]
    fn test_read_entity_assignment_from_span() {
        let text = "DATA;\n#1=A(1);\n#2=B(#1,'x');\n";
        let start = text.find("#2").unwrap() as u64;
        let span = TextSpan::new(start, "#2=B(#1,'x');".len() as u32);
        let mut reader = Cursor::new(text.as_bytes());

        let (node, diagnostics) = read_entity_assignment(&mut reader, span, Arc::from("mem")).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(node.identity(), Some(2));
        assert_eq!(node.span(), span);
        assert_eq!(node.first_string(), Some("x"));
    }

    #[test]
    fn test_read_past_end_is_an_error() {
        let mut reader = Cursor::new(b"#1=A();".to_vec());
        let result = read_entity_assignment(&mut reader, TextSpan::new(4, 20), Arc::from("mem"));
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
