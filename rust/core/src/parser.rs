// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recursive-descent STEP parser
//!
//! One token of lookahead, trivia filtered out before the grammar sees it:
//!
//! ```text
//! File         := StartKeyword HEADER; HeaderEntry* ENDSEC; DATA; DataEntry* ENDSEC; EndKeyword
//! HeaderEntry  := Entity ';'
//! DataEntry    := Identity '=' Entity ';'
//! Entity       := Identifier ArgumentList
//! ArgumentList := '(' (Argument (',' Argument)*)? ')'
//! Argument     := Identity | Integer | Float | String | Boolean | Enumeration
//!               | Hex | Undefined | Override | ArgumentList | Entity
//! ```
//!
//! Recovery never throws: [`Parser::match_token`] reports an unexpected token and
//! synthesises a zero-width missing token in its place.

use std::ops::ControlFlow;

use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::kind::StepKind;
use crate::lexer::Lexer;
use crate::node::StepNode;
use crate::source::SourceWindow;
use crate::text::TextSpan;
use crate::token::StepToken;

/// How much of each data section entry is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fidelity {
    /// Complete argument tree per entity
    #[default]
    Full,
    /// Identity, type and first string only; the rest is skipped
    Bare,
}

/// Per-entity callbacks for event-mode parsing.
///
/// Nodes are dropped after the callback returns. Returning `Break` stops the parse.
pub trait StepHandler {
    fn header_entity(&mut self, _entity: &StepNode) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn assignment(&mut self, _assignment: &StepNode) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl StepHandler for () {}

/// Identity and span of an assignment that parsed without diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentMark {
    pub identity: u64,
    pub span: TextSpan,
}

/// Outcome of an event-mode parse.
#[derive(Debug, Default)]
pub struct ParseSummary {
    pub header_entities: usize,
    pub assignments: usize,
    /// Last assignment completed without any diagnostic
    pub last_assignment: Option<AssignmentMark>,
    /// Stopped early by a handler or the diagnostic observer
    pub halted: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Pieces of a file handed from the section driver to a sink.
enum Piece {
    Token(StepToken),
    Header(StepNode),
    Assignment(StepNode),
}

pub struct Parser<'a, S: SourceWindow> {
    lexer: Lexer<'a, S>,
    current: StepToken,
    last_assignment: Option<AssignmentMark>,
    stopped: bool,
    header_count: usize,
    assignment_count: usize,
}

impl<'a, S: SourceWindow> Parser<'a, S> {
    pub fn new(window: S) -> Self {
        Self::with_diagnostics(window, DiagnosticBag::new())
    }

    /// Parser whose diagnostics are also delivered live to `observer`.
    pub fn with_observer(
        window: S,
        observer: impl FnMut(&Diagnostic) -> ControlFlow<()> + 'a,
    ) -> Self {
        Self::with_diagnostics(window, DiagnosticBag::with_observer(observer))
    }

    pub fn with_diagnostics(window: S, diagnostics: DiagnosticBag<'a>) -> Self {
        let mut lexer = Lexer::with_diagnostics(window, diagnostics);
        let current = next_significant(&mut lexer);
        Self {
            lexer,
            current,
            last_assignment: None,
            stopped: false,
            header_count: 0,
            assignment_count: 0,
        }
    }

    pub fn current(&self) -> &StepToken {
        &self.current
    }

    pub fn diagnostics(&self) -> &DiagnosticBag<'a> {
        self.lexer.diagnostics()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.lexer.into_diagnostics().into_vec()
    }

    /// Whether a handler or the diagnostic observer stopped the parse.
    pub fn halted(&self) -> bool {
        self.stopped || self.lexer.diagnostics().halted()
    }

    pub fn last_assignment(&self) -> Option<AssignmentMark> {
        self.last_assignment
    }

    /// Read failure of the underlying source, if the input ended early.
    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.lexer.take_error()
    }

    fn advance(&mut self) -> StepToken {
        let next = next_significant(&mut self.lexer);
        std::mem::replace(&mut self.current, next)
    }

    fn at(&self, kind: StepKind) -> bool {
        self.current.kind() == kind
    }

    fn report_unexpected(&mut self, expected: impl std::fmt::Display) {
        let location = self.lexer.location(self.current.span());
        let actual = self.current.kind();
        self.lexer
            .diagnostics_mut()
            .report_unexpected_token(location, actual, expected);
    }

    fn missing(&self, kind: StepKind) -> StepToken {
        StepToken::missing(kind, self.lexer.source_id().clone(), self.current.position())
    }

    /// Consume the current token if it has `kind`, otherwise report it and
    /// return a missing token of `kind`.
    pub fn match_token(&mut self, kind: StepKind) -> StepToken {
        if self.at(kind) {
            return self.advance();
        }
        self.report_unexpected(kind);
        self.missing(kind)
    }

    /// Parse a complete file into a tree.
    pub fn parse_file(&mut self, fidelity: Fidelity) -> StepNode {
        let mut children = Vec::new();
        self.drive(fidelity, &mut |piece: Piece| {
            children.push(match piece {
                Piece::Token(token) => StepNode::Token(token),
                Piece::Header(node) | Piece::Assignment(node) => node,
            });
            ControlFlow::Continue(())
        });
        StepNode::composite(StepKind::File, children)
    }

    /// Parse a complete file, handing each entry to `handler` without retaining it.
    pub fn parse_events<H: StepHandler + ?Sized>(
        &mut self,
        fidelity: Fidelity,
        handler: &mut H,
    ) -> ParseSummary {
        self.drive(fidelity, &mut |piece: Piece| match piece {
            Piece::Token(_) => ControlFlow::Continue(()),
            Piece::Header(node) => {
                tracing::trace!(kind = ?node.express_type(), "Header entity");
                handler.header_entity(&node)
            }
            Piece::Assignment(node) => {
                tracing::trace!(identity = ?node.identity(), "Assignment");
                handler.assignment(&node)
            }
        });
        ParseSummary {
            header_entities: self.header_count,
            assignments: self.assignment_count,
            last_assignment: self.last_assignment,
            halted: self.halted(),
            diagnostics: self.lexer.diagnostics().as_slice().to_vec(),
        }
    }

    /// Parse a single `#id=TYPE(...);` fragment, then expect end of input.
    pub fn parse_entity_assignment(&mut self) -> StepNode {
        let assignment = self.parse_assignment(Fidelity::Full);
        if !self.at(StepKind::EndOfFile) {
            self.report_unexpected(StepKind::EndOfFile);
        }
        assignment
    }

    fn drive(&mut self, fidelity: Fidelity, sink: &mut dyn FnMut(Piece) -> ControlFlow<()>) {
        let mut emit = |parser: &mut Self, piece: Piece| {
            if sink(piece).is_break() {
                parser.stopped = true;
            }
        };

        let start = self.match_token(StepKind::StartKeyword);
        emit(self, Piece::Token(start));
        let header = self.match_token(StepKind::HeaderKeyword);
        emit(self, Piece::Token(header));

        while !self.halted() && !self.at_section_boundary() {
            if self.at(StepKind::Identifier) {
                let entity = self.parse_header_entity();
                self.header_count += 1;
                emit(self, Piece::Header(entity));
            } else {
                self.resync(StepKind::Identifier);
            }
        }
        if self.halted() {
            return;
        }

        let end_header = self.match_token(StepKind::EndSectionKeyword);
        emit(self, Piece::Token(end_header));
        let data = self.match_token(StepKind::DataKeyword);
        emit(self, Piece::Token(data));

        while !self.halted() && !self.at_section_boundary() {
            if self.at(StepKind::Identity) {
                let assignment = self.parse_assignment(fidelity);
                self.assignment_count += 1;
                emit(self, Piece::Assignment(assignment));
            } else {
                self.resync(StepKind::Identity);
            }
        }
        if self.halted() {
            return;
        }

        let end_data = self.match_token(StepKind::EndSectionKeyword);
        emit(self, Piece::Token(end_data));
        let end = self.match_token(StepKind::EndKeyword);
        emit(self, Piece::Token(end));
        let eof = self.match_token(StepKind::EndOfFile);
        emit(self, Piece::Token(eof));

        tracing::debug!(
            header_entities = self.header_count,
            assignments = self.assignment_count,
            diagnostics = self.lexer.diagnostics().len(),
            "Parse finished"
        );
    }

    fn at_section_boundary(&self) -> bool {
        matches!(
            self.current.kind(),
            StepKind::EndSectionKeyword
                | StepKind::DataKeyword
                | StepKind::EndKeyword
                | StepKind::EndOfFile
        )
    }

    /// Report the current token once and skip up to the next `restart` token or
    /// section boundary.
    fn resync(&mut self, restart: StepKind) {
        self.report_unexpected(restart);
        while !self.halted() && !self.at(restart) && !self.at_section_boundary() {
            self.advance();
        }
    }

    fn parse_header_entity(&mut self) -> StepNode {
        let entity = self.parse_entity();
        let semicolon = self.match_token(StepKind::Semicolon);
        StepNode::composite(StepKind::HeaderEntity, vec![entity, semicolon.into()])
    }

    fn parse_assignment(&mut self, fidelity: Fidelity) -> StepNode {
        let diagnostics_before = self.lexer.diagnostics().len();
        let identity = self.match_token(StepKind::Identity);

        let mut children = match fidelity {
            Fidelity::Full => {
                let equals = self.match_token(StepKind::Equals);
                let entity = self.parse_entity();
                vec![identity.into(), equals.into(), entity]
            }
            Fidelity::Bare => self.parse_bare_body(identity),
        };

        if self.at(StepKind::Semicolon)
            && self.lexer.diagnostics().len() == diagnostics_before
        {
            if let Some(id) = children.first().and_then(StepNode::identity) {
                let start = children[0].span().start;
                self.last_assignment = Some(AssignmentMark {
                    identity: id,
                    span: TextSpan::from_bounds(start, self.current.span().end()),
                });
            }
        }
        self.lexer.set_ignore_values(false);
        let semicolon = self.match_token(StepKind::Semicolon);
        children.push(semicolon.into());

        let kind = match fidelity {
            Fidelity::Full => StepKind::EntityAssignment,
            Fidelity::Bare => StepKind::BareAssignment,
        };
        StepNode::composite(kind, children)
    }

    /// `= TYPE ( 'first string'?` then skip everything up to the closing `;`.
    ///
    /// Leaves the lexer in value-skip mode; the caller clears it before consuming `;`.
    fn parse_bare_body(&mut self, identity: StepToken) -> Vec<StepNode> {
        let equals = self.match_token(StepKind::Equals);
        let express_type = self.match_token(StepKind::Identifier);
        let open = self.match_token(StepKind::OpenParen);

        let mut children = vec![
            StepNode::from(identity),
            equals.into(),
            express_type.into(),
            open.into(),
        ];
        self.lexer.set_ignore_values(true);
        if self.at(StepKind::String) {
            children.push(self.advance().into());
        }
        while !self.halted()
            && !matches!(
                self.current.kind(),
                StepKind::Semicolon
                    | StepKind::EndSectionKeyword
                    | StepKind::EndKeyword
                    | StepKind::EndOfFile
            )
        {
            self.advance();
        }
        children
    }

    fn parse_entity(&mut self) -> StepNode {
        let express_type = self.match_token(StepKind::Identifier);
        let arguments = self.parse_argument_list();
        StepNode::composite(StepKind::Entity, vec![express_type.into(), arguments])
    }

    fn parse_argument_list(&mut self) -> StepNode {
        let open = self.match_token(StepKind::OpenParen);
        if open.is_missing() {
            let close = self.missing(StepKind::CloseParen);
            return StepNode::composite(StepKind::ArgumentList, vec![open.into(), close.into()]);
        }

        let mut children = vec![StepNode::from(open)];
        if !self.at(StepKind::CloseParen) {
            loop {
                children.push(self.parse_argument());
                if self.halted() {
                    break;
                }
                match self.current.kind() {
                    StepKind::Comma => children.push(self.advance().into()),
                    kind if ends_argument_list(kind) => break,
                    _ => {
                        self.report_unexpected(StepKind::Comma);
                        children.push(self.missing(StepKind::Comma).into());
                    }
                }
            }
        }
        let close = self.match_token(StepKind::CloseParen);
        children.push(close.into());
        StepNode::composite(StepKind::ArgumentList, children)
    }

    fn parse_argument(&mut self) -> StepNode {
        match self.current.kind() {
            StepKind::OpenParen => self.parse_argument_list(),
            StepKind::Identifier => self.parse_entity(),
            kind if kind.is_argument_start() => self.advance().into(),
            kind => {
                self.report_unexpected("StepArgument");
                let offending = if ends_argument_list(kind) {
                    self.missing(StepKind::Undefined)
                } else {
                    self.advance()
                };
                StepNode::composite(StepKind::ArgumentError, vec![offending.into()])
            }
        }
    }
}

fn ends_argument_list(kind: StepKind) -> bool {
    kind == StepKind::CloseParen
        || kind == StepKind::Semicolon
        || kind == StepKind::EndOfFile
        || kind.is_keyword()
}

fn next_significant<S: SourceWindow>(lexer: &mut Lexer<'_, S>) -> StepToken {
    loop {
        let token = lexer.lex();
        if !token.kind().is_trivia() {
            return token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceText;

    const SMALL: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('a.ifc','2024-01-01T00:00:00',(''),(''),'','','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPERSON($,'Doe','John',$,$,$,$,$);
#2=IFCWALL('0Kz$dn5wT0IxD8ji5ZdkCK',#1,'Wall',$,$,$,$,$,.STANDARD.);
/* comment */
#3=IFCCARTESIANPOINT((0.,1.5,-2.E3));
ENDSEC;
END-ISO-10303-21;
";

    fn parse(text: &str, fidelity: Fidelity) -> (StepNode, Vec<Diagnostic>) {
        let mut parser = Parser::new(SourceText::from_text(text));
        let file = parser.parse_file(fidelity);
        (file, parser.into_diagnostics())
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(Diagnostic::message).collect()
    }

    #[test]
    fn test_parse_file_full() {
        let (file, diagnostics) = parse(SMALL, Fidelity::Full);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(file.headers().count(), 3);
        let members: Vec<_> = file.members().collect();
        assert_eq!(members.len(), 3);
        assert_eq!(members[1].identity(), Some(2));
        assert_eq!(members[1].express_type(), Some("IFCWALL"));
        assert_eq!(members[1].first_string(), Some("0Kz$dn5wT0IxD8ji5ZdkCK"));
        assert_eq!(file.span(), TextSpan::new(0, SMALL.len() as u32));
        assert_eq!(file.last_token().map(StepToken::kind), Some(StepKind::EndOfFile));
    }

    #[test]
    fn test_parse_file_bare_agrees() {
        let (full, _) = parse(SMALL, Fidelity::Full);
        let (bare, diagnostics) = parse(SMALL, Fidelity::Bare);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let pairs: Vec<_> = full.members().zip(bare.members()).collect();
        assert_eq!(pairs.len(), 3);
        for (f, b) in pairs {
            assert_eq!(b.kind(), StepKind::BareAssignment);
            assert_eq!(f.identity(), b.identity());
            assert_eq!(f.express_type(), b.express_type());
            assert_eq!(f.first_string(), b.first_string());
            assert_eq!(f.span(), b.span());
        }
    }

    #[test]
    fn test_missing_semicolon_is_synthesised() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1)\n#2=B(2);ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse(text, Fidelity::Full);
        assert_eq!(
            messages(&diagnostics),
            ["Unexpected token <Identity>, expected <Semicolon>."]
        );
        let members: Vec<_> = file.members().collect();
        assert_eq!(members.len(), 2);
        let semicolon = members[0].children().last().unwrap();
        assert!(semicolon.is_missing());
        assert!(members[0].closing_semicolon().is_some());
        assert_eq!(members[1].identity(), Some(2));
    }

    #[test]
    fn test_unexpected_argument() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1,=,2);#2=B(3,);ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse(text, Fidelity::Full);
        assert_eq!(
            messages(&diagnostics),
            [
                "Unexpected token <Equals>, expected <StepArgument>.",
                "Unexpected token <CloseParen>, expected <StepArgument>.",
            ]
        );
        let members: Vec<_> = file.members().collect();
        let args = members[0].arguments().unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.get(1).unwrap().kind(), StepKind::ArgumentError);
        let args = members[1].arguments().unwrap();
        assert_eq!(args.len(), 2);
        assert!(args.get(1).unwrap().children()[0].is_missing());
    }

    #[test]
    fn test_missing_comma() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1 2);ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse(text, Fidelity::Full);
        assert_eq!(
            messages(&diagnostics),
            ["Unexpected token <Integer>, expected <Comma>."]
        );
        let member = file.members().next().unwrap();
        assert_eq!(member.arguments().unwrap().len(), 2);
    }

    #[test]
    fn test_data_section_resync_reports_once() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;junk 1 2 3;#1=A();ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse(text, Fidelity::Full);
        assert_eq!(
            messages(&diagnostics),
            ["Unexpected token <Identifier>, expected <Identity>."]
        );
        assert_eq!(file.members().count(), 1);
    }

    #[test]
    fn test_bare_skip_stops_at_section_end() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A('x',(1,2)\nENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse(text, Fidelity::Bare);
        assert_eq!(
            messages(&diagnostics),
            ["Unexpected token <EndSectionKeyword>, expected <Semicolon>."]
        );
        let member = file.members().next().unwrap();
        assert_eq!(member.first_string(), Some("x"));
        assert_eq!(file.children().last().map(StepNode::kind), Some(StepKind::EndOfFile));
    }

    struct Collect {
        ids: Vec<u64>,
        stop_after: usize,
    }

    impl StepHandler for Collect {
        fn assignment(&mut self, assignment: &StepNode) -> ControlFlow<()> {
            self.ids.extend(assignment.identity());
            if self.ids.len() == self.stop_after {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    #[test]
    fn test_events_and_handler_halt() {
        let mut parser = Parser::new(SourceText::from_text(SMALL));
        let mut handler = Collect { ids: Vec::new(), stop_after: 2 };
        let summary = parser.parse_events(Fidelity::Bare, &mut handler);
        assert_eq!(handler.ids, [1, 2]);
        assert!(summary.halted);
        assert_eq!(summary.header_entities, 3);
        assert_eq!(summary.assignments, 2);
    }

    #[test]
    fn test_observer_stop_reports_last_good_assignment() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);#2=B(2);#3=C(?);#4=D();ENDSEC;END-ISO-10303-21;";
        let mut seen = Vec::new();
        let mut parser = Parser::with_observer(SourceText::from_text(text), |d: &Diagnostic| {
            seen.push(d.message().to_string());
            ControlFlow::Break(())
        });
        let summary = parser.parse_events(Fidelity::Full, &mut ());
        assert!(summary.halted);
        let last = summary.last_assignment.unwrap();
        assert_eq!(last.identity, 2);
        assert_eq!(&text[last.span.start as usize..last.span.end() as usize], "#2=B(2);");
        drop(parser);
        assert_eq!(seen, ["Bad character input: '?'."]);
    }
}
