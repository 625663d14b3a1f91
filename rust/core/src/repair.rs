// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Repair of malformed Part21 files
//!
//! The file is streamed through the full parser and every entry is written out
//! as soon as it has been parsed. Tokens the parser had to synthesise are written
//! with their canonical text and malformed literals as `$`. Entries that have no
//! Part21 form, such as an assignment without an entity type, are dropped with a
//! diagnostic. The output is structurally legal even when the input was not.

use std::cell::Cell;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use crate::buffered::BufferedSource;
use crate::config::ParseConfig;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::node::StepNode;
use crate::parser::{AssignmentMark, Fidelity, Parser, StepHandler};
use crate::source::SourceWindow;
use crate::text::{LineIndex, TextLocation};
use crate::writer::write_part21;

const PROLOGUE: &[u8] = b"ISO-10303-21;\nHEADER;\n";
const DATA_START: &[u8] = b"ENDSEC;\nDATA;\n";
const EPILOGUE: &[u8] = b"ENDSEC;\nEND-ISO-10303-21;\n";

/// Outcome of [`repair`].
#[derive(Debug, Default)]
pub struct RepairSummary {
    /// Header entities written
    pub header_entities: usize,
    /// Assignments written
    pub assignments: usize,
    /// Entries left out because they cannot be written as Part21
    pub dropped: usize,
    /// Parser diagnostics followed by one per dropped entry
    pub diagnostics: Vec<Diagnostic>,
    /// Last assignment that parsed without any diagnostic
    pub last_assignment: Option<AssignmentMark>,
    /// Stopped at the first diagnostic
    pub halted: bool,
}

struct RepairWriter<'w, W: Write + ?Sized> {
    writer: &'w mut W,
    /// Start offset of the first diagnostic, tracked in stop-on-issue mode
    first_issue: Option<&'w Cell<Option<u64>>>,
    lines: Option<Arc<LineIndex>>,
    in_data: bool,
    header_entities: usize,
    assignments: usize,
    dropped: Vec<Diagnostic>,
    error: Option<Error>,
}

impl<W: Write + ?Sized> RepairWriter<'_, W> {
    /// Whether `entry` ends before the first diagnostic and has its own `;`.
    ///
    /// The parser reads one token ahead, so a problem at the start of the next
    /// entry is reported before this one is handed over.
    fn is_complete(&self, entry: &StepNode) -> bool {
        match self.first_issue.and_then(Cell::get) {
            None => true,
            Some(start) => {
                entry.span().end() <= start
                    && !entry.children().last().is_some_and(StepNode::is_missing)
            }
        }
    }

    /// Write `entry`; `Continue(false)` when it was dropped.
    fn write(&mut self, entry: &StepNode) -> ControlFlow<(), bool> {
        match write_part21(entry, &mut *self.writer) {
            Ok(()) => ControlFlow::Continue(true),
            Err(Error::Unwritable { span, reason, .. }) => {
                tracing::warn!(%span, reason, "Dropping entry from repaired output");
                if let Some(token) = entry.first_token() {
                    let location =
                        TextLocation::new(token.source().clone(), span, self.lines.clone());
                    self.dropped.push(Diagnostic::new(
                        location,
                        format!("Entry dropped from repaired output: {reason}."),
                    ));
                }
                ControlFlow::Continue(false)
            }
            Err(err) => {
                tracing::error!(error = %err, "Writing repaired output failed");
                self.error = Some(err);
                ControlFlow::Break(())
            }
        }
    }

    fn start_data(&mut self) -> io::Result<()> {
        if !self.in_data {
            self.in_data = true;
            self.writer.write_all(DATA_START)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> StepHandler for RepairWriter<'_, W> {
    fn header_entity(&mut self, entity: &StepNode) -> ControlFlow<()> {
        if !self.is_complete(entity) {
            return ControlFlow::Break(());
        }
        match self.write(entity) {
            ControlFlow::Continue(written) => {
                self.header_entities += usize::from(written);
                ControlFlow::Continue(())
            }
            ControlFlow::Break(()) => ControlFlow::Break(()),
        }
    }

    fn assignment(&mut self, assignment: &StepNode) -> ControlFlow<()> {
        if !self.is_complete(assignment) {
            return ControlFlow::Break(());
        }
        if let Err(err) = self.start_data() {
            self.error = Some(err.into());
            return ControlFlow::Break(());
        }
        tracing::trace!(identity = ?assignment.identity(), "Writing repaired assignment");
        match self.write(assignment) {
            ControlFlow::Continue(written) => {
                self.assignments += usize::from(written);
                ControlFlow::Continue(())
            }
            ControlFlow::Break(()) => ControlFlow::Break(()),
        }
    }
}

/// Stream `window` through the full parser and write a legal Part21 file.
///
/// With `stop_on_first_issue` the pass halts at the first diagnostic. Entries
/// that completed before it are written, the entry it was raised in is not, and
/// the output is closed after the last complete entry.
pub fn repair<S: SourceWindow, W: Write + ?Sized>(
    window: S,
    writer: &mut W,
    stop_on_first_issue: bool,
) -> Result<RepairSummary> {
    let first_issue = Cell::new(None);
    let lines = window.line_index();
    let mut parser = if stop_on_first_issue {
        Parser::with_observer(window, |diagnostic: &Diagnostic| {
            if first_issue.get().is_none() {
                first_issue.set(Some(diagnostic.span().start));
            }
            ControlFlow::Break(())
        })
    } else {
        Parser::new(window)
    };

    writer.write_all(PROLOGUE)?;
    let mut handler = RepairWriter {
        writer,
        first_issue: stop_on_first_issue.then_some(&first_issue),
        lines,
        in_data: false,
        header_entities: 0,
        assignments: 0,
        dropped: Vec::new(),
        error: None,
    };
    let mut summary = parser.parse_events(Fidelity::Full, &mut handler);
    if let Some(err) = handler.error.take() {
        return Err(err);
    }
    if let Some(err) = parser.take_error() {
        return Err(err.into());
    }
    handler.start_data()?;
    handler.writer.write_all(EPILOGUE)?;
    handler.writer.flush()?;

    tracing::debug!(
        header_entities = handler.header_entities,
        assignments = handler.assignments,
        dropped = handler.dropped.len(),
        diagnostics = summary.diagnostics.len(),
        halted = summary.halted,
        "Repair finished"
    );
    let dropped = handler.dropped.len();
    summary.diagnostics.append(&mut handler.dropped);
    Ok(RepairSummary {
        header_entities: handler.header_entities,
        assignments: handler.assignments,
        dropped,
        diagnostics: summary.diagnostics,
        last_assignment: summary.last_assignment,
        halted: summary.halted,
    })
}

/// Repair a file read through a windowed source sized by `config`.
pub fn repair_file<W: Write + ?Sized>(
    path: impl AsRef<Path>,
    writer: &mut W,
    config: &ParseConfig,
) -> Result<RepairSummary> {
    let window = BufferedSource::open_with_capacity(path, config.buffer_size)?;
    repair(window, writer, config.stop_on_first_issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_text;
    use crate::source::SourceText;
    use pretty_assertions::assert_eq;

    const BROKEN: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'))
ENDSEC;
DATA;
#1=IFCPERSON($,'Doe' 'John');
#2=IFCWALL('a',#1;
#4=IFCX(1,,2);
#3=IFCCARTESIANPOINT((0.,1.5));
ENDSEC;
END-ISO-10303-21;
";

    fn run(text: &str, stop: bool) -> (String, RepairSummary) {
        let mut out = Vec::new();
        let summary = repair(SourceText::from_text(text), &mut out, stop).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    #[test]
    fn test_repair_output_is_clean() {
        let (output, summary) = run(BROKEN, false);
        assert!(!summary.halted);
        assert_eq!(summary.header_entities, 1);
        assert_eq!(summary.assignments, 4);
        assert!(!summary.diagnostics.is_empty());

        let (reparsed, diagnostics) = parse_text(&output, Fidelity::Full);
        assert!(diagnostics.is_empty(), "{output}\n{diagnostics:?}");
        let ids: Vec<_> = reparsed.members().filter_map(StepNode::identity).collect();
        assert_eq!(ids, [1, 2, 4, 3]);
        assert!(output.contains("#4=IFCX(1,$,2);"));
    }

    #[test]
    fn test_repair_clean_input_is_canonical() {
        let text = "ISO-10303-21;HEADER;FILE_SCHEMA(('IFC4'));ENDSEC;DATA;#1=A('it''s',.T.);ENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, false);
        assert!(summary.diagnostics.is_empty());
        assert_eq!(
            output,
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n#1=A('it''s',.T.);\nENDSEC;\nEND-ISO-10303-21;\n"
        );
    }

    #[test]
    fn test_repair_stop_on_first_issue() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);#2=B(2 3);#3=C();ENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, true);
        assert!(summary.halted);
        assert_eq!(summary.diagnostics.len(), 1);
        assert_eq!(summary.last_assignment.map(|mark| mark.identity), Some(1));
        assert_eq!(summary.assignments, 1);
        assert_eq!(
            output,
            "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=A(1);\nENDSEC;\nEND-ISO-10303-21;\n"
        );
    }

    #[test]
    fn test_stop_keeps_entry_before_bad_label() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);\n#2=B(2);\n#99999999999999999999999=C();\nENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, true);
        assert!(summary.halted);
        assert_eq!(summary.last_assignment.map(|mark| mark.identity), Some(2));
        assert_eq!(summary.assignments, 2);
        assert_eq!(
            output,
            "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=A(1);\n#2=B(2);\nENDSEC;\nEND-ISO-10303-21;\n"
        );
    }

    #[test]
    fn test_stop_skips_entry_without_semicolon() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(1);#2=B(2)\n#3=C();ENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, true);
        assert_eq!(summary.last_assignment.map(|mark| mark.identity), Some(1));
        assert_eq!(summary.assignments, 1);
        assert!(!output.contains("#2="));
    }

    #[test]
    fn test_malformed_literals_are_undefined() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=A(.X);\n#2=B();\n#3=C(\"0F);ENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, false);
        assert_eq!(summary.diagnostics.len(), 2);
        assert_eq!(summary.assignments, 3);
        assert_eq!(summary.dropped, 0);
        assert!(output.contains("#1=A($);\n#2=B();\n#3=C($);\n"), "{output}");

        let (_, diagnostics) = parse_text(&output, Fidelity::Full);
        assert!(diagnostics.is_empty(), "{output}\n{diagnostics:?}");
    }

    #[test]
    fn test_entry_without_type_is_dropped() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=(1);#2=B(2);ENDSEC;END-ISO-10303-21;";
        let (output, summary) = run(text, false);
        assert_eq!(summary.assignments, 1);
        assert_eq!(summary.dropped, 1);
        let last = summary.diagnostics.last().unwrap();
        assert_eq!(
            last.message(),
            "Entry dropped from repaired output: entity type is missing."
        );

        let (reparsed, diagnostics) = parse_text(&output, Fidelity::Full);
        assert!(diagnostics.is_empty(), "{output}\n{diagnostics:?}");
        let ids: Vec<_> = reparsed.members().filter_map(StepNode::identity).collect();
        assert_eq!(ids, [2]);
    }
}
