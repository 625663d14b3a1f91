// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Part21 serialisation of syntax nodes

use std::io::Write;

use crate::codec;
use crate::error::{Error, Result};
use crate::kind::StepKind;
use crate::node::StepNode;
use crate::token::{string_body, StepToken};

/// Write any node back as Part21 text.
///
/// Strings are re-escaped through decode and encode; missing tokens are written
/// with their canonical text, and an unparsable argument or a malformed literal
/// is written as `$`. A line break follows every keyword and every statement `;`.
///
/// Nodes without a Part21 form are rejected with [`Error::Unwritable`] before
/// anything is written: bare assignments, whose arguments were skipped, and
/// entities whose type name or label is missing or invalid.
pub fn write_part21<W: Write + ?Sized>(node: &StepNode, writer: &mut W) -> Result<()> {
    check_writable(node)?;
    write_node(node, writer)
}

fn check_writable(node: &StepNode) -> Result<()> {
    let unwritable = |reason| Error::Unwritable {
        kind: node.kind(),
        span: node.span(),
        reason,
    };
    let first_child_invalid = || {
        node.children()
            .first()
            .and_then(StepNode::as_token)
            .map_or(true, |token| token.is_missing() || token.is_malformed())
    };

    match node.kind() {
        StepKind::BareAssignment => Err(unwritable("arguments were skipped by a bare parse")),
        StepKind::EntityAssignment if first_child_invalid() => {
            Err(unwritable("entity label is missing or invalid"))
        }
        StepKind::Entity if first_child_invalid() => Err(unwritable("entity type is missing")),
        StepKind::ArgumentError => Ok(()),
        _ => node.children().iter().try_for_each(check_writable),
    }
}

fn write_node<W: Write + ?Sized>(node: &StepNode, writer: &mut W) -> Result<()> {
    match node {
        StepNode::Token(token) => write_token(token, writer),
        StepNode::Composite(composite) if composite.kind() == StepKind::ArgumentError => {
            writer.write_all(b"$")?;
            Ok(())
        }
        StepNode::Composite(composite) => {
            for child in composite.children() {
                write_node(child, writer)?;
            }
            Ok(())
        }
    }
}

/// Serialise a node into a string.
pub fn to_part21_string(node: &StepNode) -> Result<String> {
    let mut buffer = Vec::new();
    write_part21(node, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn write_token<W: Write + ?Sized>(token: &StepToken, writer: &mut W) -> Result<()> {
    let kind = token.kind();
    if token.is_missing() {
        if let Some(text) = kind.canonical_text() {
            writer.write_all(text.as_bytes())?;
        }
    } else if token.is_malformed() && is_value_literal(kind) {
        writer.write_all(b"$")?;
    } else if kind == StepKind::String && !token.text().is_empty() {
        writer.write_all(reescape_string(token).as_bytes())?;
    } else if kind.is_keyword() && !token.text().ends_with(';') {
        writer.write_all(token.text().as_bytes())?;
        writer.write_all(b";")?;
    } else {
        writer.write_all(token.text().as_bytes())?;
    }

    if kind.is_keyword() || kind == StepKind::Semicolon {
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Literals whose malformed lexeme would not lex again as the same kind.
fn is_value_literal(kind: StepKind) -> bool {
    matches!(
        kind,
        StepKind::Integer
            | StepKind::Float
            | StepKind::Identity
            | StepKind::Enumeration
            | StepKind::Hex
    )
}

/// `'…'` literal with canonical escapes, or the raw lexeme if it cannot be decoded.
pub(crate) fn reescape_string(token: &StepToken) -> String {
    let body = string_body(token.text());
    match codec::decode(body) {
        Ok(decoded) => format!("'{}'", codec::encode(&decoded)),
        Err(err) => {
            tracing::warn!(
                span = %token.span(),
                error = %err,
                "String cannot be re-encoded, writing it unchanged"
            );
            let mut raw = token.text().to_string();
            if !raw.ends_with('\'') || raw.len() == 1 {
                raw.push('\'');
            }
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{parse_entity_assignment, parse_text};
    use crate::Fidelity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_assignment() {
        let (node, _) = parse_entity_assignment("#5=IFCWALL('a',(#1,#2),.T.,$,*,1.5,\"0F\");");
        assert_eq!(
            to_part21_string(&node).unwrap(),
            "#5=IFCWALL('a',(#1,#2),.T.,$,*,1.5,\"0F\");\n"
        );
    }

    #[test]
    fn test_strings_are_reescaped() {
        let (node, _) = parse_entity_assignment(r"#1=A('\X2\00E9\X0\','\S\i','it''s');");
        assert_eq!(
            to_part21_string(&node).unwrap(),
            "#1=A('\\X\\E9','\\X\\E9','it''s');\n"
        );
    }

    #[test]
    fn test_missing_tokens_use_canonical_text() {
        let (node, diagnostics) = parse_entity_assignment("#1=A(1,)");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(to_part21_string(&node).unwrap(), "#1=A(1,$);\n");
    }

    #[test]
    fn test_argument_errors_become_undefined() {
        let (node, diagnostics) = parse_entity_assignment("#1=A(1,=,2);");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(to_part21_string(&node).unwrap(), "#1=A(1,$,2);\n");
    }

    #[test]
    fn test_malformed_literals_become_undefined() {
        for (text, expected) in [
            ("#1=A(.X);", "#1=A($);\n"),
            ("#1=A(\"0F);", "#1=A($);\n"),
            ("#1=A(99999999999999999999,1.#XYZ,#99999999999999999999);", "#1=A($,$,$);\n"),
        ] {
            let (node, diagnostics) = parse_entity_assignment(text);
            assert!(!diagnostics.is_empty(), "{text}");
            let written = to_part21_string(&node).unwrap();
            assert_eq!(written, expected);
            let (_, diagnostics) = parse_entity_assignment(&written);
            assert!(diagnostics.is_empty(), "{written}: {diagnostics:?}");
        }
    }

    #[test]
    fn test_missing_type_or_label_is_rejected() {
        let (node, _) = parse_entity_assignment("#1=(1);");
        let err = to_part21_string(&node).unwrap_err();
        assert!(matches!(
            err,
            Error::Unwritable { kind: StepKind::Entity, reason: "entity type is missing", .. }
        ));

        let (node, _) = parse_entity_assignment("#99999999999999999999=A(1);");
        let err = to_part21_string(&node).unwrap_err();
        assert!(matches!(err, Error::Unwritable { kind: StepKind::EntityAssignment, .. }));
    }

    #[test]
    fn test_bare_assignment_is_rejected() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=IFCWALL('g',$,(1,2));ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse_text(text, Fidelity::Bare);
        assert!(diagnostics.is_empty());
        let member = file.members().next().unwrap();
        let kinds: Vec<_> = member.children().iter().map(StepNode::kind).collect();
        assert_eq!(
            kinds,
            [
                StepKind::Identity,
                StepKind::Equals,
                StepKind::Identifier,
                StepKind::OpenParen,
                StepKind::String,
                StepKind::Semicolon,
            ]
        );

        let mut buffer = Vec::new();
        let err = write_part21(&file, &mut buffer).unwrap_err();
        assert!(matches!(err, Error::Unwritable { kind: StepKind::BareAssignment, .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_file_layout() {
        let text = "ISO-10303-21;HEADER;FILE_SCHEMA(('IFC4'));ENDSEC;DATA;#1=A();ENDSEC;END-ISO-10303-21;";
        let (file, diagnostics) = parse_text(text, Fidelity::Full);
        assert!(diagnostics.is_empty());
        assert_eq!(
            to_part21_string(&file).unwrap(),
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n#1=A();\nENDSEC;\nEND-ISO-10303-21;\n"
        );
    }
}
