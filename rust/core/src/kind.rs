// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Token and node kinds

use std::fmt;

/// Kind of a token or composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepKind {
    // Trivia
    BadToken,
    Whitespace,
    Comment,

    // Punctuation
    EndOfFile,
    Hash,
    Equals,
    OpenParen,
    CloseParen,
    Semicolon,
    Comma,

    // Keywords (text includes the trailing ';')
    StartKeyword,
    EndKeyword,
    HeaderKeyword,
    EndSectionKeyword,
    DataKeyword,

    // Literals
    String,
    Hex,
    Integer,
    Float,
    Undefined,
    Override,
    Boolean,
    Enumeration,
    Identifier,
    Identity,

    // Composites
    File,
    HeaderEntity,
    Entity,
    EntityAssignment,
    BareAssignment,
    ArgumentList,
    ArgumentError,
}

impl StepKind {
    pub const ALL: [StepKind; 32] = [
        StepKind::BadToken,
        StepKind::Whitespace,
        StepKind::Comment,
        StepKind::EndOfFile,
        StepKind::Hash,
        StepKind::Equals,
        StepKind::OpenParen,
        StepKind::CloseParen,
        StepKind::Semicolon,
        StepKind::Comma,
        StepKind::StartKeyword,
        StepKind::EndKeyword,
        StepKind::HeaderKeyword,
        StepKind::EndSectionKeyword,
        StepKind::DataKeyword,
        StepKind::String,
        StepKind::Hex,
        StepKind::Integer,
        StepKind::Float,
        StepKind::Undefined,
        StepKind::Override,
        StepKind::Boolean,
        StepKind::Enumeration,
        StepKind::Identifier,
        StepKind::Identity,
        StepKind::File,
        StepKind::HeaderEntity,
        StepKind::Entity,
        StepKind::EntityAssignment,
        StepKind::BareAssignment,
        StepKind::ArgumentList,
        StepKind::ArgumentError,
    ];

    /// Classify an identifier-shaped word as a keyword.
    ///
    /// `word` excludes the trailing `;`. Matching is exact (keywords are upper case).
    pub fn keyword_kind(word: &str) -> Option<StepKind> {
        match word {
            "STEP" => Some(StepKind::StartKeyword),
            "HEADER" => Some(StepKind::HeaderKeyword),
            "ENDSEC" => Some(StepKind::EndSectionKeyword),
            "DATA" => Some(StepKind::DataKeyword),
            "ENDSTEP" => Some(StepKind::EndKeyword),
            _ if word.starts_with("ISO") => Some(StepKind::StartKeyword),
            _ if word.starts_with("END-ISO") => Some(StepKind::EndKeyword),
            _ => None,
        }
    }

    /// Text of kinds whose lexeme never varies.
    pub fn fixed_text(self) -> Option<&'static str> {
        Some(match self {
            StepKind::Hash => "#",
            StepKind::Equals => "=",
            StepKind::OpenParen => "(",
            StepKind::CloseParen => ")",
            StepKind::Semicolon => ";",
            StepKind::Comma => ",",
            StepKind::HeaderKeyword => "HEADER;",
            StepKind::EndSectionKeyword => "ENDSEC;",
            StepKind::DataKeyword => "DATA;",
            StepKind::Undefined => "$",
            StepKind::Override => "*",
            _ => return None,
        })
    }

    /// Text written for a token of this kind when no source text exists,
    /// e.g. a token synthesised by the parser.
    pub fn canonical_text(self) -> Option<&'static str> {
        match self {
            StepKind::StartKeyword => Some("ISO-10303-21;"),
            StepKind::EndKeyword => Some("END-ISO-10303-21;"),
            StepKind::EndOfFile => Some(""),
            _ => self.fixed_text(),
        }
    }

    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            StepKind::BadToken | StepKind::Whitespace | StepKind::Comment
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            StepKind::StartKeyword
                | StepKind::EndKeyword
                | StepKind::HeaderKeyword
                | StepKind::EndSectionKeyword
                | StepKind::DataKeyword
        )
    }

    pub fn is_composite(self) -> bool {
        matches!(
            self,
            StepKind::File
                | StepKind::HeaderEntity
                | StepKind::Entity
                | StepKind::EntityAssignment
                | StepKind::BareAssignment
                | StepKind::ArgumentList
                | StepKind::ArgumentError
        )
    }

    /// Kinds that may start an argument
    pub fn is_argument_start(self) -> bool {
        matches!(
            self,
            StepKind::Identity
                | StepKind::Integer
                | StepKind::Float
                | StepKind::String
                | StepKind::Boolean
                | StepKind::Enumeration
                | StepKind::Hex
                | StepKind::Undefined
                | StepKind::Override
                | StepKind::OpenParen
                | StepKind::Identifier
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_table() {
        assert_eq!(StepKind::keyword_kind("ISO-10303-21"), Some(StepKind::StartKeyword));
        assert_eq!(StepKind::keyword_kind("STEP"), Some(StepKind::StartKeyword));
        assert_eq!(StepKind::keyword_kind("END-ISO-10303-21"), Some(StepKind::EndKeyword));
        assert_eq!(StepKind::keyword_kind("ENDSTEP"), Some(StepKind::EndKeyword));
        assert_eq!(StepKind::keyword_kind("ENDSEC"), Some(StepKind::EndSectionKeyword));
        assert_eq!(StepKind::keyword_kind("HEADER"), Some(StepKind::HeaderKeyword));
        assert_eq!(StepKind::keyword_kind("DATA"), Some(StepKind::DataKeyword));
        assert_eq!(StepKind::keyword_kind("IFCWALL"), None);
        assert_eq!(StepKind::keyword_kind("ENDX"), None);
    }

    #[test]
    fn test_categories_are_disjoint() {
        for kind in StepKind::ALL {
            let flags = [kind.is_trivia(), kind.is_keyword(), kind.is_composite()];
            assert!(flags.iter().filter(|&&f| f).count() <= 1, "{kind}");
        }
    }
}
