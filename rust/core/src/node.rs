// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Syntax tree
//!
//! A node is either a token or a composite tagged with a [`StepKind`]. Composite
//! spans are derived from their first and last child. Child layouts:
//!
//! | Kind               | Children                                         |
//! |--------------------|--------------------------------------------------|
//! | `Entity`           | type identifier, argument list                   |
//! | `ArgumentList`     | `(`, argument, `,`, argument, …, `)`             |
//! | `ArgumentError`    | the offending (or missing) token                 |
//! | `HeaderEntity`     | entity, `;`                                      |
//! | `EntityAssignment` | identity, `=`, entity, `;`                       |
//! | `BareAssignment`   | identity, `=`, type identifier, `(`, first string?, `;` |
//! | `File`             | keywords, header entities, assignments, EOF      |

use std::fmt;

use crate::kind::StepKind;
use crate::text::TextSpan;
use crate::token::StepToken;

#[derive(Debug, Clone, PartialEq)]
pub enum StepNode {
    Token(StepToken),
    Composite(Composite),
}

/// Interior node. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    kind: StepKind,
    children: Vec<StepNode>,
}

impl Composite {
    pub fn new(kind: StepKind, children: Vec<StepNode>) -> Self {
        debug_assert!(!children.is_empty(), "{kind} node without children");
        Self { kind, children }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn children(&self) -> &[StepNode] {
        &self.children
    }

    pub fn into_children(self) -> Vec<StepNode> {
        self.children
    }
}

impl From<StepToken> for StepNode {
    fn from(token: StepToken) -> Self {
        StepNode::Token(token)
    }
}

impl From<Composite> for StepNode {
    fn from(composite: Composite) -> Self {
        StepNode::Composite(composite)
    }
}

impl StepNode {
    pub fn composite(kind: StepKind, children: Vec<StepNode>) -> Self {
        StepNode::Composite(Composite::new(kind, children))
    }

    pub fn kind(&self) -> StepKind {
        match self {
            StepNode::Token(token) => token.kind(),
            StepNode::Composite(composite) => composite.kind,
        }
    }

    pub fn span(&self) -> TextSpan {
        match self {
            StepNode::Token(token) => token.span(),
            StepNode::Composite(composite) => match (composite.children.first(), composite.children.last()) {
                (Some(first), Some(last)) => {
                    TextSpan::from_bounds(first.span().start, last.span().end())
                }
                _ => TextSpan::default(),
            },
        }
    }

    pub fn children(&self) -> &[StepNode] {
        match self {
            StepNode::Token(_) => &[],
            StepNode::Composite(composite) => &composite.children,
        }
    }

    pub fn as_token(&self) -> Option<&StepToken> {
        match self {
            StepNode::Token(token) => Some(token),
            StepNode::Composite(_) => None,
        }
    }

    /// Whether this is a token synthesised by the parser.
    pub fn is_missing(&self) -> bool {
        self.as_token().is_some_and(StepToken::is_missing)
    }

    pub fn first_token(&self) -> Option<&StepToken> {
        match self {
            StepNode::Token(token) => Some(token),
            StepNode::Composite(composite) => composite.children.first()?.first_token(),
        }
    }

    pub fn last_token(&self) -> Option<&StepToken> {
        match self {
            StepNode::Token(token) => Some(token),
            StepNode::Composite(composite) => composite.children.last()?.last_token(),
        }
    }

    /// Depth-first iterator over every token below this node.
    pub fn tokens(&self) -> Tokens<'_> {
        Tokens { stack: vec![self] }
    }

    fn child(&self, index: usize) -> Option<&StepNode> {
        self.children().get(index)
    }

    fn child_token(&self, index: usize) -> Option<&StepToken> {
        self.child(index)?.as_token()
    }

    /// Entity label of an assignment.
    pub fn identity(&self) -> Option<u64> {
        match self.kind() {
            StepKind::EntityAssignment | StepKind::BareAssignment => {
                self.child_token(0)?.as_identity()
            }
            StepKind::Identity => self.as_token()?.as_identity(),
            _ => None,
        }
    }

    /// Express type name (`IFCWALL`) of an entity, header entry or assignment.
    pub fn express_type(&self) -> Option<&str> {
        match self.kind() {
            StepKind::Entity | StepKind::BareAssignment => {
                let index = if self.kind() == StepKind::BareAssignment { 2 } else { 0 };
                let token = self.child_token(index)?;
                (token.kind() == StepKind::Identifier && !token.is_missing())
                    .then(|| token.text())
            }
            StepKind::EntityAssignment | StepKind::HeaderEntity => {
                self.entity()?.express_type()
            }
            _ => None,
        }
    }

    /// The entity of a header entry or full assignment.
    pub fn entity(&self) -> Option<&StepNode> {
        let index = match self.kind() {
            StepKind::HeaderEntity => 0,
            StepKind::EntityAssignment => 2,
            _ => return None,
        };
        self.child(index).filter(|node| node.kind() == StepKind::Entity)
    }

    /// Argument list of an entity, header entry or full assignment.
    pub fn arguments(&self) -> Option<SeparatedList<'_>> {
        match self.kind() {
            StepKind::ArgumentList => {
                let children = self.children();
                let inner = match children {
                    [open, inner @ .., close]
                        if open.kind() == StepKind::OpenParen
                            && close.kind() == StepKind::CloseParen =>
                    {
                        inner
                    }
                    [open, inner @ ..] if open.kind() == StepKind::OpenParen => inner,
                    _ => children,
                };
                Some(SeparatedList::new(inner))
            }
            StepKind::Entity => self.child(1)?.arguments(),
            StepKind::EntityAssignment | StepKind::HeaderEntity => self.entity()?.arguments(),
            _ => None,
        }
    }

    /// First argument if it is a string literal (usually the GlobalId).
    pub fn first_string(&self) -> Option<&str> {
        let token = match self.kind() {
            StepKind::BareAssignment => self.child_token(4)?,
            _ => self.arguments()?.get(0)?.as_token()?,
        };
        if token.kind() == StepKind::String {
            token.as_str()
        } else {
            None
        }
    }

    /// Trailing `;` of a header entry or assignment.
    pub fn closing_semicolon(&self) -> Option<&StepToken> {
        match self.kind() {
            StepKind::HeaderEntity | StepKind::EntityAssignment | StepKind::BareAssignment => {
                let token = self.children().last()?.as_token()?;
                (token.kind() == StepKind::Semicolon).then_some(token)
            }
            _ => None,
        }
    }

    /// Header entries of a file.
    pub fn headers(&self) -> impl Iterator<Item = &StepNode> + '_ {
        self.file_children()
            .filter(|node| node.kind() == StepKind::HeaderEntity)
    }

    /// Data section assignments of a file.
    pub fn members(&self) -> impl Iterator<Item = &StepNode> + '_ {
        self.file_children().filter(|node| {
            matches!(
                node.kind(),
                StepKind::EntityAssignment | StepKind::BareAssignment
            )
        })
    }

    fn file_children(&self) -> std::slice::Iter<'_, StepNode> {
        let children: &[StepNode] = if self.kind() == StepKind::File {
            self.children()
        } else {
            &[]
        };
        children.iter()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, lead: &str, indent: &str) -> fmt::Result {
        match self {
            StepNode::Token(token) => writeln!(f, "{lead}{token}"),
            StepNode::Composite(composite) => {
                writeln!(f, "{lead}{} {}", composite.kind, self.span())?;
                let count = composite.children.len();
                for (i, child) in composite.children.iter().enumerate() {
                    let (branch, next) = if i + 1 == count {
                        ("└── ", "    ")
                    } else {
                        ("├── ", "│   ")
                    };
                    child.write_tree(f, &format!("{indent}{branch}"), &format!("{indent}{next}"))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for StepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, "", "")
    }
}

/// Depth-first token iterator, see [`StepNode::tokens`].
pub struct Tokens<'a> {
    stack: Vec<&'a StepNode>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a StepToken;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                StepNode::Token(token) => return Some(token),
                StepNode::Composite(composite) => {
                    self.stack.extend(composite.children.iter().rev());
                }
            }
        }
        None
    }
}

/// Items interleaved with separator tokens, stored once.
#[derive(Debug, Clone, Copy)]
pub struct SeparatedList<'a> {
    nodes: &'a [StepNode],
}

impl<'a> SeparatedList<'a> {
    pub fn new(nodes: &'a [StepNode]) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        (self.nodes.len() + 1) / 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a StepNode> {
        self.nodes.get(index.checked_mul(2)?)
    }

    pub fn separator(&self, index: usize) -> Option<&'a StepToken> {
        self.nodes.get(index.checked_mul(2)? + 1)?.as_token()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a StepNode> + 'a {
        self.nodes.iter().step_by(2)
    }

    pub fn separators(&self) -> impl Iterator<Item = &'a StepNode> + 'a {
        self.nodes.iter().skip(1).step_by(2)
    }

    /// Items and separators in source order.
    pub fn with_separators(&self) -> &'a [StepNode] {
        self.nodes
    }
}

impl<'a> IntoIterator for SeparatedList<'a> {
    type Item = &'a StepNode;
    type IntoIter = std::iter::StepBy<std::slice::Iter<'a, StepNode>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter().step_by(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_entity_assignment;

    #[test]
    fn test_assignment_accessors() {
        let input = "#12=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',#5,(#6,#7));";
        let (node, diagnostics) = parse_entity_assignment(input);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(node.kind(), StepKind::EntityAssignment);
        assert_eq!(node.identity(), Some(12));
        assert_eq!(node.express_type(), Some("IFCWALL"));
        assert_eq!(node.first_string(), Some("2O2Fr$t4X7Zf8NOew3FLOH"));
        assert_eq!(node.closing_semicolon().map(StepToken::text), Some(";"));
        assert_eq!(node.span(), TextSpan::new(0, input.len() as u32));

        let args = node.arguments().unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.get(1).and_then(StepNode::identity), Some(5));
        assert_eq!(args.get(2).unwrap().kind(), StepKind::ArgumentList);
        assert_eq!(args.separators().count(), 2);
        assert_eq!(args.with_separators().len(), 5);
        assert!(args.get(3).is_none());
    }

    #[test]
    fn test_empty_argument_list() {
        let (node, _) = parse_entity_assignment("#1=IFCDUMMY();");
        let args = node.arguments().unwrap();
        assert!(args.is_empty());
        assert_eq!(args.len(), 0);
        assert!(node.first_string().is_none());
    }

    #[test]
    fn test_first_and_last_token() {
        let (node, _) = parse_entity_assignment("#1=A(1);");
        assert_eq!(node.first_token().map(StepToken::text), Some("#1"));
        assert_eq!(node.last_token().map(StepToken::text), Some(";"));
        let texts: Vec<_> = node.tokens().map(StepToken::text).collect();
        assert_eq!(texts, ["#1", "=", "A", "(", "1", ")", ";"]);
    }

    #[test]
    fn test_pretty_print() {
        let (node, _) = parse_entity_assignment("#1=A(2);");
        let printed = node.to_string();
        let expected = "\
EntityAssignment 0..8
├── Identity 0..2 #1
├── Equals 2..3 \"=\"
├── Entity 3..7
│   ├── Identifier 3..4 \"A\"
│   └── ArgumentList 4..7
│       ├── OpenParen 4..5 \"(\"
│       ├── Integer 5..6 2
│       └── CloseParen 6..7 \")\"
└── Semicolon 7..8 \";\"
";
        assert_eq!(printed, expected);
    }
}
