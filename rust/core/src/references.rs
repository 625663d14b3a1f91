// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outgoing entity references

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::kind::StepKind;
use crate::node::StepNode;

/// Reference list; most entities point to a handful of others.
pub type References = SmallVec<[u64; 8]>;

/// Every `#id` below `node` in document order, at any nesting depth.
///
/// The label of an assignment is not a reference and is skipped.
pub fn collect_references(node: &StepNode) -> References {
    let mut references = References::new();
    let skip = usize::from(matches!(
        node.kind(),
        StepKind::EntityAssignment | StepKind::BareAssignment
    ));
    for child in node.children().iter().skip(skip) {
        collect_into(child, &mut references);
    }
    if let Some(id) = node.as_token().and_then(|token| token.as_identity()) {
        references.push(id);
    }
    references
}

fn collect_into(node: &StepNode, references: &mut References) {
    match node {
        StepNode::Token(token) => references.extend(token.as_identity()),
        StepNode::Composite(composite) => {
            for child in composite.children() {
                collect_into(child, references);
            }
        }
    }
}

/// [`collect_references`] without duplicates, first occurrence kept.
pub fn unique_references(node: &StepNode) -> References {
    let mut seen = FxHashSet::default();
    collect_references(node)
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_entity_assignment;

    #[test]
    fn test_nested_references() {
        let (node, _) =
            parse_entity_assignment("#10=IFCX(#1,((#2,IFCY((#3))),$),'#4',IFCZ(#2));");
        assert_eq!(collect_references(&node).as_slice(), [1, 2, 3, 2]);
        assert_eq!(unique_references(&node).as_slice(), [1, 2, 3]);
    }

    #[test]
    fn test_entity_and_argument_nodes() {
        let (node, _) = parse_entity_assignment("#10=IFCX((#7));");
        let entity = node.entity().unwrap();
        assert_eq!(collect_references(entity).as_slice(), [7]);
        let args = node.arguments().unwrap();
        assert_eq!(collect_references(args.get(0).unwrap()).as_slice(), [7]);
    }
}
