// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use proptest::prelude::*;
use step21_core::codec::{decode, encode};
use step21_core::{parse_entity_assignment, StepKind};

proptest! {
    #[test]
    fn encode_then_decode_is_identity(text in any::<String>()) {
        let encoded = encode(&text);
        prop_assert!(encoded.bytes().all(|b| (32..=126).contains(&b)), "{}", encoded);
        prop_assert_eq!(decode(&encoded), Ok(text));
    }

    #[test]
    fn encoded_strings_lex_as_one_literal(text in "\\PC{0,40}") {
        let source = format!("#1=A('{}');", encode(&text));
        let (node, diagnostics) = parse_entity_assignment(&source);
        prop_assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let argument = node.arguments().unwrap().get(0).unwrap().as_token().unwrap().clone();
        prop_assert_eq!(argument.kind(), StepKind::String);
        prop_assert_eq!(argument.decoded_string(), Ok(Some(text)));
    }
}
