// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Step21 Core Parser
//!
//! Streaming ISO-10303-21 (STEP/IFC) lexer and parser with bounded memory.
//! Multi-gigabyte IFC files are read through a fixed-size window, so memory use
//! does not grow with the input.
//!
//! ## Overview
//!
//! - **Windowed Sources**: [`BufferedSource`] keeps one block of the file resident
//!   and refills it on demand; [`SourceText`] serves in-memory data
//! - **Exact Spans**: every token and node knows its byte range in the file
//! - **Resilient Parsing**: malformed input becomes [`Diagnostic`]s, never a panic
//!   or an error; the parser always reaches the end of input
//! - **Two Fidelities**: [`Fidelity::Full`] builds the whole argument tree,
//!   [`Fidelity::Bare`] keeps identity, type and first string only
//! - **Part21 Strings**: [`codec`] decodes and encodes the `\X2\`, `\S\`, `\PA\`
//!   escape grammar
//! - **Tools**: [`repair`] rewrites a malformed file as a legal one;
//!   [`EntityDecoder`] extracts an entity with its dependency closure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use step21_core::{parse_text, Fidelity};
//!
//! let content = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=IFCWALL('guid',$);ENDSEC;END-ISO-10303-21;";
//! let (file, diagnostics) = parse_text(content, Fidelity::Full);
//! assert!(diagnostics.is_empty());
//!
//! for assignment in file.members() {
//!     println!("#{:?} = {:?}", assignment.identity(), assignment.express_type());
//! }
//! ```
//!
//! ## Event Parsing
//!
//! For large files, hand every entity to a [`StepHandler`] instead of building
//! the tree:
//!
//! ```rust,ignore
//! use std::ops::ControlFlow;
//! use step21_core::{parse_file_with_events, ParseConfig, StepHandler, StepNode};
//!
//! struct Count(usize);
//!
//! impl StepHandler for Count {
//!     fn assignment(&mut self, _: &StepNode) -> ControlFlow<()> {
//!         self.0 += 1;
//!         ControlFlow::Continue(())
//!     }
//! }
//!
//! let mut count = Count(0);
//! let summary = parse_file_with_events("model.ifc", &ParseConfig::from_env(), &mut count)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for spans, kinds and token values

pub mod buffered;
pub mod codec;
pub mod codepage;
pub mod config;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod kind;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod parsing;
pub mod references;
pub mod repair;
pub mod source;
pub mod text;
pub mod token;
pub mod writer;

pub use buffered::{BufferedSource, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use codepage::CodePage;
pub use config::ParseConfig;
pub use decoder::{build_entity_index, DependencyClosure, EntityDecoder, EntityIndex, EntityRecord};
pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticObserver};
pub use error::{DecodeError, Error, Result};
pub use kind::StepKind;
pub use lexer::Lexer;
pub use node::{Composite, SeparatedList, StepNode, Tokens};
pub use parser::{AssignmentMark, Fidelity, ParseSummary, Parser, StepHandler};
pub use parsing::{
    parse_entity_assignment, parse_file, parse_file_with_events, parse_file_with_events_observed,
    parse_source, parse_text, parse_tokens, parse_tokens_from, parse_with_events,
    parse_with_events_observed, read_entity_assignment,
};
pub use references::{collect_references, unique_references, References};
pub use repair::{repair, repair_file, RepairSummary};
pub use source::{SourceText, SourceWindow};
pub use text::{LineIndex, SourceId, TextLocation, TextSpan};
pub use token::{StepToken, TokenValue};
pub use writer::{to_part21_string, write_part21};
