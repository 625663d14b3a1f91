// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity Decoder - On-demand entity parsing
//!
//! A bare pass records where every entity lives. Entities are then re-read from
//! their recorded span and parsed one at a time, so only the entities actually
//! requested are ever held in memory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::buffered::{BufferedSource, DEFAULT_BUFFER_SIZE};
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::node::StepNode;
use crate::parser::{Fidelity, Parser, StepHandler};
use crate::parsing::read_entity_assignment;
use crate::references::{unique_references, References};
use crate::source::SourceWindow;
use crate::text::{SourceId, TextSpan};
use crate::writer::write_part21;

/// Where an entity lives in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRecord {
    pub express_type: String,
    /// From the identity to the closing `;` inclusive
    pub span: TextSpan,
}

/// Identity → location map of a file, plus its header entries.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: FxHashMap<u64, EntityRecord>,
    /// Identities in document order
    order: Vec<u64>,
    headers: Vec<TextSpan>,
    diagnostics: Vec<Diagnostic>,
}

impl EntityIndex {
    pub fn get(&self, id: u64) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identities in the order they appear in the file.
    pub fn ids(&self) -> &[u64] {
        &self.order
    }

    /// Spans of the header entries, each including its `;`.
    pub fn headers(&self) -> &[TextSpan] {
        &self.headers
    }

    /// Diagnostics raised while indexing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

struct IndexBuilder {
    index: EntityIndex,
}

impl StepHandler for IndexBuilder {
    fn header_entity(&mut self, entity: &StepNode) -> ControlFlow<()> {
        self.index.headers.push(entity.span());
        ControlFlow::Continue(())
    }

    fn assignment(&mut self, assignment: &StepNode) -> ControlFlow<()> {
        let terminated = assignment
            .closing_semicolon()
            .is_some_and(|semicolon| !semicolon.is_missing());
        let (Some(id), Some(express_type)) = (assignment.identity(), assignment.express_type())
        else {
            return ControlFlow::Continue(());
        };
        if !terminated {
            tracing::debug!(id, "Skipping unterminated entity");
            return ControlFlow::Continue(());
        }
        if self.index.entities.contains_key(&id) {
            tracing::warn!(id, "Duplicate entity identity, keeping the first");
            return ControlFlow::Continue(());
        }
        self.index.entities.insert(
            id,
            EntityRecord {
                express_type: express_type.to_string(),
                span: assignment.span(),
            },
        );
        self.index.order.push(id);
        ControlFlow::Continue(())
    }
}

/// Build the entity index with a single bare pass over `window`.
pub fn build_entity_index<S: SourceWindow>(window: S) -> Result<EntityIndex> {
    let mut builder = IndexBuilder {
        index: EntityIndex::default(),
    };
    let mut parser = Parser::new(window);
    let summary = parser.parse_events(Fidelity::Bare, &mut builder);
    if let Some(err) = parser.take_error() {
        return Err(err.into());
    }
    builder.index.diagnostics = summary.diagnostics;
    tracing::debug!(
        entities = builder.index.len(),
        headers = builder.index.headers.len(),
        diagnostics = builder.index.diagnostics.len(),
        "Built entity index"
    );
    Ok(builder.index)
}

/// Result of [`EntityDecoder::dependency_closure`].
#[derive(Debug, Clone, Default)]
pub struct DependencyClosure {
    /// Every entity reachable from the roots, roots included
    pub entities: FxHashSet<u64>,
    /// Referenced identities that are not in the file, in discovery order
    pub missing: Vec<u64>,
}

/// Entity decoder for lazy parsing - uses Arc for efficient cache sharing
pub struct EntityDecoder<R: Read + Seek> {
    reader: R,
    source: SourceId,
    index: Arc<EntityIndex>,
    /// Cache of decoded entities (entity_id -> `Arc<StepNode>`)
    cache: FxHashMap<u64, Arc<StepNode>>,
}

impl EntityDecoder<File> {
    /// Index a file with a windowed pass, then reopen it for random access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let index = build_entity_index(BufferedSource::open_with_capacity(
            path,
            DEFAULT_BUFFER_SIZE,
        )?)?;
        let file = File::open(path)?;
        Ok(Self::new(file, Arc::from(path.display().to_string()), index))
    }
}

impl<R: Read + Seek> EntityDecoder<R> {
    pub fn new(reader: R, source: SourceId, index: EntityIndex) -> Self {
        Self::with_arc_index(reader, source, Arc::new(index))
    }

    /// Create decoder with shared Arc index
    pub fn with_arc_index(reader: R, source: SourceId, index: Arc<EntityIndex>) -> Self {
        Self {
            reader,
            source,
            index,
            cache: FxHashMap::default(),
        }
    }

    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    /// Parse entity `id` from its recorded span. Results are cached.
    pub fn decode_by_id(&mut self, id: u64) -> Result<Arc<StepNode>> {
        if let Some(node) = self.cache.get(&id) {
            return Ok(Arc::clone(node));
        }
        let record = self.index.get(id).ok_or(Error::EntityNotFound(id))?;
        let (node, diagnostics) =
            read_entity_assignment(&mut self.reader, record.span, self.source.clone())?;
        if !diagnostics.is_empty() {
            tracing::warn!(id, diagnostics = diagnostics.len(), "Entity re-parsed with diagnostics");
        }
        let node = Arc::new(node);
        self.cache.insert(id, Arc::clone(&node));
        Ok(node)
    }

    /// Distinct identities referenced by entity `id`.
    pub fn references_of(&mut self, id: u64) -> Result<References> {
        let node = self.decode_by_id(id)?;
        Ok(unique_references(&node))
    }

    /// Every entity transitively referenced from `roots`.
    pub fn dependency_closure(
        &mut self,
        roots: impl IntoIterator<Item = u64>,
    ) -> Result<DependencyClosure> {
        let mut closure = DependencyClosure::default();
        let mut missing_seen = FxHashSet::default();
        let mut pending: Vec<u64> = roots.into_iter().collect();
        pending.reverse();

        while let Some(id) = pending.pop() {
            if closure.entities.contains(&id) {
                continue;
            }
            if !self.index.contains(id) {
                if missing_seen.insert(id) {
                    closure.missing.push(id);
                }
                continue;
            }
            closure.entities.insert(id);
            let references = self.references_of(id)?;
            pending.extend(references.into_iter().rev());
        }

        tracing::debug!(
            entities = closure.entities.len(),
            missing = closure.missing.len(),
            "Resolved dependency closure"
        );
        Ok(closure)
    }

    /// Write a Part21 file holding the original header and the selected
    /// entities in document order.
    pub fn write_subset<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        ids: &FxHashSet<u64>,
    ) -> Result<()> {
        writer.write_all(b"ISO-10303-21;\nHEADER;\n")?;
        let index = Arc::clone(&self.index);
        for span in index.headers() {
            self.reader.seek(SeekFrom::Start(span.start))?;
            let mut bytes = vec![0u8; span.length as usize];
            self.reader.read_exact(&mut bytes)?;
            writer.write_all(&bytes)?;
            writer.write_all(b"\n")?;
        }
        writer.write_all(b"ENDSEC;\nDATA;\n")?;
        for &id in index.ids().iter().filter(|id| ids.contains(*id)) {
            let node = self.decode_by_id(id)?;
            write_part21(&node, writer)?;
        }
        writer.write_all(b"ENDSEC;\nEND-ISO-10303-21;\n")?;
        Ok(())
    }

    /// Get number of cached entities
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceText;
    use std::io::Cursor;

    const CONTENT: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('guid',$,$,$,$,$,$,(#20),#30);
#2=IFCWALL('guid2',$,$,$,'Wall-001',#3,$,$);
#3=IFCLOCALPLACEMENT($,#4);
#4=IFCAXIS2PLACEMENT3D(#5,$,$);
#5=IFCCARTESIANPOINT((0.,0.,0.));
#20=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#4,$);
ENDSEC;
END-ISO-10303-21;
";

    fn decoder() -> EntityDecoder<Cursor<&'static [u8]>> {
        let index = build_entity_index(SourceText::from_text(CONTENT)).unwrap();
        EntityDecoder::new(Cursor::new(CONTENT.as_bytes()), Arc::from("mem"), index)
    }

    #[test]
    fn test_build_entity_index() {
        let index = build_entity_index(SourceText::from_text(CONTENT)).unwrap();
        assert!(index.diagnostics().is_empty());
        assert_eq!(index.len(), 6);
        assert_eq!(index.ids(), [1, 2, 3, 4, 5, 20]);
        assert_eq!(index.headers().len(), 2);

        let record = index.get(3).unwrap();
        assert_eq!(record.express_type, "IFCLOCALPLACEMENT");
        let span = record.span;
        assert_eq!(
            &CONTENT[span.start as usize..span.end() as usize],
            "#3=IFCLOCALPLACEMENT($,#4);"
        );
    }

    #[test]
    fn test_decode_by_id() {
        let mut decoder = decoder();
        let entity = decoder.decode_by_id(2).unwrap();
        assert_eq!(entity.identity(), Some(2));
        assert_eq!(entity.express_type(), Some("IFCWALL"));
        assert_eq!(entity.arguments().unwrap().len(), 8);
        assert_eq!(decoder.cache_size(), 1);

        let again = decoder.decode_by_id(2).unwrap();
        assert!(Arc::ptr_eq(&entity, &again));

        assert!(matches!(decoder.decode_by_id(99), Err(Error::EntityNotFound(99))));
        decoder.clear_cache();
        assert_eq!(decoder.cache_size(), 0);
    }

    #[test]
    fn test_dependency_closure() {
        let mut decoder = decoder();
        assert_eq!(decoder.references_of(1).unwrap().as_slice(), [20, 30]);

        let closure = decoder.dependency_closure([2]).unwrap();
        let mut ids: Vec<_> = closure.entities.iter().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, [2, 3, 4, 5]);
        assert!(closure.missing.is_empty());

        let closure = decoder.dependency_closure([1]).unwrap();
        let mut ids: Vec<_> = closure.entities.iter().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, [1, 4, 5, 20]);
        assert_eq!(closure.missing, [30]);
    }

    #[test]
    fn test_write_subset() {
        let mut decoder = decoder();
        let closure = decoder.dependency_closure([3]).unwrap();
        let mut out = Vec::new();
        decoder.write_subset(&mut out, &closure.entities).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ISO-10303-21;\nHEADER;\n\
             FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n\
             FILE_SCHEMA(('IFC4'));\n\
             ENDSEC;\nDATA;\n\
             #3=IFCLOCALPLACEMENT($,#4);\n\
             #4=IFCAXIS2PLACEMENT3D(#5,$,$);\n\
             #5=IFCCARTESIANPOINT((0.,0.,0.));\n\
             ENDSEC;\nEND-ISO-10303-21;\n"
        );
    }
}
