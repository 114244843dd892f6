//! Reference in-memory index.
//!
//! Holds a handful of immutable segments with fully decoded positional
//! postings behind the reader traits. This is the posting source the test
//! suites run against and the smallest useful implementation of the
//! contracts in [`crate::reader`]; durable formats live elsewhere.

mod postings;

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::Arc,
};

pub use self::postings::{
    MemoryPostings,
    PostingEntry,
    PostingList,
};
use crate::{
    doc::{
        doc_ids,
        positions,
        DocId,
        Pos,
    },
    features::IndexFeatures,
    iterator::DocIterator,
    reader::{
        FieldMeta,
        IndexReader,
        SeekCookie,
        SeekResult,
        SeekTermIterator,
        SegmentId,
        SegmentReader,
        TermReader,
    },
};

/// Builder for a [`MemoryIndex`]. Documents are added segment by segment;
/// ids restart at `doc_ids::MIN` in every segment.
#[derive(Default)]
pub struct MemoryIndexBuilder {
    segments: Vec<SegmentBuilder>,
}

impl MemoryIndexBuilder {
    pub fn new() -> Self {
        MemoryIndexBuilder::default()
    }

    /// Starts a new segment and returns its builder.
    pub fn segment(&mut self) -> &mut SegmentBuilder {
        self.segments.push(SegmentBuilder::default());
        self.segments.last_mut().expect("just pushed")
    }

    pub fn build(self) -> MemoryIndex {
        let segments: Vec<MemorySegment> = self
            .segments
            .into_iter()
            .enumerate()
            .map(|(ordinal, builder)| builder.build(SegmentId(ordinal as u64)))
            .collect();
        let docs_count = segments.iter().map(|segment| segment.docs_count).sum();
        MemoryIndex {
            segments,
            docs_count,
        }
    }
}

#[derive(Default)]
pub struct SegmentBuilder {
    docs_count: u64,
    fields: BTreeMap<String, FieldBuilder>,
}

#[derive(Default)]
struct FieldBuilder {
    postings: BTreeMap<Vec<u8>, Vec<(DocId, Vec<Pos>)>>,
    norms: BTreeMap<DocId, u32>,
    total_tokens: u64,
}

impl SegmentBuilder {
    /// Indexes one document; field values are split on whitespace, one
    /// token per position starting at `positions::MIN`. Tokenization beyond
    /// that is the caller's business.
    pub fn add_document<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> DocId {
        let tokenized: Vec<(&str, Vec<&str>)> = fields
            .into_iter()
            .map(|(name, text)| (name, text.split_whitespace().collect()))
            .collect();
        self.add_document_tokens(
            tokenized
                .iter()
                .map(|(name, tokens)| (*name, tokens.as_slice())),
        )
    }

    /// Indexes one pre-tokenized document.
    pub fn add_document_tokens<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
    ) -> DocId {
        let doc = doc_ids::MIN + self.docs_count as DocId;
        self.docs_count += 1;

        for (name, tokens) in fields {
            if tokens.is_empty() {
                continue;
            }
            let field = self.fields.entry(name.to_string()).or_default();
            field.norms.insert(doc, tokens.len() as u32);
            field.total_tokens += tokens.len() as u64;
            for (offset, token) in tokens.iter().enumerate() {
                let entries = field.postings.entry(token.as_bytes().to_vec()).or_default();
                let pos = positions::MIN + offset as Pos;
                match entries.last_mut() {
                    Some((last_doc, doc_positions)) if *last_doc == doc => {
                        doc_positions.push(pos);
                    },
                    _ => entries.push((doc, vec![pos])),
                }
            }
        }
        doc
    }

    fn build(self, id: SegmentId) -> MemorySegment {
        let docs_count = self.docs_count;
        let fields = self
            .fields
            .into_iter()
            .map(|(name, field)| {
                let built = field.build(name.clone(), docs_count);
                (name, built)
            })
            .collect();
        MemorySegment {
            id,
            docs_count,
            fields,
        }
    }
}

impl FieldBuilder {
    fn build(self, name: String, segment_docs: u64) -> MemoryField {
        let mut norms = vec![0u32; segment_docs as usize];
        for (doc, len) in &self.norms {
            norms[(doc - doc_ids::MIN) as usize] = *len;
        }

        let terms = self
            .postings
            .into_iter()
            .map(|(term, docs)| {
                let mut list = PostingList::default();
                for (doc, doc_positions) in docs {
                    let pos_start = list.positions.len() as u32;
                    list.positions.extend_from_slice(&doc_positions);
                    list.total_term_freq += doc_positions.len() as u64;
                    list.docs.push(PostingEntry {
                        doc,
                        freq: doc_positions.len() as u32,
                        pos_start,
                        pos_end: list.positions.len() as u32,
                    });
                }
                (term, Arc::new(list))
            })
            .collect();

        MemoryField {
            meta: FieldMeta {
                name,
                index_features: IndexFeatures::FREQ | IndexFeatures::POS,
            },
            terms,
            norms: Arc::new(norms),
            docs_with_field: self.norms.len() as u64,
            total_tokens: self.total_tokens,
        }
    }
}

/// Immutable multi-segment in-memory index.
pub struct MemoryIndex {
    segments: Vec<MemorySegment>,
    docs_count: u64,
}

impl IndexReader for MemoryIndex {
    fn size(&self) -> usize {
        self.segments.len()
    }

    fn segment(&self, index: usize) -> &dyn SegmentReader {
        &self.segments[index]
    }

    fn docs_count(&self) -> u64 {
        self.docs_count
    }
}

pub struct MemorySegment {
    id: SegmentId,
    docs_count: u64,
    fields: BTreeMap<String, MemoryField>,
}

impl SegmentReader for MemorySegment {
    fn id(&self) -> SegmentId {
        self.id
    }

    fn docs_count(&self) -> u64 {
        self.docs_count
    }

    fn field(&self, name: &str) -> Option<&dyn TermReader> {
        self.fields.get(name).map(|field| field as &dyn TermReader)
    }
}

pub struct MemoryField {
    meta: FieldMeta,
    terms: BTreeMap<Vec<u8>, Arc<PostingList>>,
    norms: Arc<Vec<u32>>,
    docs_with_field: u64,
    total_tokens: u64,
}

impl TermReader for MemoryField {
    fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    fn iterator(&self) -> Box<dyn SeekTermIterator + '_> {
        Box::new(MemoryTermIterator {
            terms: &self.terms,
            state: TermCursor::Start,
        })
    }

    fn postings(
        &self,
        cookie: &SeekCookie,
        features: IndexFeatures,
    ) -> anyhow::Result<Box<dyn DocIterator + '_>> {
        let list = cookie
            .downcast_arc::<PostingList>()
            .ok_or_else(|| anyhow::anyhow!("foreign seek cookie passed to memory index"))?;
        let effective = features.intersection(self.meta.index_features);
        let norms = features
            .contains(IndexFeatures::FREQ)
            .then(|| Arc::clone(&self.norms));
        Ok(Box::new(MemoryPostings::new(list, norms, effective)))
    }

    fn docs_count(&self) -> u64 {
        self.docs_with_field
    }

    fn total_tokens(&self) -> u64 {
        self.total_tokens
    }
}

enum TermCursor {
    Start,
    At(Vec<u8>),
    Done,
}

struct MemoryTermIterator<'a> {
    terms: &'a BTreeMap<Vec<u8>, Arc<PostingList>>,
    state: TermCursor,
}

impl MemoryTermIterator<'_> {
    fn current(&self) -> Option<(&Vec<u8>, &Arc<PostingList>)> {
        match &self.state {
            TermCursor::At(term) => self.terms.get_key_value(term),
            _ => None,
        }
    }
}

impl SeekTermIterator for MemoryTermIterator<'_> {
    fn seek(&mut self, term: &[u8]) -> bool {
        if self.terms.contains_key(term) {
            self.state = TermCursor::At(term.to_vec());
            true
        } else {
            self.state = TermCursor::Done;
            false
        }
    }

    fn seek_ceil(&mut self, term: &[u8]) -> SeekResult {
        match self
            .terms
            .range::<[u8], _>((Bound::Included(term), Bound::Unbounded))
            .next()
        {
            Some((found, _)) => {
                let exact = found.as_slice() == term;
                self.state = TermCursor::At(found.clone());
                if exact {
                    SeekResult::Found
                } else {
                    SeekResult::After
                }
            },
            None => {
                self.state = TermCursor::Done;
                SeekResult::End
            },
        }
    }

    fn next(&mut self) -> bool {
        let next = match &self.state {
            TermCursor::Start => self.terms.iter().next(),
            TermCursor::At(term) => self
                .terms
                .range::<[u8], _>((Bound::Excluded(term.as_slice()), Bound::Unbounded))
                .next(),
            TermCursor::Done => None,
        };
        match next {
            Some((term, _)) => {
                self.state = TermCursor::At(term.clone());
                true
            },
            None => {
                self.state = TermCursor::Done;
                false
            },
        }
    }

    fn term(&self) -> &[u8] {
        match &self.state {
            TermCursor::At(term) => term,
            _ => &[],
        }
    }

    fn doc_freq(&self) -> u64 {
        self.current()
            .map(|(_, list)| list.docs.len() as u64)
            .unwrap_or(0)
    }

    fn total_term_freq(&self) -> u64 {
        self.current()
            .map(|(_, list)| list.total_term_freq)
            .unwrap_or(0)
    }

    fn cookie(&self) -> SeekCookie {
        match self.current() {
            Some((_, list)) => SeekCookie::from_arc(Arc::clone(list)),
            None => SeekCookie::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::DocIteratorExt;

    fn corpus() -> MemoryIndex {
        let mut builder = MemoryIndexBuilder::new();
        let segment = builder.segment();
        segment.add_document([("phrase", "quick brown fox")]);
        segment.add_document([("phrase", "the quick fox")]);
        segment.add_document([("phrase", "brown quick fox")]);
        builder.build()
    }

    #[test]
    fn builder_assigns_segment_local_ids() {
        let mut builder = MemoryIndexBuilder::new();
        let first = builder.segment();
        assert_eq!(first.add_document([("f", "a")]), doc_ids::MIN);
        assert_eq!(first.add_document([("f", "b")]), doc_ids::MIN + 1);
        let second = builder.segment();
        assert_eq!(second.add_document([("f", "c")]), doc_ids::MIN);

        let index = builder.build();
        assert_eq!(index.size(), 2);
        assert_eq!(index.docs_count(), 3);
        assert_ne!(index.segment(0).id(), index.segment(1).id());
    }

    #[test]
    fn term_dictionary_is_ordered() {
        let index = corpus();
        let field = index.segment(0).field("phrase").unwrap();
        let mut terms = Vec::new();
        let mut it = field.iterator();
        while it.next() {
            terms.push(it.term().to_vec());
        }
        assert_eq!(
            terms,
            vec![
                b"brown".to_vec(),
                b"fox".to_vec(),
                b"quick".to_vec(),
                b"the".to_vec()
            ]
        );
    }

    #[test]
    fn seek_ceil_classifies() {
        let index = corpus();
        let field = index.segment(0).field("phrase").unwrap();
        let mut it = field.iterator();
        assert_eq!(it.seek_ceil(b"fox"), SeekResult::Found);
        assert_eq!(it.seek_ceil(b"fo"), SeekResult::After);
        assert_eq!(it.term(), b"fox");
        assert_eq!(it.seek_ceil(b"zebra"), SeekResult::End);
    }

    #[test]
    fn cookie_reopens_postings() {
        let index = corpus();
        let field = index.segment(0).field("phrase").unwrap();
        let mut it = field.iterator();
        assert!(it.seek(b"quick"));
        assert_eq!(it.doc_freq(), 3);
        let cookie = it.cookie();
        drop(it);

        let features = IndexFeatures::FREQ | IndexFeatures::POS;
        let mut first = field.postings(&cookie, features).unwrap();
        assert_eq!(first.collect_docs(), vec![1, 2, 3]);
        // The cookie stays valid for further opens.
        let mut second = field.postings(&cookie, features).unwrap();
        assert_eq!(second.seek(2), 2);
    }

    #[test]
    fn norms_report_field_length() {
        use crate::iterator::Norm;

        let index = corpus();
        let field = index.segment(0).field("phrase").unwrap();
        let mut it = field.iterator();
        assert!(it.seek(b"the"));
        let cookie = it.cookie();
        let mut docs = field.postings(&cookie, IndexFeatures::FREQ).unwrap();
        assert!(docs.next());
        assert_eq!(docs.value(), 2);
        assert_eq!(docs.attr_mut::<Norm>().unwrap().0, 3);
    }

    #[test]
    fn field_level_statistics() {
        let index = corpus();
        let field = index.segment(0).field("phrase").unwrap();
        assert_eq!(field.docs_count(), 3);
        assert_eq!(field.total_tokens(), 9);
        assert_eq!(
            field.meta().index_features,
            IndexFeatures::FREQ | IndexFeatures::POS
        );
    }
}
