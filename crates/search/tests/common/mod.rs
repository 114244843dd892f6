//! Shared corpora and execution helpers for the filter test suites.

#![allow(dead_code)]

use index::{
    memory::{
        MemoryIndex,
        MemoryIndexBuilder,
    },
    DocId,
    DocIterator,
    FieldMeta,
    IndexFeatures,
    IndexReader,
    SeekCookie,
    SeekTermIterator,
    SegmentId,
    SegmentReader,
    TermReader,
};
use search::{
    Filter,
    Order,
    ScorerSpec,
    NO_BOOST,
};

/// The quick/brown/fox corpus: one segment, field `phrase`, positional.
///
/// d1: "quick brown fox", d2: "the quick fox", d3: "brown quick fox"
pub fn phrase_corpus() -> MemoryIndex {
    let mut builder = MemoryIndexBuilder::new();
    let segment = builder.segment();
    segment.add_document([("phrase", "quick brown fox")]);
    segment.add_document([("phrase", "the quick fox")]);
    segment.add_document([("phrase", "brown quick fox")]);
    builder.build()
}

/// The same corpus split over two segments (documents renumber per
/// segment).
pub fn phrase_corpus_two_segments() -> MemoryIndex {
    let mut builder = MemoryIndexBuilder::new();
    let first = builder.segment();
    first.add_document([("phrase", "quick brown fox")]);
    first.add_document([("phrase", "the quick fox")]);
    let second = builder.segment();
    second.add_document([("phrase", "brown quick fox")]);
    builder.build()
}

/// Parallel-field corpus for same-position tests: fields `a`, `b`, `c`
/// hold aligned token streams.
///
/// d1 is the only document where (a:300, b:90, c:9) share a position;
/// (a:700, c:7) share a position in d2 and d3 but not d4.
pub fn same_position_corpus() -> MemoryIndex {
    let mut builder = MemoryIndexBuilder::new();
    let segment = builder.segment();
    segment.add_document([("a", "100 200 300"), ("b", "10 90 90"), ("c", "1 9 9")]);
    segment.add_document([("a", "700 400"), ("b", "40 70"), ("c", "7 4")]);
    segment.add_document([("a", "500 700"), ("b", "99 11"), ("c", "5 7")]);
    segment.add_document([("a", "700"), ("b", "1"), ("c", "9")]);
    builder.build()
}

/// Executes `filter` unscored over every segment; returns
/// `(segment_ordinal, doc)` pairs in reader order.
pub fn execute_all(index: &dyn IndexReader, filter: &Filter) -> Vec<(usize, DocId)> {
    let order = Order::empty();
    let prepared = filter
        .prepare(index, &order, NO_BOOST)
        .expect("prepare failed");
    let mut results = Vec::new();
    for ordinal in 0..index.size() {
        let segment = index.segment(ordinal);
        let mut it = prepared.execute(segment, &order).expect("execute failed");
        while it.next() {
            results.push((ordinal, it.value()));
        }
    }
    results
}

/// Single-segment convenience over [`execute_all`].
pub fn docs(index: &dyn IndexReader, filter: &Filter) -> Vec<DocId> {
    assert_eq!(index.size(), 1, "corpus expected to have one segment");
    execute_all(index, filter)
        .into_iter()
        .map(|(_, doc)| doc)
        .collect()
}

/// Executes `filter` under the given scorers over a single-segment index;
/// returns each matching doc with its score components.
pub fn scored_docs(
    index: &dyn IndexReader,
    filter: &Filter,
    specs: &[ScorerSpec],
) -> Vec<(DocId, Vec<f32>)> {
    scored_docs_boosted(index, filter, specs, NO_BOOST)
}

pub fn scored_docs_boosted(
    index: &dyn IndexReader,
    filter: &Filter,
    specs: &[ScorerSpec],
    boost: f32,
) -> Vec<(DocId, Vec<f32>)> {
    assert_eq!(index.size(), 1, "corpus expected to have one segment");
    let order = Order::prepare(specs).expect("scorer prepare failed");
    let prepared = filter.prepare(index, &order, boost).expect("prepare failed");
    let segment = index.segment(0);
    let mut it = prepared.execute(segment, &order).expect("execute failed");
    let mut results = Vec::new();
    while it.next() {
        let mut scores = vec![0.0; order.len()];
        it.score(&mut scores);
        results.push((it.value(), scores));
    }
    results
}

/// Index view masking the named fields down to a reduced feature set, for
/// exercising the "segment lacks required features" skip path.
pub struct FeatureMaskedIndex<'a> {
    inner: &'a MemoryIndex,
    segments: Vec<FeatureMaskedSegment<'a>>,
}

impl<'a> FeatureMaskedIndex<'a> {
    pub fn new(inner: &'a MemoryIndex, fields: &[&str], features: IndexFeatures) -> Self {
        let segments = (0..inner.size())
            .map(|ordinal| {
                let segment = inner.segment(ordinal);
                let fields = fields
                    .iter()
                    .filter_map(|name| {
                        let field = segment.field(name)?;
                        Some((name.to_string(), MaskedField {
                            inner: field,
                            meta: FieldMeta {
                                name: name.to_string(),
                                index_features: features,
                            },
                        }))
                    })
                    .collect();
                FeatureMaskedSegment {
                    id: segment.id(),
                    docs_count: segment.docs_count(),
                    fields,
                }
            })
            .collect();
        FeatureMaskedIndex { inner, segments }
    }
}

impl IndexReader for FeatureMaskedIndex<'_> {
    fn size(&self) -> usize {
        self.segments.len()
    }

    fn segment(&self, ordinal: usize) -> &dyn SegmentReader {
        &self.segments[ordinal]
    }

    fn docs_count(&self) -> u64 {
        self.inner.docs_count()
    }
}

pub struct FeatureMaskedSegment<'a> {
    id: SegmentId,
    docs_count: u64,
    fields: Vec<(String, MaskedField<'a>)>,
}

impl SegmentReader for FeatureMaskedSegment<'_> {
    fn id(&self) -> SegmentId {
        self.id
    }

    fn docs_count(&self) -> u64 {
        self.docs_count
    }

    fn field(&self, name: &str) -> Option<&dyn TermReader> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field as &dyn TermReader)
    }
}

/// Term reader wrapper advertising a reduced feature set.
pub struct MaskedField<'a> {
    pub inner: &'a dyn TermReader,
    pub meta: FieldMeta,
}

impl TermReader for MaskedField<'_> {
    fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    fn iterator(&self) -> Box<dyn SeekTermIterator + '_> {
        self.inner.iterator()
    }

    fn postings(
        &self,
        cookie: &SeekCookie,
        features: IndexFeatures,
    ) -> anyhow::Result<Box<dyn DocIterator + '_>> {
        self.inner
            .postings(cookie, features.intersection(self.meta.index_features))
    }

    fn docs_count(&self) -> u64 {
        self.inner.docs_count()
    }

    fn total_tokens(&self) -> u64 {
        self.inner.total_tokens()
    }
}
