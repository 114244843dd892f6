//! Shared machinery for filters matching a set of terms: prefix, wildcard,
//! edit distance, range, and enumerated term sets. Prepare walks each
//! segment's dictionary with a per-variant visitor collecting `(cookie,
//! boost)` legs and statistics; execute unions the legs' postings.

use std::{
    any::{
        Any,
        TypeId,
    },
    collections::BTreeMap,
    ops::Bound,
};

use itertools::Itertools;

use index::{
    empty_iterator,
    DocId,
    DocIterator,
    FilterBoost,
    IndexFeatures,
    IndexReader,
    PositionIterator,
    SeekCookie,
    SeekResult,
    SeekTermIterator,
    SegmentReader,
    TermReader,
};
use levenshtein_automata::DFA;

use crate::{
    collectors::{
        FieldCollectors,
        TermCollectors,
    },
    disjunction::Disjunction,
    filter::{
        ExecutionContext,
        PreparedQuery,
    },
    levenshtein_dfa,
    score::{
        MaxMerger,
        MergeType,
        MinMerger,
        NoopMerger,
        Order,
        ScoredIterator,
        SumMerger,
        NO_BOOST,
    },
    states_cache::StatesCache,
    wildcard,
};

/// Byte range over a term dictionary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BytesRange {
    pub min: Bound<Vec<u8>>,
    pub max: Bound<Vec<u8>>,
}

/// Sink for terms matched while walking one segment's dictionary.
/// `prepare` fires once before the first match of the segment; `visit`
/// fires per matched term with the dictionary iterator positioned on it.
pub(crate) trait FilterVisitor {
    fn prepare(&mut self);

    fn visit(&mut self, terms: &dyn SeekTermIterator, boost: f32);
}

pub(crate) fn visit_term(reader: &dyn TermReader, term: &[u8], visitor: &mut dyn FilterVisitor) {
    let mut it = reader.iterator();
    if it.seek(term) {
        visitor.prepare();
        visitor.visit(&*it, NO_BOOST);
    }
}

pub(crate) fn visit_prefix(
    reader: &dyn TermReader,
    prefix: &[u8],
    visitor: &mut dyn FilterVisitor,
) {
    let mut it = reader.iterator();
    if it.seek_ceil(prefix) == SeekResult::End {
        return;
    }
    let mut first = true;
    while it.term().starts_with(prefix) {
        if first {
            visitor.prepare();
            first = false;
        }
        visitor.visit(&*it, NO_BOOST);
        if !it.next() {
            break;
        }
    }
}

pub(crate) fn visit_range(
    reader: &dyn TermReader,
    range: &BytesRange,
    visitor: &mut dyn FilterVisitor,
) {
    let mut it = reader.iterator();
    let positioned = match &range.min {
        Bound::Unbounded => it.next(),
        Bound::Included(min) => it.seek_ceil(min) != SeekResult::End,
        Bound::Excluded(min) => match it.seek_ceil(min) {
            SeekResult::End => false,
            SeekResult::Found => it.next(),
            SeekResult::After => true,
        },
    };
    if !positioned {
        return;
    }
    let mut first = true;
    loop {
        let in_range = match &range.max {
            Bound::Unbounded => true,
            Bound::Included(max) => it.term() <= max.as_slice(),
            Bound::Excluded(max) => it.term() < max.as_slice(),
        };
        if !in_range {
            break;
        }
        if first {
            visitor.prepare();
            first = false;
        }
        visitor.visit(&*it, NO_BOOST);
        if !it.next() {
            break;
        }
    }
}

/// General wildcard scan: bounded below by the pattern's literal prefix,
/// each candidate matched against the compiled pattern.
pub(crate) fn visit_wildcard(
    reader: &dyn TermReader,
    prefix: &[u8],
    tokens: &[wildcard::Token],
    visitor: &mut dyn FilterVisitor,
) {
    let mut it = reader.iterator();
    if it.seek_ceil(prefix) == SeekResult::End {
        return;
    }
    let mut first = true;
    while it.term().starts_with(prefix) {
        if wildcard::matches(tokens, it.term()) {
            if first {
                visitor.prepare();
                first = false;
            }
            visitor.visit(&*it, NO_BOOST);
        }
        if !it.next() {
            break;
        }
    }
}

/// Every term of the field (bare `%` wildcard).
pub(crate) fn visit_all_terms(reader: &dyn TermReader, visitor: &mut dyn FilterVisitor) {
    let mut it = reader.iterator();
    let mut first = true;
    while it.next() {
        if first {
            visitor.prepare();
            first = false;
        }
        visitor.visit(&*it, NO_BOOST);
    }
}

/// DFA-accepted terms, boosted by `1 / (1 + distance)` so closer matches
/// outrank distant ones.
pub(crate) fn visit_edit_distance(
    reader: &dyn TermReader,
    dfa: &DFA,
    visitor: &mut dyn FilterVisitor,
) {
    let mut it = reader.iterator();
    let mut first = true;
    while it.next() {
        let Some(distance) = levenshtein_dfa::matched_distance(dfa, it.term()) else {
            continue;
        };
        if first {
            visitor.prepare();
            first = false;
        }
        let boost = if distance == 0 {
            NO_BOOST
        } else {
            1.0 / (1.0 + distance as f32)
        };
        visitor.visit(&*it, boost);
    }
}

pub(crate) struct MultiTermLeg {
    pub cookie: SeekCookie,
    pub boost: f32,
    pub stats_index: usize,
}

pub(crate) struct MultiTermState {
    pub legs: Vec<MultiTermLeg>,
}

enum MultiTermStats {
    /// One blob aggregated over the (segment-ordinal) term rows; used when
    /// the accepted set is discovered while walking segments.
    Aggregate(Vec<u8>),
    /// One blob per enumerated option term.
    PerTerm(Vec<Vec<u8>>),
}

/// Compiled query over a non-adjacent set of terms of one field.
pub(crate) struct MultiTermQuery {
    states: StatesCache<MultiTermState>,
    stats: MultiTermStats,
    field: String,
    boost: f32,
    merge_type: MergeType,
    min_match: usize,
}

impl MultiTermQuery {
    pub const REQUIRED_FEATURES: IndexFeatures = IndexFeatures::DOCS;
}

/// Visitor collecting legs plus statistics for dynamically discovered term
/// sets. Term rows grow as terms are found; the offset restarts per
/// segment so row `k` aggregates the `k`-th accepted term of each segment.
struct DynamicVisitor<'a, 'b> {
    segment: &'a dyn SegmentReader,
    reader: &'a dyn TermReader,
    order: &'b Order,
    term_stats: &'b mut TermCollectors,
    legs: &'b mut Vec<MultiTermLeg>,
    term_offset: usize,
    found: bool,
}

impl FilterVisitor for DynamicVisitor<'_, '_> {
    fn prepare(&mut self) {
        self.found = true;
    }

    fn visit(&mut self, terms: &dyn SeekTermIterator, boost: f32) {
        let boost = boost.max(0.0);
        if self.term_stats.size() <= self.term_offset {
            self.term_stats.push(self.order);
        }
        self.term_stats
            .collect(self.segment, self.reader, self.term_offset, terms);
        self.legs.push(MultiTermLeg {
            cookie: terms.cookie(),
            boost,
            stats_index: 0,
        });
        self.term_offset += 1;
    }
}

/// Prepare path shared by prefix, wildcard, edit-distance, and range
/// filters: `visit` enumerates the accepted terms of one segment's field.
pub(crate) fn prepare_dynamic(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    visit: impl Fn(&dyn TermReader, &mut dyn FilterVisitor),
) -> anyhow::Result<MultiTermQuery> {
    let mut states = StatesCache::new();
    let mut field_stats = FieldCollectors::new(order);
    let mut term_stats = TermCollectors::new(order, 0);

    for segment in index.segments() {
        let Some(reader) = segment.field(field) else {
            continue;
        };
        if !reader
            .meta()
            .index_features
            .contains(MultiTermQuery::REQUIRED_FEATURES)
        {
            continue;
        }
        let mut legs = Vec::new();
        let mut visitor = DynamicVisitor {
            segment,
            reader,
            order,
            term_stats: &mut term_stats,
            legs: &mut legs,
            term_offset: 0,
            found: false,
        };
        visit(reader, &mut visitor);
        let found = visitor.found;
        if !found {
            continue;
        }
        field_stats.collect(segment, reader);
        if legs.is_empty() {
            continue;
        }
        states.insert(segment.id(), MultiTermState { legs });
    }

    let mut stats = vec![0u8; order.stats_size()];
    for row in 0..term_stats.size() {
        term_stats.finish(&mut stats, row, &field_stats, index, order);
    }

    Ok(MultiTermQuery {
        states,
        stats: MultiTermStats::Aggregate(stats),
        field: field.to_string(),
        boost,
        merge_type: MergeType::Sum,
        min_match: 1,
    })
}

/// Prepare path for the enumerated `Terms` filter: per-option statistics
/// and per-term boosts, with `min_match`/`merge_type` from the options.
pub(crate) fn prepare_terms(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    terms: &BTreeMap<Vec<u8>, f32>,
    min_match: usize,
    merge_type: MergeType,
) -> anyhow::Result<MultiTermQuery> {
    let mut states = StatesCache::new();
    let mut field_stats = FieldCollectors::new(order);
    let mut term_stats = TermCollectors::new(order, terms.len());

    for segment in index.segments() {
        let Some(reader) = segment.field(field) else {
            continue;
        };
        if !reader
            .meta()
            .index_features
            .contains(MultiTermQuery::REQUIRED_FEATURES)
        {
            continue;
        }
        let mut legs = Vec::new();
        let mut it = reader.iterator();
        for (idx, (term, term_boost)) in terms.iter().enumerate() {
            if !it.seek(term) {
                continue;
            }
            term_stats.collect(segment, reader, idx, &*it);
            legs.push(MultiTermLeg {
                cookie: it.cookie(),
                boost: term_boost.max(0.0),
                stats_index: idx,
            });
        }
        if legs.is_empty() {
            continue;
        }
        field_stats.collect(segment, reader);
        states.insert(segment.id(), MultiTermState { legs });
    }

    let stats = (0..terms.len())
        .map(|idx| {
            let mut blob = vec![0u8; order.stats_size()];
            term_stats.finish(&mut blob, idx, &field_stats, index, order);
            blob
        })
        .collect_vec();

    Ok(MultiTermQuery {
        states,
        stats: MultiTermStats::PerTerm(stats),
        field: field.to_string(),
        boost,
        merge_type,
        min_match: min_match.max(1),
    })
}

/// Leg wrapper surfacing the matched term's boost as the `FilterBoost`
/// attribute.
pub(crate) struct BoostedIterator<I> {
    inner: I,
    filter_boost: FilterBoost,
}

impl<I: DocIterator> BoostedIterator<I> {
    pub fn new(inner: I, boost: f32) -> Self {
        BoostedIterator {
            inner,
            filter_boost: FilterBoost(boost),
        }
    }
}

impl<I: DocIterator> DocIterator for BoostedIterator<I> {
    fn value(&self) -> DocId {
        self.inner.value()
    }

    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        self.inner.seek(target)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        if id == TypeId::of::<FilterBoost>() {
            Some(&mut self.filter_boost)
        } else {
            self.inner.attribute_mut(id)
        }
    }

    fn positions_mut(&mut self) -> Option<&mut dyn PositionIterator> {
        self.inner.positions_mut()
    }
}

impl PreparedQuery for MultiTermQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn execute<'a>(
        &'a self,
        ctx: ExecutionContext<'a>,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>> {
        let Some(state) = self.states.find(ctx.segment.id()) else {
            return Ok(empty_iterator());
        };
        let Some(reader) = ctx.segment.field(&self.field) else {
            return Ok(empty_iterator());
        };
        let features = ctx.order.features() | Self::REQUIRED_FEATURES;

        let mut legs = Vec::with_capacity(state.legs.len());
        for leg in &state.legs {
            let postings = reader.postings(&leg.cookie, features)?;
            let mut boosted = BoostedIterator::new(postings, leg.boost);
            let funcs = if ctx.order.is_empty() {
                Vec::new()
            } else {
                let stats = match &self.stats {
                    MultiTermStats::Aggregate(blob) => blob.as_slice(),
                    MultiTermStats::PerTerm(blobs) => blobs[leg.stats_index].as_slice(),
                };
                ctx.order
                    .compile(ctx.segment, Some(reader), stats, &mut boosted, self.boost)
            };
            legs.push(ScoredIterator::new(boosted, funcs));
        }

        let components = ctx.order.len();
        let min_match = self.min_match;
        Ok(if ctx.order.is_empty() {
            Box::new(Disjunction::<_, NoopMerger>::new(legs, min_match, components))
        } else {
            match self.merge_type {
                MergeType::Sum => {
                    Box::new(Disjunction::<_, SumMerger>::new(legs, min_match, components))
                },
                MergeType::Max => {
                    Box::new(Disjunction::<_, MaxMerger>::new(legs, min_match, components))
                },
                MergeType::Min => {
                    Box::new(Disjunction::<_, MinMerger>::new(legs, min_match, components))
                },
            }
        })
    }
}
