//! User-facing filter tree and its prepare dispatch.
//!
//! Filters are immutable values with deep equality and a stable hash.
//! `prepare` compiles a filter against an index reader and an order into a
//! [`PreparedFilter`] holding per-segment state and scorer statistics;
//! `execute` then yields one document iterator per segment.

use std::{
    collections::BTreeMap,
    hash::{
        Hash,
        Hasher,
    },
};

use index::{
    empty_iterator,
    DocIterator,
    IndexReader,
    SegmentReader,
};

use crate::{
    all_query::AllQuery,
    error::QueryError,
    levenshtein_dfa,
    multiterm_query::{
        prepare_dynamic,
        prepare_terms,
        visit_all_terms,
        visit_edit_distance,
        visit_prefix,
        visit_range,
        visit_wildcard,
        BytesRange,
    },
    phrase_filter::prepare_phrase,
    same_position::prepare_same_position,
    score::{
        MergeType,
        Order,
        NO_BOOST,
    },
    term_query::TermQuery,
    wildcard::{
        self,
        WildcardKind,
    },
};

/// Per-execution context: the segment to iterate and the prepared scorers.
pub struct ExecutionContext<'a> {
    pub segment: &'a dyn SegmentReader,
    pub order: &'a Order,
}

/// Compiled query produced by [`Filter::prepare`]. Owns all per-segment
/// state; borrows nothing from the filter tree.
pub(crate) trait PreparedQuery: Send + Sync {
    fn boost(&self) -> f32;

    fn execute<'a>(
        &'a self,
        ctx: ExecutionContext<'a>,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>>;
}

/// Prepared query matching nothing. Zero-sized; every empty preparation
/// shares this shape.
pub(crate) struct EmptyQuery;

impl PreparedQuery for EmptyQuery {
    fn boost(&self) -> f32 {
        NO_BOOST
    }

    fn execute<'a>(
        &'a self,
        _ctx: ExecutionContext<'a>,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>> {
        Ok(empty_iterator())
    }
}

/// The product of filter × index: cached per-segment state plus final
/// scorer statistics. Outlives every iterator it executes.
pub struct PreparedFilter {
    query: Box<dyn PreparedQuery>,
}

impl std::fmt::Debug for PreparedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedFilter").finish_non_exhaustive()
    }
}

impl PreparedFilter {
    pub fn boost(&self) -> f32 {
        self.query.boost()
    }

    /// Opens a document iterator over one segment. Segments unknown to the
    /// prepared state yield the empty iterator.
    pub fn execute<'a>(
        &'a self,
        segment: &'a dyn SegmentReader,
        order: &'a Order,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>> {
        self.query.execute(ExecutionContext { segment, order })
    }
}

fn hash_f32<H: Hasher>(state: &mut H, value: f32) {
    state.write_u32(value.to_bits());
}

macro_rules! boosted_filter {
    ($name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        impl $name {
            pub fn with_boost(mut self, boost: f32) -> Self {
                self.boost = boost;
                self
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                $(self.$field.hash(state);)*
                hash_f32(state, self.boost);
            }
        }
    };
}

/// Matches nothing on any index.
#[derive(Clone, Debug, Default, PartialEq, Hash)]
pub struct EmptyFilter;

/// Matches every document of every segment.
#[derive(Clone, Debug, PartialEq)]
pub struct AllFilter {
    pub boost: f32,
}

impl Default for AllFilter {
    fn default() -> Self {
        AllFilter { boost: NO_BOOST }
    }
}

boosted_filter!(AllFilter {});

/// Matches documents containing an exact term.
#[derive(Clone, Debug, PartialEq)]
pub struct TermFilter {
    pub field: String,
    pub term: Vec<u8>,
    pub boost: f32,
}

impl TermFilter {
    pub fn new(field: impl Into<String>, term: impl AsRef<[u8]>) -> Self {
        TermFilter {
            field: field.into(),
            term: term.as_ref().to_vec(),
            boost: NO_BOOST,
        }
    }
}

boosted_filter!(TermFilter { field: String, term: Vec<u8> });

/// Matches documents containing any term with the given prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixFilter {
    pub field: String,
    pub prefix: Vec<u8>,
    pub boost: f32,
}

impl PrefixFilter {
    pub fn new(field: impl Into<String>, prefix: impl AsRef<[u8]>) -> Self {
        PrefixFilter {
            field: field.into(),
            prefix: prefix.as_ref().to_vec(),
            boost: NO_BOOST,
        }
    }
}

boosted_filter!(PrefixFilter { field: String, prefix: Vec<u8> });

/// Matches documents containing any term accepted by a `%`/`_` pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct WildcardFilter {
    pub field: String,
    pub pattern: Vec<u8>,
    pub boost: f32,
}

impl WildcardFilter {
    pub fn new(field: impl Into<String>, pattern: impl AsRef<[u8]>) -> Self {
        WildcardFilter {
            field: field.into(),
            pattern: pattern.as_ref().to_vec(),
            boost: NO_BOOST,
        }
    }
}

boosted_filter!(WildcardFilter { field: String, pattern: Vec<u8> });

/// Matches documents containing any term within an edit distance of the
/// given term. Accepted terms are boosted by `1 / (1 + distance)`.
#[derive(Clone, Debug, PartialEq)]
pub struct EditDistanceFilter {
    pub field: String,
    pub term: Vec<u8>,
    pub max_distance: u8,
    /// Count transpositions as distance one (Damerau-Levenshtein).
    pub transpositions: bool,
    /// Accept terms extending a within-distance prefix.
    pub prefix: bool,
    pub boost: f32,
}

impl EditDistanceFilter {
    pub fn new(field: impl Into<String>, term: impl AsRef<[u8]>, max_distance: u8) -> Self {
        EditDistanceFilter {
            field: field.into(),
            term: term.as_ref().to_vec(),
            max_distance,
            transpositions: false,
            prefix: false,
            boost: NO_BOOST,
        }
    }
}

boosted_filter!(EditDistanceFilter {
    field: String,
    term: Vec<u8>,
    max_distance: u8,
    transpositions: bool,
    prefix: bool,
});

/// Matches documents containing any term within a byte range.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeFilter {
    pub field: String,
    pub range: BytesRange,
    pub boost: f32,
}

impl RangeFilter {
    pub fn new(field: impl Into<String>, range: BytesRange) -> Self {
        RangeFilter {
            field: field.into(),
            range,
            boost: NO_BOOST,
        }
    }
}

boosted_filter!(RangeFilter { field: String, range: BytesRange });

/// Disjunction over an enumerated, per-term-boosted set of terms.
#[derive(Clone, Debug, PartialEq)]
pub struct TermsFilter {
    pub field: String,
    /// Term bytes mapped to their boost.
    pub terms: BTreeMap<Vec<u8>, f32>,
    /// Minimum number of matching terms per document.
    pub min_match: usize,
    pub merge_type: MergeType,
    pub boost: f32,
}

impl TermsFilter {
    pub fn new(field: impl Into<String>) -> Self {
        TermsFilter {
            field: field.into(),
            terms: BTreeMap::new(),
            min_match: 1,
            merge_type: MergeType::Sum,
            boost: NO_BOOST,
        }
    }

    pub fn term(mut self, term: impl AsRef<[u8]>) -> Self {
        self.terms.insert(term.as_ref().to_vec(), NO_BOOST);
        self
    }

    pub fn boosted_term(mut self, term: impl AsRef<[u8]>, boost: f32) -> Self {
        self.terms.insert(term.as_ref().to_vec(), boost);
        self
    }

    pub fn min_match(mut self, min_match: usize) -> Self {
        self.min_match = min_match;
        self
    }

    pub fn merge_type(mut self, merge_type: MergeType) -> Self {
        self.merge_type = merge_type;
        self
    }
}

impl Hash for TermsFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field.hash(state);
        for (term, boost) in &self.terms {
            term.hash(state);
            hash_f32(state, *boost);
        }
        self.min_match.hash(state);
        self.merge_type.hash(state);
        hash_f32(state, self.boost);
    }
}

impl TermsFilter {
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

/// One slot of a phrase.
#[derive(Clone, Debug, PartialEq)]
pub enum PhrasePart {
    Term {
        term: Vec<u8>,
    },
    Prefix {
        term: Vec<u8>,
    },
    Wildcard {
        pattern: Vec<u8>,
    },
    EditDistance {
        term: Vec<u8>,
        max_distance: u8,
        transpositions: bool,
        prefix: bool,
    },
    Range {
        range: BytesRange,
    },
    Terms {
        terms: BTreeMap<Vec<u8>, f32>,
    },
}

impl Hash for PhrasePart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            PhrasePart::Term { term } => {
                0u8.hash(state);
                term.hash(state);
            },
            PhrasePart::Prefix { term } => {
                1u8.hash(state);
                term.hash(state);
            },
            PhrasePart::Wildcard { pattern } => {
                2u8.hash(state);
                pattern.hash(state);
            },
            PhrasePart::EditDistance {
                term,
                max_distance,
                transpositions,
                prefix,
            } => {
                3u8.hash(state);
                term.hash(state);
                max_distance.hash(state);
                transpositions.hash(state);
                prefix.hash(state);
            },
            PhrasePart::Range { range } => {
                4u8.hash(state);
                range.hash(state);
            },
            PhrasePart::Terms { terms } => {
                5u8.hash(state);
                for (term, boost) in terms {
                    term.hash(state);
                    hash_f32(state, *boost);
                }
            },
        }
    }
}

/// Ordered positional sequence over one field: slot offset → slot options.
#[derive(Clone, Debug, PartialEq)]
pub struct PhraseFilter {
    pub field: String,
    pub slots: BTreeMap<u32, PhrasePart>,
    pub boost: f32,
}

impl PhraseFilter {
    pub fn new(field: impl Into<String>) -> Self {
        PhraseFilter {
            field: field.into(),
            slots: BTreeMap::new(),
            boost: NO_BOOST,
        }
    }

    /// Places a slot at the next free offset.
    pub fn push(mut self, part: PhrasePart) -> Self {
        let offset = self
            .slots
            .keys()
            .next_back()
            .map(|offset| offset + 1)
            .unwrap_or(0);
        self.slots.insert(offset, part);
        self
    }

    /// Places a slot at an explicit offset; gaps express "any token here".
    pub fn slot(mut self, offset: u32, part: PhrasePart) -> Self {
        self.slots.insert(offset, part);
        self
    }

    /// Literal-token convenience for the common case.
    pub fn term(self, term: impl AsRef<[u8]>) -> Self {
        self.push(PhrasePart::Term {
            term: term.as_ref().to_vec(),
        })
    }
}

impl Hash for PhraseFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field.hash(state);
        self.slots.hash(state);
        hash_f32(state, self.boost);
    }
}

impl PhraseFilter {
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

/// Matches documents in which all listed `(field, term)` pairs occur at a
/// common position.
#[derive(Clone, Debug, PartialEq)]
pub struct SamePositionFilter {
    pub terms: Vec<(String, Vec<u8>)>,
    pub boost: f32,
}

impl SamePositionFilter {
    pub fn new() -> Self {
        SamePositionFilter {
            terms: Vec::new(),
            boost: NO_BOOST,
        }
    }

    pub fn term(mut self, field: impl Into<String>, term: impl AsRef<[u8]>) -> Self {
        self.terms.push((field.into(), term.as_ref().to_vec()));
        self
    }
}

impl Default for SamePositionFilter {
    fn default() -> Self {
        SamePositionFilter::new()
    }
}

boosted_filter!(SamePositionFilter { terms: Vec<(String, Vec<u8>)> });

/// Multiplies the boost of a wrapped filter.
#[derive(Clone, Debug, PartialEq)]
pub struct BoostFilter {
    pub inner: Box<Filter>,
    pub boost: f32,
}

impl BoostFilter {
    pub fn new(inner: Filter, boost: f32) -> Self {
        BoostFilter {
            inner: Box::new(inner),
            boost,
        }
    }
}

boosted_filter!(BoostFilter { inner: Box<Filter> });

/// The filter tree.
#[derive(Clone, Debug, PartialEq, Hash)]
pub enum Filter {
    Empty(EmptyFilter),
    All(AllFilter),
    Term(TermFilter),
    Prefix(PrefixFilter),
    Wildcard(WildcardFilter),
    EditDistance(EditDistanceFilter),
    Range(RangeFilter),
    Terms(TermsFilter),
    Phrase(PhraseFilter),
    SamePosition(SamePositionFilter),
    Boost(BoostFilter),
}

macro_rules! filter_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Filter {
            fn from(filter: $ty) -> Filter {
                Filter::$variant(filter)
            }
        }
    };
}

filter_from!(Empty, EmptyFilter);
filter_from!(All, AllFilter);
filter_from!(Term, TermFilter);
filter_from!(Prefix, PrefixFilter);
filter_from!(Wildcard, WildcardFilter);
filter_from!(EditDistance, EditDistanceFilter);
filter_from!(Range, RangeFilter);
filter_from!(Terms, TermsFilter);
filter_from!(Phrase, PhraseFilter);
filter_from!(SamePosition, SamePositionFilter);
filter_from!(Boost, BoostFilter);

impl Filter {
    pub fn boost(&self) -> f32 {
        match self {
            Filter::Empty(_) => NO_BOOST,
            Filter::All(filter) => filter.boost,
            Filter::Term(filter) => filter.boost,
            Filter::Prefix(filter) => filter.boost,
            Filter::Wildcard(filter) => filter.boost,
            Filter::EditDistance(filter) => filter.boost,
            Filter::Range(filter) => filter.boost,
            Filter::Terms(filter) => filter.boost,
            Filter::Phrase(filter) => filter.boost,
            Filter::SamePosition(filter) => filter.boost,
            Filter::Boost(filter) => filter.boost,
        }
    }

    /// Compiles the filter against `index`, collecting the statistics the
    /// order's scorers require. Configuration problems fail here; missing
    /// fields and features only shrink the result.
    pub fn prepare(
        &self,
        index: &dyn IndexReader,
        order: &Order,
        boost: f32,
    ) -> anyhow::Result<PreparedFilter> {
        let boost = boost * self.boost();
        let query: Box<dyn PreparedQuery> = match self {
            Filter::Empty(_) => Box::new(EmptyQuery),
            Filter::All(_) => Box::new(AllQuery::prepare(index, order, boost)),
            Filter::Term(filter) => Box::new(TermQuery::prepare(
                index,
                order,
                boost,
                &filter.field,
                &filter.term,
            )?),
            Filter::Prefix(filter) => {
                prepare_prefix(index, order, boost, &filter.field, &filter.prefix)?
            },
            Filter::Wildcard(filter) => {
                prepare_wildcard(index, order, boost, &filter.field, &filter.pattern)?
            },
            Filter::EditDistance(filter) => prepare_edit_distance(index, order, boost, filter)?,
            Filter::Range(filter) => Box::new(prepare_dynamic(
                index,
                order,
                boost,
                &filter.field,
                |reader, visitor| visit_range(reader, &filter.range, visitor),
            )?),
            Filter::Terms(filter) => {
                if filter.terms.is_empty() {
                    Box::new(EmptyQuery)
                } else {
                    Box::new(prepare_terms(
                        index,
                        order,
                        boost,
                        &filter.field,
                        &filter.terms,
                        filter.min_match,
                        filter.merge_type,
                    )?)
                }
            },
            Filter::Phrase(filter) => {
                if filter.field.is_empty() || filter.slots.is_empty() {
                    Box::new(EmptyQuery)
                } else {
                    prepare_phrase(index, order, boost, &filter.field, &filter.slots)?
                }
            },
            Filter::SamePosition(filter) => {
                if filter.terms.is_empty() {
                    Box::new(EmptyQuery)
                } else {
                    Box::new(prepare_same_position(index, order, boost, &filter.terms)?)
                }
            },
            Filter::Boost(filter) => return filter.inner.prepare(index, order, boost),
        };
        Ok(PreparedFilter { query })
    }
}

fn prepare_prefix(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    prefix: &[u8],
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    Ok(Box::new(prepare_dynamic(
        index,
        order,
        boost,
        field,
        |reader, visitor| visit_prefix(reader, prefix, visitor),
    )?))
}

fn prepare_wildcard(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    pattern: &[u8],
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    Ok(match wildcard::classify(pattern) {
        WildcardKind::Term(term) => {
            Box::new(TermQuery::prepare(index, order, boost, field, &term)?)
        },
        WildcardKind::Prefix(prefix) => prepare_prefix(index, order, boost, field, &prefix)?,
        WildcardKind::MatchAll => Box::new(prepare_dynamic(
            index,
            order,
            boost,
            field,
            |reader, visitor| visit_all_terms(reader, visitor),
        )?),
        WildcardKind::Pattern { prefix } => {
            let tokens = wildcard::compile(pattern);
            Box::new(prepare_dynamic(
                index,
                order,
                boost,
                field,
                move |reader, visitor| visit_wildcard(reader, &prefix, &tokens, visitor),
            )?)
        },
    })
}

fn prepare_edit_distance(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    filter: &EditDistanceFilter,
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    if filter.max_distance > levenshtein_dfa::MAX_DISTANCE {
        return Err(QueryError::InvalidOptions(format!(
            "edit distance {} exceeds the maximum of {}",
            filter.max_distance,
            levenshtein_dfa::MAX_DISTANCE
        ))
        .into());
    }
    let term = std::str::from_utf8(&filter.term).map_err(|_| {
        QueryError::InvalidOptions("edit-distance term is not valid utf-8".to_string())
    })?;
    let dfa = levenshtein_dfa::build_dfa(
        term,
        filter.max_distance,
        filter.transpositions,
        filter.prefix,
    );
    Ok(Box::new(prepare_dynamic(
        index,
        order,
        boost,
        &filter.field,
        move |reader, visitor| visit_edit_distance(reader, &dfa, visitor),
    )?))
}

/// Single-slot dispatch used by the phrase prepare path: a one-slot phrase
/// is exactly the underlying filter.
pub(crate) fn prepare_part(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    part: &PhrasePart,
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    Ok(match part {
        PhrasePart::Term { term } => {
            Box::new(TermQuery::prepare(index, order, boost, field, term)?)
        },
        PhrasePart::Prefix { term } => prepare_prefix(index, order, boost, field, term)?,
        PhrasePart::Wildcard { pattern } => prepare_wildcard(index, order, boost, field, pattern)?,
        PhrasePart::EditDistance {
            term,
            max_distance,
            transpositions,
            prefix,
        } => {
            let filter = EditDistanceFilter {
                field: field.to_string(),
                term: term.clone(),
                max_distance: *max_distance,
                transpositions: *transpositions,
                prefix: *prefix,
                boost: NO_BOOST,
            };
            prepare_edit_distance(index, order, boost, &filter)?
        },
        PhrasePart::Range { range } => Box::new(prepare_dynamic(
            index,
            order,
            boost,
            field,
            |reader, visitor| visit_range(reader, range, visitor),
        )?),
        PhrasePart::Terms { .. } => {
            unreachable!("terms slots rejected before single-slot dispatch")
        },
    })
}
