use std::any::{
    Any,
    TypeId,
};

use anyhow::Context;
use index::{
    DocId,
    DocIterator,
    DocIteratorExt,
    FilterBoost,
    Frequency,
    IndexFeatures,
    IndexReader,
    Norm,
    PositionIterator,
    SegmentReader,
    TermReader,
};

use crate::{
    collectors::{
        FieldCollector,
        TermCollector,
    },
    scorers,
};

/// Neutral boost value.
pub const NO_BOOST: f32 = 1.0;

/// How a combinator folds the score components of its sub-iterators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MergeType {
    #[default]
    Sum,
    Max,
    Min,
}

/// Reducer over per-sub-iterator score buffers. Implementations are
/// zero-sized and chosen per call site, so combinator inner loops carry no
/// virtual dispatch.
pub trait ScoreMerger {
    /// Whether sub-iterator scores are evaluated at all.
    const SCORES: bool = true;

    fn merge(acc: &mut [f32], item: &[f32]);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SumMerger;

impl ScoreMerger for SumMerger {
    fn merge(acc: &mut [f32], item: &[f32]) {
        for (acc, item) in acc.iter_mut().zip(item) {
            *acc += item;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MaxMerger;

impl ScoreMerger for MaxMerger {
    fn merge(acc: &mut [f32], item: &[f32]) {
        for (acc, item) in acc.iter_mut().zip(item) {
            *acc = acc.max(*item);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MinMerger;

impl ScoreMerger for MinMerger {
    fn merge(acc: &mut [f32], item: &[f32]) {
        for (acc, item) in acc.iter_mut().zip(item) {
            *acc = acc.min(*item);
        }
    }
}

/// Merger for unscored execution; sub-iterator score paths are skipped
/// entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMerger;

impl ScoreMerger for NoopMerger {
    const SCORES: bool = false;

    fn merge(_acc: &mut [f32], _item: &[f32]) {}
}

/// Per-document inputs a leaf score function may consume. Gathered from the
/// iterator's attributes right before each evaluation.
#[derive(Clone, Copy, Debug)]
pub struct ScoreInput {
    pub doc: DocId,
    /// Term (or pattern) frequency in the document; 1 when the iterator
    /// exposes none.
    pub freq: u32,
    /// Field length in tokens; 0 when unavailable.
    pub norm: u32,
    /// Dynamic per-document boost; `NO_BOOST` when the iterator exposes
    /// none.
    pub filter_boost: f32,
}

/// Pure per-document scoring function produced by
/// [`PreparedScorer::prepare_leaf`]. Corpus-level quantities (idf, average
/// field length) are folded in at construction.
pub trait LeafScorer: Send {
    fn score(&self, input: &ScoreInput) -> f32;
}

impl<F: Fn(&ScoreInput) -> f32 + Send> LeafScorer for F {
    fn score(&self, input: &ScoreInput) -> f32 {
        self(input)
    }
}

/// One score component producer. `Constant` is the fast path for scorers
/// whose output does not depend on the document; a present `FilterBoost`
/// attribute still multiplies into it at evaluation time.
pub enum ScoreFunction {
    /// Always zero.
    Default,
    Constant(f32),
    Leaf(Box<dyn LeafScorer>),
}

impl ScoreFunction {
    pub fn evaluate(&self, input: &ScoreInput) -> f32 {
        let base = match self {
            ScoreFunction::Default => 0.0,
            ScoreFunction::Constant(value) => *value,
            ScoreFunction::Leaf(leaf) => leaf.score(input),
        };
        base * input.filter_boost
    }
}

/// A scorer resolved from the registry but not yet prepared against an
/// order.
pub trait Scorer: Send + Sync {
    fn prepare(&self) -> Box<dyn PreparedScorer>;
}

impl std::fmt::Debug for dyn Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Scorer")
    }
}

/// A scorer bucket of a prepared [`Order`].
pub trait PreparedScorer: Send + Sync {
    /// Features this scorer needs from postings; unioned into each filter's
    /// required set.
    fn index_features(&self) -> IndexFeatures {
        IndexFeatures::empty()
    }

    fn field_collector(&self) -> Option<Box<dyn FieldCollector>> {
        None
    }

    fn term_collector(&self) -> Option<Box<dyn TermCollector>> {
        None
    }

    /// Size of this scorer's region of the stats blob.
    fn stats_size(&self) -> usize {
        0
    }

    /// Folds one collected term (and its field context) into the stats
    /// region. Called once per collected term row; implementations
    /// accumulate.
    fn finish_stats(
        &self,
        _stats: &mut [u8],
        _index: &dyn IndexReader,
        _field: Option<&dyn FieldCollector>,
        _term: Option<&dyn TermCollector>,
    ) {
    }

    /// Builds the per-segment score function for one leaf iterator.
    /// `attrs` is the iterator the function will be attached to; scorers
    /// probe it for the attributes they rely on.
    fn prepare_leaf(
        &self,
        segment: &dyn SegmentReader,
        field: Option<&dyn TermReader>,
        stats: &[u8],
        attrs: &mut dyn DocIterator,
        boost: f32,
    ) -> ScoreFunction;
}

/// Reference to a registered scorer plus its arguments, as accepted by
/// [`Order::prepare`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScorerSpec {
    pub name: String,
    /// JSON arguments, scorer-specific.
    pub args: Option<String>,
}

impl ScorerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        ScorerSpec {
            name: name.into(),
            args: None,
        }
    }

    pub fn with_args(name: impl Into<String>, args: impl Into<String>) -> Self {
        ScorerSpec {
            name: name.into(),
            args: Some(args.into()),
        }
    }
}

pub(crate) struct Bucket {
    pub scorer: Box<dyn PreparedScorer>,
    pub stats_offset: usize,
}

/// Ordered list of prepared scorers. Filters prepare against an order and
/// their iterators emit one score component per bucket, in order.
#[derive(Default)]
pub struct Order {
    buckets: Vec<Bucket>,
    stats_size: usize,
    features: IndexFeatures,
}

impl std::fmt::Debug for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Order")
            .field("stats_size", &self.stats_size)
            .field("features", &self.features)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl Order {
    /// Order with no scorers; execution skips all score work.
    pub fn empty() -> Order {
        Order::default()
    }

    /// Resolves the specs against the scorer registry. Unknown names and
    /// malformed arguments are configuration errors.
    pub fn prepare(specs: &[ScorerSpec]) -> anyhow::Result<Order> {
        let mut order = Order::default();
        for spec in specs {
            let scorer = scorers::get(&spec.name, spec.args.as_deref())
                .with_context(|| format!("preparing scorer '{}'", spec.name))?;
            let prepared = scorer.prepare();
            order.features |= prepared.index_features();
            let stats_size = prepared.stats_size();
            order.buckets.push(Bucket {
                stats_offset: order.stats_size,
                scorer: prepared,
            });
            order.stats_size += stats_size;
        }
        Ok(order)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of score components per document.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn features(&self) -> IndexFeatures {
        self.features
    }

    pub fn stats_size(&self) -> usize {
        self.stats_size
    }

    pub(crate) fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub(crate) fn stats_region<'a>(&self, stats: &'a [u8], bucket: usize) -> &'a [u8] {
        let Bucket {
            stats_offset,
            scorer,
        } = &self.buckets[bucket];
        &stats[*stats_offset..*stats_offset + scorer.stats_size()]
    }

    pub(crate) fn stats_region_mut<'a>(&self, stats: &'a mut [u8], bucket: usize) -> &'a mut [u8] {
        let Bucket {
            stats_offset,
            scorer,
        } = &self.buckets[bucket];
        &mut stats[*stats_offset..*stats_offset + scorer.stats_size()]
    }

    /// Compiles one score function per bucket for a leaf iterator.
    pub(crate) fn compile(
        &self,
        segment: &dyn SegmentReader,
        field: Option<&dyn TermReader>,
        stats: &[u8],
        attrs: &mut dyn DocIterator,
        boost: f32,
    ) -> Vec<ScoreFunction> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(idx, bucket)| {
                bucket.scorer.prepare_leaf(
                    segment,
                    field,
                    self.stats_region(stats, idx),
                    attrs,
                    boost,
                )
            })
            .collect()
    }
}

/// Reads the score inputs off an iterator's attribute bag.
pub(crate) fn gather_input(it: &mut (impl DocIterator + ?Sized)) -> ScoreInput {
    ScoreInput {
        doc: it.value(),
        freq: it.attr_mut::<Frequency>().map(|freq| freq.0).unwrap_or(1),
        norm: it.attr_mut::<Norm>().map(|norm| norm.0).unwrap_or(0),
        filter_boost: it
            .attr_mut::<FilterBoost>()
            .map(|boost| boost.0)
            .unwrap_or(NO_BOOST),
    }
}

/// Leaf iterator with attached score functions: evaluates one component per
/// bucket from its inner iterator's current attributes. All other behavior
/// forwards to the inner iterator.
pub struct ScoredIterator<I> {
    inner: I,
    funcs: Vec<ScoreFunction>,
}

impl<I: DocIterator> ScoredIterator<I> {
    pub fn new(inner: I, funcs: Vec<ScoreFunction>) -> Self {
        ScoredIterator { inner, funcs }
    }
}

impl<I: DocIterator> DocIterator for ScoredIterator<I> {
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

    fn score(&mut self, out: &mut [f32]) {
        let input = gather_input(&mut self.inner);
        for (slot, func) in out.iter_mut().zip(&self.funcs) {
            *slot = func.evaluate(&input);
        }
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        self.inner.attribute_mut(id)
    }

    fn positions_mut(&mut self) -> Option<&mut dyn PositionIterator> {
        self.inner.positions_mut()
    }
}
