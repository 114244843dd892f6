use std::any::Any;

use index::{
    IndexReader,
    SeekTermIterator,
    SegmentReader,
    TermReader,
};

use crate::score::Order;

/// Accumulates per-field statistics across segments during `prepare`.
/// One instance per scorer bucket; concrete state is the scorer's business
/// and recovered by downcast in `finish_stats`.
pub trait FieldCollector: Send {
    fn collect(&mut self, segment: &dyn SegmentReader, field: &dyn TermReader);

    fn as_any(&self) -> &dyn Any;
}

/// Accumulates per-term statistics across segments during `prepare`. The
/// term iterator is positioned on the matched term when `collect` runs.
pub trait TermCollector: Send {
    fn collect(
        &mut self,
        segment: &dyn SegmentReader,
        field: &dyn TermReader,
        terms: &dyn SeekTermIterator,
    );

    fn as_any(&self) -> &dyn Any;
}

/// One field collector per scorer bucket.
pub struct FieldCollectors {
    collectors: Vec<Option<Box<dyn FieldCollector>>>,
}

impl FieldCollectors {
    pub fn new(order: &Order) -> Self {
        FieldCollectors {
            collectors: order
                .buckets()
                .iter()
                .map(|bucket| bucket.scorer.field_collector())
                .collect(),
        }
    }

    /// Called once per segment that contributed at least one term.
    pub fn collect(&mut self, segment: &dyn SegmentReader, field: &dyn TermReader) {
        for collector in self.collectors.iter_mut().flatten() {
            collector.collect(segment, field);
        }
    }

    pub fn get(&self, bucket: usize) -> Option<&dyn FieldCollector> {
        self.collectors[bucket].as_deref()
    }
}

/// Term collectors laid out row-major: one row per term index, one column
/// per scorer bucket. Rows can be appended for filters whose term count is
/// only known while walking segments (the term index restarts at zero per
/// segment, so row `k` aggregates the `k`-th matched term of every
/// segment).
pub struct TermCollectors {
    collectors: Vec<Option<Box<dyn TermCollector>>>,
    buckets: usize,
}

impl TermCollectors {
    pub fn new(order: &Order, terms: usize) -> Self {
        let mut collectors = TermCollectors {
            collectors: Vec::with_capacity(terms * order.len()),
            buckets: order.len(),
        };
        for _ in 0..terms {
            collectors.push(order);
        }
        collectors
    }

    /// Number of term rows.
    pub fn size(&self) -> usize {
        if self.buckets == 0 {
            0
        } else {
            self.collectors.len() / self.buckets
        }
    }

    /// Appends one term row.
    pub fn push(&mut self, order: &Order) {
        debug_assert_eq!(order.len(), self.buckets);
        for bucket in order.buckets() {
            self.collectors.push(bucket.scorer.term_collector());
        }
    }

    pub fn collect(
        &mut self,
        segment: &dyn SegmentReader,
        field: &dyn TermReader,
        term_index: usize,
        terms: &dyn SeekTermIterator,
    ) {
        let row = term_index * self.buckets;
        for collector in self.collectors[row..row + self.buckets].iter_mut().flatten() {
            collector.collect(segment, field, terms);
        }
    }

    /// Folds term row `term_index` into the stats blob, bucket by bucket.
    /// Scorer regions accumulate across rows.
    pub fn finish(
        &self,
        stats: &mut [u8],
        term_index: usize,
        field_stats: &FieldCollectors,
        index: &dyn IndexReader,
        order: &Order,
    ) {
        let row = term_index * self.buckets;
        for (bucket_idx, bucket) in order.buckets().iter().enumerate() {
            let region = order.stats_region_mut(stats, bucket_idx);
            bucket.scorer.finish_stats(
                region,
                index,
                field_stats.get(bucket_idx),
                self.collectors[row + bucket_idx].as_deref(),
            );
        }
    }
}
