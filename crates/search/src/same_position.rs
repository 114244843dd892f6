//! Same-position filter: matches documents in which every listed
//! `(field, term)` pair has an occurrence at one common token position.

use std::collections::{
    BTreeMap,
    BTreeSet,
};

use index::{
    doc_ids,
    empty_iterator,
    positions,
    DocId,
    DocIterator,
    IndexFeatures,
    IndexReader,
    SeekCookie,
};

use crate::{
    collectors::{
        FieldCollectors,
        TermCollectors,
    },
    conjunction::Conjunction,
    filter::{
        ExecutionContext,
        PreparedQuery,
    },
    score::{
        NoopMerger,
        Order,
        ScoreMerger,
        ScoredIterator,
        SumMerger,
    },
    states_cache::StatesCache,
};

pub(crate) const SAME_POSITION_FEATURES: IndexFeatures =
    IndexFeatures::FREQ.union(IndexFeatures::POS);

/// Compiled same-position query: one cookie and one stats blob per listed
/// term, in option order.
pub(crate) struct SamePositionQuery {
    states: StatesCache<Vec<SeekCookie>>,
    stats: Vec<Vec<u8>>,
    fields: Vec<String>,
    boost: f32,
}

pub(crate) fn prepare_same_position(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    terms: &[(String, Vec<u8>)],
) -> anyhow::Result<SamePositionQuery> {
    let size = terms.len();
    let mut states = StatesCache::new();
    let mut term_stats = TermCollectors::new(order, size);

    // One field-collector set per distinct field; aggregating
    // heterogeneous fields through a single collector would fold their
    // statistics together.
    let mut field_stats: BTreeMap<&str, FieldCollectors> = terms
        .iter()
        .map(|(field, _)| (field.as_str(), FieldCollectors::new(order)))
        .collect();

    for segment in index.segments() {
        let mut term_states = Vec::with_capacity(size);
        let mut collected_fields: BTreeSet<&str> = BTreeSet::new();

        for (term_idx, (field, term)) in terms.iter().enumerate() {
            let Some(reader) = segment.field(field) else {
                continue;
            };
            if !reader
                .meta()
                .index_features
                .contains(SAME_POSITION_FEATURES)
            {
                continue;
            }
            let mut it = reader.iterator();
            if !it.seek(term) {
                if order.is_empty() {
                    break;
                }
                // Still collect stats for the remaining terms.
                continue;
            }
            if collected_fields.insert(field.as_str()) {
                field_stats
                    .get_mut(field.as_str())
                    .expect("collector per listed field")
                    .collect(segment, reader);
            }
            term_stats.collect(segment, reader, term_idx, &*it);
            term_states.push(it.cookie());
        }

        if term_states.len() != size {
            continue;
        }
        states.insert(segment.id(), term_states);
    }

    let stats = terms
        .iter()
        .enumerate()
        .map(|(term_idx, (field, _))| {
            let mut blob = vec![0u8; order.stats_size()];
            let field_collectors = &field_stats[field.as_str()];
            term_stats.finish(&mut blob, term_idx, field_collectors, index, order);
            blob
        })
        .collect();

    Ok(SamePositionQuery {
        states,
        stats,
        fields: terms.iter().map(|(field, _)| field.clone()).collect(),
        boost,
    })
}

/// Conjunction wrapper running the common-position check after every
/// document-level match.
struct SamePositionIterator<'a, M> {
    conj: Conjunction<Box<dyn DocIterator + 'a>, M>,
}

impl<M: ScoreMerger> SamePositionIterator<'_, M> {
    /// Converging scan: seek every stream to the running target, adopting
    /// any overshoot as the new target, until all streams agree or one
    /// runs out. The target only grows, so this terminates.
    fn find_same_position(&mut self) -> bool {
        let mut target = positions::MIN;
        let mut idx = 0;
        while idx < self.conj.len() {
            let stream = self
                .conj
                .sub_mut(idx)
                .positions_mut()
                .expect("same-position postings opened with positions");
            let pos = stream.seek(target);
            if positions::is_eof(pos) {
                return false;
            }
            if pos != target {
                target = pos;
                idx = 0;
            } else {
                idx += 1;
            }
        }
        true
    }
}

impl<M: ScoreMerger> DocIterator for SamePositionIterator<'_, M> {
    fn value(&self) -> DocId {
        self.conj.value()
    }

    fn next(&mut self) -> bool {
        while self.conj.next() {
            if self.find_same_position() {
                return true;
            }
        }
        false
    }

    fn seek(&mut self, target: DocId) -> DocId {
        let doc = self.conj.seek(target);
        if doc_ids::is_eof(doc) || self.find_same_position() {
            return doc;
        }
        self.next();
        self.value()
    }

    fn cost(&self) -> u64 {
        self.conj.cost()
    }

    fn score(&mut self, out: &mut [f32]) {
        self.conj.score(out)
    }
}

impl PreparedQuery for SamePositionQuery {
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
        let features = ctx.order.features() | SAME_POSITION_FEATURES;

        let mut legs: Vec<Box<dyn DocIterator + 'a>> = Vec::with_capacity(state.len());
        for (term_idx, cookie) in state.iter().enumerate() {
            let Some(reader) = ctx.segment.field(&self.fields[term_idx]) else {
                return Ok(empty_iterator());
            };
            let mut postings = reader.postings(cookie, features)?;
            if postings.positions_mut().is_none() {
                return Ok(empty_iterator());
            }
            if ctx.order.is_empty() {
                legs.push(postings);
            } else {
                let funcs = ctx.order.compile(
                    ctx.segment,
                    Some(reader),
                    &self.stats[term_idx],
                    &mut postings,
                    self.boost,
                );
                legs.push(Box::new(ScoredIterator::new(postings, funcs)));
            }
        }

        let components = ctx.order.len();
        Ok(if ctx.order.is_empty() {
            Box::new(SamePositionIterator {
                conj: Conjunction::<_, NoopMerger>::new(legs, components),
            })
        } else {
            // Sum is the merge type for same-position scoring.
            Box::new(SamePositionIterator {
                conj: Conjunction::<_, SumMerger>::new(legs, components),
            })
        })
    }
}
