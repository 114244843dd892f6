//! Compiled phrase queries and their positional iterators.
//!
//! Both phrase flavors conjoin one document iterator per slot and then
//! verify token alignment: an anchor position from the first slot's stream
//! is checked against every other slot at its declared relative offset,
//! re-anchoring on the smallest feasible position whenever a slot
//! overshoots. The variadic flavor feeds each slot from a union of term
//! postings with a min-merged position stream.

use std::any::{
    Any,
    TypeId,
};

use index::{
    doc_ids,
    empty_iterator,
    positions,
    DocId,
    DocIterator,
    FilterBoost,
    Frequency,
    IndexFeatures,
    Pos,
    PositionIterator,
    SeekCookie,
};

use crate::{
    filter::{
        ExecutionContext,
        PreparedQuery,
    },
    score::{
        ScoredIterator,
        NO_BOOST,
    },
    states_cache::StatesCache,
};

/// Features a positional phrase needs from the posting source.
pub(crate) const PHRASE_FEATURES: IndexFeatures =
    IndexFeatures::FREQ.union(IndexFeatures::POS);

/// Cached per-segment fixed phrase state: one cookie per slot, in slot
/// order. Literal slots carry no boost of their own.
pub(crate) struct FixedPhraseState {
    pub terms: Vec<(SeekCookie, f32)>,
}

/// Cached per-segment variadic phrase state: `num_terms[k]` consecutive
/// `(cookie, boost)` entries belong to slot `k`.
pub(crate) struct VariadicPhraseState {
    pub terms: Vec<(SeekCookie, f32)>,
    pub num_terms: Vec<usize>,
    pub volatile_boost: bool,
}

/// One slot of a phrase during execution: a document iterator plus the
/// position stream and the boost of whatever term matched the current
/// document.
pub(crate) trait PhraseLeg: DocIterator {
    fn positions(&mut self) -> &mut dyn PositionIterator;

    fn slot_boost(&self) -> f32 {
        NO_BOOST
    }
}

struct FixedLeg<'a> {
    it: Box<dyn DocIterator + 'a>,
}

impl DocIterator for FixedLeg<'_> {
    fn value(&self) -> DocId {
        self.it.value()
    }

    fn next(&mut self) -> bool {
        self.it.next()
    }

    fn seek(&mut self, target: DocId) -> DocId {
        self.it.seek(target)
    }

    fn cost(&self) -> u64 {
        self.it.cost()
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        self.it.attribute_mut(id)
    }

    fn positions_mut(&mut self) -> Option<&mut dyn PositionIterator> {
        self.it.positions_mut()
    }
}

impl PhraseLeg for FixedLeg<'_> {
    fn positions(&mut self) -> &mut dyn PositionIterator {
        self.it
            .positions_mut()
            .expect("phrase postings opened with positions")
    }
}

struct VariadicSub<'a> {
    it: Box<dyn DocIterator + 'a>,
    boost: f32,
}

/// Union of one slot's term postings. Documents merge by minimum id;
/// positions of the sub-iterators sitting on the current document merge by
/// minimum position, remembering which sub-iterator supplied it so the
/// slot can report that term's boost.
struct VariadicLeg<'a> {
    subs: Vec<VariadicSub<'a>>,
    doc: DocId,
    cost: u64,
    pos_value: Pos,
    current_sub: usize,
}

impl<'a> VariadicLeg<'a> {
    fn new(subs: Vec<VariadicSub<'a>>) -> Self {
        let cost = subs
            .iter()
            .map(|sub| sub.it.cost())
            .fold(0u64, u64::saturating_add);
        VariadicLeg {
            subs,
            doc: doc_ids::INVALID,
            cost,
            pos_value: positions::INVALID,
            current_sub: 0,
        }
    }

    fn settle(&mut self) -> DocId {
        let min = self
            .subs
            .iter()
            .map(|sub| sub.it.value())
            .min()
            .unwrap_or(doc_ids::EOF);
        self.doc = min;
        self.pos_value = positions::INVALID;
        min
    }

    /// Smallest position >= `target` across the sub-iterators on the
    /// current document.
    fn seek_position(&mut self, target: Pos) -> Pos {
        let mut best = positions::EOF;
        for (idx, sub) in self.subs.iter_mut().enumerate() {
            if sub.it.value() != self.doc {
                continue;
            }
            let Some(stream) = sub.it.positions_mut() else {
                continue;
            };
            let pos = stream.seek(target);
            if pos < best {
                best = pos;
                self.current_sub = idx;
            }
        }
        self.pos_value = best;
        best
    }
}

impl DocIterator for VariadicLeg<'_> {
    fn value(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> bool {
        if doc_ids::is_eof(self.doc) {
            return false;
        }
        for sub in &mut self.subs {
            if self.doc == doc_ids::INVALID || sub.it.value() == self.doc {
                sub.it.next();
            }
        }
        !doc_ids::is_eof(self.settle())
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_ids::is_eof(self.doc) {
            return doc_ids::EOF;
        }
        if self.doc != doc_ids::INVALID && target <= self.doc {
            return self.doc;
        }
        for sub in &mut self.subs {
            if sub.it.value() < target {
                sub.it.seek(target);
            }
        }
        self.settle()
    }

    fn cost(&self) -> u64 {
        self.cost
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        let idx = self
            .subs
            .iter()
            .position(|sub| sub.it.value() == self.doc)?;
        self.subs[idx].it.attribute_mut(id)
    }
}

impl PositionIterator for VariadicLeg<'_> {
    fn value(&self) -> Pos {
        self.pos_value
    }

    fn next(&mut self) -> Pos {
        let target = if self.pos_value == positions::INVALID {
            positions::MIN
        } else if positions::is_eof(self.pos_value) {
            return positions::EOF;
        } else {
            self.pos_value + 1
        };
        self.seek_position(target)
    }

    fn seek(&mut self, target: Pos) -> Pos {
        if positions::is_eof(self.pos_value) {
            return positions::EOF;
        }
        if self.pos_value != positions::INVALID && self.pos_value >= target {
            return self.pos_value;
        }
        self.seek_position(target)
    }
}

impl PhraseLeg for VariadicLeg<'_> {
    fn positions(&mut self) -> &mut dyn PositionIterator {
        self
    }

    fn slot_boost(&self) -> f32 {
        if self.pos_value == positions::INVALID || positions::is_eof(self.pos_value) {
            NO_BOOST
        } else {
            self.subs[self.current_sub].boost
        }
    }
}

/// Conjunction of phrase legs with positional verification. Legs stay in
/// slot order (the verifier pairs leg `k` with `rel[k]`); the cheapest leg
/// drives document advancement.
pub(crate) struct PhraseIterator<L> {
    legs: Vec<L>,
    rel: Vec<u32>,
    lead: usize,
    doc: DocId,
    freq: Frequency,
    filter_boost: Option<FilterBoost>,
    count_all: bool,
    match_boost: f32,
}

impl<L: PhraseLeg> PhraseIterator<L> {
    /// `rel` holds each slot's offset relative to the first slot
    /// (`rel[0] == 0`). `volatile_boost` surfaces the matched terms' boost
    /// product through the `FilterBoost` attribute; `count_all` makes the
    /// verifier count every occurrence for tf-based scoring.
    pub fn new(legs: Vec<L>, rel: Vec<u32>, volatile_boost: bool, count_all: bool) -> Self {
        debug_assert_eq!(legs.len(), rel.len());
        let lead = legs
            .iter()
            .enumerate()
            .min_by_key(|(_, leg)| leg.cost())
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        PhraseIterator {
            legs,
            rel,
            lead,
            doc: doc_ids::INVALID,
            freq: Frequency::default(),
            filter_boost: volatile_boost.then(|| FilterBoost(NO_BOOST)),
            count_all,
            match_boost: NO_BOOST,
        }
    }

    fn align(&mut self) -> DocId {
        let mut target = self.legs[self.lead].value();
        'outer: loop {
            for idx in 0..self.legs.len() {
                if idx == self.lead {
                    continue;
                }
                let doc = self.legs[idx].seek(target);
                if doc > target {
                    target = self.legs[self.lead].seek(doc);
                    if doc_ids::is_eof(target) {
                        return doc_ids::EOF;
                    }
                    continue 'outer;
                }
            }
            return target;
        }
    }

    /// Number of aligned occurrences in the current document; also tracks
    /// the boost product of the first occurrence.
    fn phrase_freq(&mut self) -> u32 {
        let mut freq = 0u32;
        self.match_boost = NO_BOOST;
        let mut base = self.legs[0].positions().next();
        'outer: while !positions::is_eof(base) {
            let mut occurrence_boost = self.legs[0].slot_boost();
            for idx in 1..self.legs.len() {
                let expected = base + self.rel[idx];
                let found = self.legs[idx].positions().seek(expected);
                if positions::is_eof(found) {
                    break 'outer;
                }
                if found != expected {
                    base = self.legs[0].positions().seek(found - self.rel[idx]);
                    continue 'outer;
                }
                occurrence_boost *= self.legs[idx].slot_boost();
            }
            freq += 1;
            if freq == 1 {
                self.match_boost = occurrence_boost;
            }
            if !self.count_all {
                break;
            }
            base = self.legs[0].positions().next();
        }
        freq
    }

    /// Advances through aligned documents until the verifier confirms one.
    fn settle(&mut self, mut doc: DocId) -> bool {
        loop {
            if doc_ids::is_eof(doc) {
                self.doc = doc_ids::EOF;
                return false;
            }
            let freq = self.phrase_freq();
            if freq > 0 {
                self.doc = doc;
                self.freq.0 = freq;
                if let Some(filter_boost) = &mut self.filter_boost {
                    filter_boost.0 = self.match_boost;
                }
                return true;
            }
            if !self.legs[self.lead].next() {
                self.doc = doc_ids::EOF;
                return false;
            }
            doc = self.align();
        }
    }
}

impl<L: PhraseLeg> DocIterator for PhraseIterator<L> {
    fn value(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> bool {
        if doc_ids::is_eof(self.doc) {
            return false;
        }
        if !self.legs[self.lead].next() {
            self.doc = doc_ids::EOF;
            return false;
        }
        let doc = self.align();
        self.settle(doc)
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_ids::is_eof(self.doc) {
            return doc_ids::EOF;
        }
        if self.doc != doc_ids::INVALID && target <= self.doc {
            return self.doc;
        }
        if doc_ids::is_eof(self.legs[self.lead].seek(target)) {
            self.doc = doc_ids::EOF;
            return doc_ids::EOF;
        }
        let doc = self.align();
        self.settle(doc);
        self.doc
    }

    fn cost(&self) -> u64 {
        self.legs[self.lead].cost()
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        if id == TypeId::of::<Frequency>() {
            return Some(&mut self.freq);
        }
        if id == TypeId::of::<FilterBoost>() {
            return self
                .filter_boost
                .as_mut()
                .map(|filter_boost| filter_boost as &mut dyn Any);
        }
        // Remaining attributes (e.g. field length) come from the first
        // slot's postings.
        self.legs[0].attribute_mut(id)
    }
}

/// Compiled fixed phrase: every slot is a single literal term.
pub(crate) struct FixedPhraseQuery {
    pub(crate) states: StatesCache<FixedPhraseState>,
    pub(crate) positions: Vec<u32>,
    pub(crate) stats: Vec<u8>,
    pub(crate) field: String,
    pub(crate) boost: f32,
}

impl PreparedQuery for FixedPhraseQuery {
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
        let features = ctx.order.features() | PHRASE_FEATURES;

        let mut legs = Vec::with_capacity(state.terms.len());
        for (cookie, _) in &state.terms {
            let mut it = reader.postings(cookie, features)?;
            if it.positions_mut().is_none() {
                return Ok(empty_iterator());
            }
            legs.push(FixedLeg { it });
        }

        let count_all = !ctx.order.is_empty();
        let mut phrase = PhraseIterator::new(legs, self.positions.clone(), false, count_all);
        if ctx.order.is_empty() {
            return Ok(Box::new(phrase));
        }
        let funcs = ctx
            .order
            .compile(ctx.segment, Some(reader), &self.stats, &mut phrase, self.boost);
        Ok(Box::new(ScoredIterator::new(phrase, funcs)))
    }
}

/// Compiled variadic phrase: at least one slot expands to several terms.
pub(crate) struct VariadicPhraseQuery {
    pub(crate) states: StatesCache<VariadicPhraseState>,
    pub(crate) positions: Vec<u32>,
    pub(crate) stats: Vec<u8>,
    pub(crate) field: String,
    pub(crate) boost: f32,
}

impl PreparedQuery for VariadicPhraseQuery {
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
        let features = ctx.order.features() | PHRASE_FEATURES;

        let mut legs = Vec::with_capacity(state.num_terms.len());
        let mut offset = 0;
        for &slot_terms in &state.num_terms {
            let mut subs = Vec::with_capacity(slot_terms);
            for (cookie, boost) in &state.terms[offset..offset + slot_terms] {
                let mut it = reader.postings(cookie, features)?;
                if it.positions_mut().is_none() {
                    return Ok(empty_iterator());
                }
                subs.push(VariadicSub { it, boost: *boost });
            }
            offset += slot_terms;
            legs.push(VariadicLeg::new(subs));
        }

        let count_all = !ctx.order.is_empty();
        let volatile_boost = state.volatile_boost;
        let mut phrase =
            PhraseIterator::new(legs, self.positions.clone(), volatile_boost, count_all);
        if ctx.order.is_empty() {
            return Ok(Box::new(phrase));
        }
        let funcs = ctx
            .order
            .compile(ctx.segment, Some(reader), &self.stats, &mut phrase, self.boost);
        Ok(Box::new(ScoredIterator::new(phrase, funcs)))
    }
}
