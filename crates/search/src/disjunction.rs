use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    marker::PhantomData,
};

use index::{
    doc_ids,
    DocId,
    DocIterator,
};

use crate::score::ScoreMerger;

/// Union of sub-iterators on document id, driven by a min-heap keyed on
/// each sub-iterator's current document.
///
/// `next` pops every sub-iterator sitting at the minimum, which become the
/// *matched* set; scores aggregate over exactly that set. An optional
/// `min_match` threshold drops documents fewer than K sub-iterators agree
/// on, via a counting scan.
pub struct Disjunction<I, M> {
    subs: Vec<I>,
    // Current position of every live sub-iterator not in `matched`.
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    matched: Vec<usize>,
    doc: DocId,
    min_match: usize,
    cost: u64,
    tmp: Vec<f32>,
    _merger: PhantomData<M>,
}

impl<I: DocIterator, M: ScoreMerger> Disjunction<I, M> {
    pub fn new(subs: Vec<I>, min_match: usize, components: usize) -> Self {
        let cost = subs.iter().map(|sub| sub.cost()).fold(0u64, u64::saturating_add);
        let mut disjunction = Disjunction {
            heap: BinaryHeap::with_capacity(subs.len()),
            matched: Vec::with_capacity(subs.len()),
            subs,
            doc: doc_ids::INVALID,
            min_match: min_match.max(1),
            cost,
            tmp: vec![0.0; components],
            _merger: PhantomData,
        };
        for idx in 0..disjunction.subs.len() {
            if disjunction.subs[idx].next() {
                let doc = disjunction.subs[idx].value();
                disjunction.heap.push(Reverse((doc, idx)));
            }
        }
        disjunction
    }

    /// Indices of the sub-iterators positioned on the current document.
    pub fn matched(&self) -> &[usize] {
        &self.matched
    }

    pub fn sub_mut(&mut self, idx: usize) -> &mut I {
        &mut self.subs[idx]
    }

    /// Re-inserts the matched set after stepping each member forward.
    fn advance_matched(&mut self) {
        for slot in 0..self.matched.len() {
            let idx = self.matched[slot];
            if self.subs[idx].next() {
                self.heap.push(Reverse((self.subs[idx].value(), idx)));
            }
        }
        self.matched.clear();
    }

    /// Pops minimum groups until one meets `min_match`, advancing the ones
    /// that do not.
    fn settle(&mut self) -> DocId {
        loop {
            let Some(&Reverse((min, _))) = self.heap.peek() else {
                self.doc = doc_ids::EOF;
                return doc_ids::EOF;
            };
            while let Some(&Reverse((doc, idx))) = self.heap.peek() {
                if doc != min {
                    break;
                }
                self.heap.pop();
                self.matched.push(idx);
            }
            if self.matched.len() >= self.min_match {
                self.doc = min;
                return min;
            }
            self.advance_matched();
        }
    }
}

impl<I: DocIterator, M: ScoreMerger> DocIterator for Disjunction<I, M> {
    fn value(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> bool {
        if doc_ids::is_eof(self.doc) {
            return false;
        }
        self.advance_matched();
        !doc_ids::is_eof(self.settle())
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_ids::is_eof(self.doc) {
            return doc_ids::EOF;
        }
        if self.doc != doc_ids::INVALID && target <= self.doc {
            return self.doc;
        }
        // Move the matched set and every lagging heap entry up to target.
        for slot in 0..self.matched.len() {
            let idx = self.matched[slot];
            if !doc_ids::is_eof(self.subs[idx].seek(target)) {
                self.heap.push(Reverse((self.subs[idx].value(), idx)));
            }
        }
        self.matched.clear();
        while let Some(&Reverse((doc, idx))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            if !doc_ids::is_eof(self.subs[idx].seek(target)) {
                self.heap.push(Reverse((self.subs[idx].value(), idx)));
            }
        }
        self.settle()
    }

    fn cost(&self) -> u64 {
        self.cost
    }

    fn score(&mut self, out: &mut [f32]) {
        if !M::SCORES {
            out.fill(0.0);
            return;
        }
        let mut first = true;
        for slot in 0..self.matched.len() {
            let idx = self.matched[slot];
            self.subs[idx].score(&mut self.tmp);
            if first {
                out.copy_from_slice(&self.tmp);
                first = false;
            } else {
                M::merge(out, &self.tmp);
            }
        }
        if first {
            out.fill(0.0);
        }
    }
}
