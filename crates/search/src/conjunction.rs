use std::marker::PhantomData;

use index::{
    doc_ids,
    DocId,
    DocIterator,
};

use crate::score::ScoreMerger;

/// Intersection of sub-iterators on document id.
///
/// Sub-iterators are kept sorted by ascending cost; the cheapest one leads
/// and the others are seeked to it, restarting whenever a seek overshoots.
/// Positional operators wrap this and run their per-document verification
/// after each match.
pub struct Conjunction<I, M> {
    // itrs[0] is the lead.
    itrs: Vec<I>,
    tmp: Vec<f32>,
    _merger: PhantomData<M>,
}

impl<I: DocIterator, M: ScoreMerger> Conjunction<I, M> {
    /// `components` is the number of score components per document (the
    /// order's length).
    pub fn new(mut itrs: Vec<I>, components: usize) -> Self {
        assert!(!itrs.is_empty(), "conjunction over no iterators");
        itrs.sort_by_key(|it| it.cost());
        Conjunction {
            itrs,
            tmp: vec![0.0; components],
            _merger: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.itrs.len()
    }

    pub fn sub_mut(&mut self, idx: usize) -> &mut I {
        &mut self.itrs[idx]
    }

    pub fn subs_mut(&mut self) -> &mut [I] {
        &mut self.itrs
    }

    /// Aligns all sub-iterators on the lead's current document, advancing
    /// the lead past documents any sub-iterator skips. Returns the agreed
    /// document or EOF.
    fn align(&mut self) -> DocId {
        let mut target = self.itrs[0].value();
        'outer: loop {
            for idx in 1..self.itrs.len() {
                let doc = self.itrs[idx].seek(target);
                if doc > target {
                    target = self.itrs[0].seek(doc);
                    if doc_ids::is_eof(target) {
                        return doc_ids::EOF;
                    }
                    continue 'outer;
                }
            }
            return target;
        }
    }
}

impl<I: DocIterator, M: ScoreMerger> DocIterator for Conjunction<I, M> {
    fn value(&self) -> DocId {
        self.itrs[0].value()
    }

    fn next(&mut self) -> bool {
        if !self.itrs[0].next() {
            return false;
        }
        !doc_ids::is_eof(self.align())
    }

    fn seek(&mut self, target: DocId) -> DocId {
        let lead = self.itrs[0].seek(target);
        if doc_ids::is_eof(lead) {
            return doc_ids::EOF;
        }
        self.align()
    }

    fn cost(&self) -> u64 {
        self.itrs[0].cost()
    }

    fn score(&mut self, out: &mut [f32]) {
        if !M::SCORES {
            out.fill(0.0);
            return;
        }
        let mut first = true;
        for it in &mut self.itrs {
            it.score(&mut self.tmp);
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

#[cfg(test)]
mod tests {
    use index::DocIteratorExt;

    use super::*;
    use crate::{
        score::{
            NoopMerger,
            SumMerger,
        },
        test_support::VecIterator,
    };

    fn conj(sets: &[&[DocId]]) -> Conjunction<VecIterator, NoopMerger> {
        Conjunction::new(
            sets.iter().map(|docs| VecIterator::new(docs.to_vec())).collect(),
            0,
        )
    }

    #[test]
    fn intersects_ascending() {
        let mut it = conj(&[&[1, 3, 5, 7, 9], &[3, 4, 5, 9], &[1, 3, 9, 11]]);
        assert_eq!(it.collect_docs(), vec![3, 9]);
        assert!(!it.next());
        assert_eq!(it.value(), doc_ids::EOF);
    }

    #[test]
    fn lead_is_cheapest() {
        let it = conj(&[&[1, 2, 3, 4, 5, 6], &[2, 4]]);
        assert_eq!(it.cost(), 2);
    }

    #[test]
    fn seek_contract() {
        let mut it = conj(&[&[1, 3, 5, 7], &[3, 5, 7]]);
        assert_eq!(it.seek(4), 5);
        // Backward seek is a no-op.
        assert_eq!(it.seek(1), 5);
        assert_eq!(it.seek(doc_ids::EOF), doc_ids::EOF);
        assert_eq!(it.seek(2), doc_ids::EOF);
    }

    #[test]
    fn conjunction_of_identical_sets_is_identity() {
        let docs: &[DocId] = &[2, 4, 8, 16];
        let mut it = conj(&[docs, docs, docs]);
        assert_eq!(it.collect_docs(), docs.to_vec());
    }

    #[test]
    fn disjoint_sets_are_empty() {
        let mut it = conj(&[&[1, 3, 5], &[2, 4, 6]]);
        assert!(!it.next());
    }

    #[test]
    fn scores_merge_over_subs() {
        use crate::score::{
            ScoreFunction,
            ScoredIterator,
        };

        let subs = vec![
            ScoredIterator::new(
                VecIterator::new(vec![1, 2]),
                vec![ScoreFunction::Constant(2.0)],
            ),
            ScoredIterator::new(
                VecIterator::new(vec![1, 2]),
                vec![ScoreFunction::Constant(3.0)],
            ),
        ];
        let mut it: Conjunction<_, SumMerger> = Conjunction::new(subs, 1);
        assert!(it.next());
        let mut out = [0.0];
        it.score(&mut out);
        assert_eq!(out, [5.0]);
    }
}
