//! Query-evaluation core over a multi-segment inverted index.
//!
//! A declarative [`Filter`] tree compiles against an
//! [`index::IndexReader`] in two phases. `prepare` makes a single pass
//! over all segments, resolving terms to re-locatable posting handles and
//! feeding the statistics collectors of the prepared scorers; the
//! resulting [`PreparedFilter`] owns per-segment state plus the finished
//! stats blob and borrows nothing from the filter tree. `execute` then
//! opens a lazily scored document iterator per segment.
//!
//! Iterators compose: conjunction (cost-sorted, lead-driven),
//! heap-based disjunction with an optional min-match threshold, positional
//! phrase matching with fixed and variadic slots, and a same-position
//! conjunction that also aligns token positions. Score components merge
//! through monomorphized aggregators, so the hot loops carry no virtual
//! dispatch.
//!
//! Scorers live in a process-global registry; `boost_sort`, `tfidf`, and
//! `bm25` are built in. An [`Order`] is an ordered list of prepared
//! scorers, and every document iterator emits one score component per
//! entry.

mod all_query;
mod bm25;
mod boost_sort;
mod collectors;
mod conjunction;
mod disjunction;
mod error;
mod filter;
mod levenshtein_dfa;
mod multiterm_query;
mod phrase_filter;
mod phrase_query;
mod same_position;
mod score;
pub mod scorers;
mod states_cache;
mod term_query;
mod tfidf;
mod wildcard;

pub use bm25::{
    Bm25,
    Bm25Args,
};
pub use boost_sort::BoostSort;
pub use collectors::{
    FieldCollector,
    TermCollector,
};
pub use error::{
    is_config_error,
    QueryError,
};
pub use filter::{
    AllFilter,
    BoostFilter,
    EditDistanceFilter,
    EmptyFilter,
    ExecutionContext,
    Filter,
    PhraseFilter,
    PhrasePart,
    PrefixFilter,
    PreparedFilter,
    RangeFilter,
    SamePositionFilter,
    TermFilter,
    TermsFilter,
    WildcardFilter,
};
pub use levenshtein_dfa::MAX_DISTANCE;
pub use multiterm_query::BytesRange;
pub use score::{
    LeafScorer,
    MergeType,
    Order,
    PreparedScorer,
    ScoreFunction,
    ScoreInput,
    Scorer,
    ScorerSpec,
    NO_BOOST,
};
pub use tfidf::{
    TfIdf,
    TfIdfArgs,
};

#[cfg(test)]
pub(crate) mod test_support {
    use index::{
        doc_ids,
        memory::{
            MemoryIndex,
            MemoryIndexBuilder,
        },
        DocId,
        DocIterator,
        SegmentId,
        SegmentReader,
        TermReader,
    };

    /// Plain ascending iterator over a fixed id list.
    pub struct VecIterator {
        docs: Vec<DocId>,
        idx: usize,
        doc: DocId,
    }

    impl VecIterator {
        pub fn new(docs: Vec<DocId>) -> Self {
            VecIterator {
                docs,
                idx: 0,
                doc: doc_ids::INVALID,
            }
        }
    }

    impl DocIterator for VecIterator {
        fn value(&self) -> DocId {
            self.doc
        }

        fn next(&mut self) -> bool {
            if doc_ids::is_eof(self.doc) {
                return false;
            }
            let next_idx = if self.doc == doc_ids::INVALID {
                0
            } else {
                self.idx + 1
            };
            if next_idx >= self.docs.len() {
                self.doc = doc_ids::EOF;
                return false;
            }
            self.idx = next_idx;
            self.doc = self.docs[next_idx];
            true
        }

        fn seek(&mut self, target: DocId) -> DocId {
            if doc_ids::is_eof(self.doc) {
                return doc_ids::EOF;
            }
            if self.doc != doc_ids::INVALID && target <= self.doc {
                return self.doc;
            }
            let from = if self.doc == doc_ids::INVALID {
                0
            } else {
                self.idx + 1
            };
            match self.docs[from..].iter().position(|&doc| doc >= target) {
                Some(offset) => {
                    self.idx = from + offset;
                    self.doc = self.docs[self.idx];
                    self.doc
                },
                None => {
                    self.doc = doc_ids::EOF;
                    doc_ids::EOF
                },
            }
        }

        fn cost(&self) -> u64 {
            self.docs.len() as u64
        }
    }

    /// Four tiny documents on one segment; enough corpus for stats math.
    pub fn tiny_index() -> MemoryIndex {
        let mut builder = MemoryIndexBuilder::new();
        let segment = builder.segment();
        segment.add_document([("body", "quick brown fox")]);
        segment.add_document([("body", "lazy dog")]);
        segment.add_document([("body", "quick dog")]);
        segment.add_document([("body", "slow fox")]);
        builder.build()
    }

    pub struct DummySegment;

    impl SegmentReader for DummySegment {
        fn id(&self) -> SegmentId {
            SegmentId(u64::MAX)
        }

        fn docs_count(&self) -> u64 {
            0
        }

        fn field(&self, _name: &str) -> Option<&dyn TermReader> {
            None
        }
    }
}
