use index::{
    doc_ids,
    DocId,
    DocIterator,
    IndexReader,
};

use crate::{
    filter::{
        ExecutionContext,
        PreparedQuery,
    },
    score::{
        Order,
        ScoredIterator,
    },
};

/// Iterator over every document of a segment.
pub(crate) struct AllIterator {
    doc: DocId,
    last: DocId,
}

impl AllIterator {
    pub fn new(docs_count: u64) -> Self {
        // Dense ids starting at MIN; an empty segment yields nothing.
        let last = if docs_count == 0 {
            doc_ids::INVALID
        } else {
            doc_ids::MIN + (docs_count - 1) as DocId
        };
        AllIterator {
            doc: doc_ids::INVALID,
            last,
        }
    }
}

impl DocIterator for AllIterator {
    fn value(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> bool {
        if doc_ids::is_eof(self.doc) {
            return false;
        }
        if self.doc >= self.last {
            self.doc = doc_ids::EOF;
            return false;
        }
        self.doc = if self.doc == doc_ids::INVALID {
            doc_ids::MIN
        } else {
            self.doc + 1
        };
        true
    }

    fn seek(&mut self, target: DocId) -> DocId {
        if doc_ids::is_eof(self.doc) {
            return doc_ids::EOF;
        }
        if self.doc != doc_ids::INVALID && target <= self.doc {
            return self.doc;
        }
        if target > self.last {
            self.doc = doc_ids::EOF;
        } else {
            self.doc = target.max(doc_ids::MIN);
        }
        self.doc
    }

    fn cost(&self) -> u64 {
        if self.last == doc_ids::INVALID {
            0
        } else {
            (self.last - doc_ids::MIN + 1) as u64
        }
    }
}

/// Compiled match-all query. Carries finished (empty-collector) stats so
/// scorers still produce well-defined components.
pub(crate) struct AllQuery {
    stats: Vec<u8>,
    boost: f32,
}

impl AllQuery {
    pub fn prepare(_index: &dyn IndexReader, order: &Order, boost: f32) -> AllQuery {
        AllQuery {
            stats: vec![0u8; order.stats_size()],
            boost,
        }
    }
}

impl PreparedQuery for AllQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn execute<'a>(
        &'a self,
        ctx: ExecutionContext<'a>,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>> {
        let mut all = AllIterator::new(ctx.segment.docs_count());
        if ctx.order.is_empty() {
            return Ok(Box::new(all));
        }
        let funcs = ctx
            .order
            .compile(ctx.segment, None, &self.stats, &mut all, self.boost);
        Ok(Box::new(ScoredIterator::new(all, funcs)))
    }
}

#[cfg(test)]
mod tests {
    use index::DocIteratorExt;

    use super::*;

    #[test]
    fn walks_every_doc() {
        let mut it = AllIterator::new(4);
        assert_eq!(it.cost(), 4);
        assert_eq!(it.collect_docs(), vec![1, 2, 3, 4]);
        assert!(!it.next());
    }

    #[test]
    fn empty_segment_has_nothing() {
        let mut it = AllIterator::new(0);
        assert_eq!(it.cost(), 0);
        assert!(!it.next());
        assert_eq!(it.seek(doc_ids::MIN), doc_ids::EOF);
    }

    #[test]
    fn seek_clamps_and_noops() {
        let mut it = AllIterator::new(10);
        assert_eq!(it.seek(doc_ids::INVALID), doc_ids::MIN);
        assert_eq!(it.seek(7), 7);
        assert_eq!(it.seek(3), 7);
        assert_eq!(it.seek(11), doc_ids::EOF);
    }
}
