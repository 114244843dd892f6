use std::{
    any::{
        Any,
        TypeId,
    },
    sync::Arc,
};

use crate::{
    doc::{
        doc_ids,
        positions,
        DocId,
        Pos,
    },
    features::IndexFeatures,
    iterator::{
        DocIterator,
        Frequency,
        Norm,
        PositionIterator,
    },
};

/// Fully decoded postings of one term: per-document entries plus one flat
/// position array sliced per document.
#[derive(Debug, Default)]
pub struct PostingList {
    pub docs: Vec<PostingEntry>,
    pub positions: Vec<Pos>,
    pub total_term_freq: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct PostingEntry {
    pub doc: DocId,
    pub freq: u32,
    pub pos_start: u32,
    pub pos_end: u32,
}

/// Cursor over the position slice of the current document.
struct PositionCursor {
    list: Arc<PostingList>,
    cur: usize,
    end: usize,
    value: Pos,
}

impl PositionCursor {
    fn new(list: Arc<PostingList>) -> Self {
        PositionCursor {
            list,
            cur: 0,
            end: 0,
            value: positions::INVALID,
        }
    }

    fn reset(&mut self, start: u32, end: u32) {
        self.cur = start as usize;
        self.end = end as usize;
        self.value = positions::INVALID;
    }
}

impl PositionIterator for PositionCursor {
    fn value(&self) -> Pos {
        self.value
    }

    fn next(&mut self) -> Pos {
        if self.cur >= self.end {
            self.value = positions::EOF;
        } else {
            self.value = self.list.positions[self.cur];
            self.cur += 1;
        }
        self.value
    }

    fn seek(&mut self, target: Pos) -> Pos {
        if positions::is_eof(self.value) {
            return positions::EOF;
        }
        if self.value != positions::INVALID && self.value >= target {
            return self.value;
        }
        let remaining = &self.list.positions[self.cur..self.end];
        self.cur += remaining.partition_point(|&pos| pos < target);
        self.next()
    }
}

/// Posting iterator over one in-memory [`PostingList`].
pub struct MemoryPostings {
    list: Arc<PostingList>,
    norms: Option<Arc<Vec<u32>>>,
    idx: usize,
    doc: DocId,
    freq: Frequency,
    norm: Norm,
    pos: Option<PositionCursor>,
    with_freq: bool,
}

impl MemoryPostings {
    pub(crate) fn new(
        list: Arc<PostingList>,
        norms: Option<Arc<Vec<u32>>>,
        features: IndexFeatures,
    ) -> Self {
        let with_pos = features.contains(IndexFeatures::POS);
        MemoryPostings {
            pos: with_pos.then(|| PositionCursor::new(Arc::clone(&list))),
            list,
            norms,
            idx: 0,
            doc: doc_ids::INVALID,
            freq: Frequency::default(),
            norm: Norm::default(),
            with_freq: features.contains(IndexFeatures::FREQ),
        }
    }

    fn load(&mut self, idx: usize) -> DocId {
        let entry = self.list.docs[idx];
        self.idx = idx;
        self.doc = entry.doc;
        self.freq.0 = entry.freq;
        if let Some(norms) = &self.norms {
            self.norm.0 = norms
                .get((entry.doc - doc_ids::MIN) as usize)
                .copied()
                .unwrap_or(0);
        }
        if let Some(pos) = &mut self.pos {
            pos.reset(entry.pos_start, entry.pos_end);
        }
        self.doc
    }
}

impl DocIterator for MemoryPostings {
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
        if next_idx >= self.list.docs.len() {
            self.doc = doc_ids::EOF;
            return false;
        }
        self.load(next_idx);
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
        let offset = self.list.docs[from..].partition_point(|entry| entry.doc < target);
        let idx = from + offset;
        if idx >= self.list.docs.len() {
            self.doc = doc_ids::EOF;
            return doc_ids::EOF;
        }
        self.load(idx)
    }

    fn cost(&self) -> u64 {
        self.list.docs.len() as u64
    }

    fn attribute_mut(&mut self, id: TypeId) -> Option<&mut dyn Any> {
        if id == TypeId::of::<Frequency>() && self.with_freq {
            Some(&mut self.freq)
        } else if id == TypeId::of::<Norm>() && self.norms.is_some() {
            Some(&mut self.norm)
        } else {
            None
        }
    }

    fn positions_mut(&mut self) -> Option<&mut dyn PositionIterator> {
        self.pos
            .as_mut()
            .map(|cursor| cursor as &mut dyn PositionIterator)
    }
}
