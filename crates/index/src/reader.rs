use std::{
    any::Any,
    fmt,
    sync::Arc,
};

use crate::{
    features::IndexFeatures,
    iterator::DocIterator,
};

/// Stable identity of a segment for the lifetime of its reader. Prepared
/// queries key their per-segment state by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

/// Opaque handle that reopens the postings of one exact term without
/// re-walking the term dictionary. Cheap to clone and to store; usable for
/// any number of `postings` calls.
#[derive(Clone)]
pub struct SeekCookie(Arc<dyn Any + Send + Sync>);

impl SeekCookie {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        SeekCookie(Arc::new(inner))
    }

    pub fn from_arc<T: Any + Send + Sync>(inner: Arc<T>) -> Self {
        SeekCookie(inner)
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for SeekCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SeekCookie(..)")
    }
}

/// Field-level metadata exposed by a term reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub index_features: IndexFeatures,
}

/// Outcome of [`SeekTermIterator::seek_ceil`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekResult {
    /// Positioned on exactly the requested term.
    Found,
    /// Positioned on the smallest term greater than the requested one.
    After,
    /// No term at or after the requested one; the iterator is exhausted.
    End,
}

/// Ordered iterator over one field's term dictionary with seek support.
pub trait SeekTermIterator {
    /// Positions on the exact term; returns false if it is absent. The
    /// iterator stays usable and may be re-positioned by further seeks.
    fn seek(&mut self, term: &[u8]) -> bool;

    /// Positions on the smallest term >= `term`.
    fn seek_ceil(&mut self, term: &[u8]) -> SeekResult;

    /// Advances to the next term in dictionary order.
    fn next(&mut self) -> bool;

    /// Bytes of the current term. Only valid while positioned.
    fn term(&self) -> &[u8];

    /// Number of documents containing the current term in this segment.
    fn doc_freq(&self) -> u64;

    /// Total occurrences of the current term in this segment.
    fn total_term_freq(&self) -> u64;

    /// Re-locatable handle for the current term's postings.
    fn cookie(&self) -> SeekCookie;
}

/// Per-segment view of one field: term dictionary plus postings access.
pub trait TermReader {
    fn meta(&self) -> &FieldMeta;

    fn iterator(&self) -> Box<dyn SeekTermIterator + '_>;

    /// Opens postings for the term identified by `cookie`. Streams beyond
    /// `features ∩ indexed features` are not materialized.
    fn postings(
        &self,
        cookie: &SeekCookie,
        features: IndexFeatures,
    ) -> anyhow::Result<Box<dyn DocIterator + '_>>;

    /// Number of documents containing this field.
    fn docs_count(&self) -> u64;

    /// Total number of tokens indexed for this field.
    fn total_tokens(&self) -> u64;
}

/// One immutable shard of the index.
pub trait SegmentReader {
    fn id(&self) -> SegmentId;

    fn docs_count(&self) -> u64;

    fn field(&self, name: &str) -> Option<&dyn TermReader>;
}

/// Multi-segment read-only index view.
pub trait IndexReader {
    /// Number of segments.
    fn size(&self) -> usize;

    fn segment(&self, index: usize) -> &dyn SegmentReader;

    /// Total documents across all segments.
    fn docs_count(&self) -> u64;
}

impl<'r> dyn IndexReader + 'r {
    pub fn segments<'a>(&'a self) -> SegmentIter<'a>
    where
        'r: 'a,
    {
        SegmentIter {
            reader: self,
            next: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

pub struct SegmentIter<'a> {
    reader: &'a dyn IndexReader,
    next: usize,
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = &'a dyn SegmentReader;

    fn next(&mut self) -> Option<&'a dyn SegmentReader> {
        if self.next >= self.reader.size() {
            return None;
        }
        let segment = self.reader.segment(self.next);
        self.next += 1;
        Some(segment)
    }
}
