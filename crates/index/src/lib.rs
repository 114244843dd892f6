//! Data model and posting-source contracts for the query-evaluation core.
//!
//! This crate defines what an index *looks like* to a query: document and
//! position primitives with their sentinels, the feature bitset a field
//! advertises, the reader traits a posting source implements, and the
//! [`DocIterator`] model every query execution produces. It also ships a
//! reference [`memory::MemoryIndex`] implementing the reader traits, which
//! the search crate's tests (and embedders without a durable format) build
//! against.
//!
//! Durable segment formats, analyzers, and index writers are deliberately
//! out of scope; they sit behind [`reader::IndexReader`].

mod doc;
mod features;
mod iterator;
pub mod memory;
mod reader;

pub use doc::{
    doc_ids,
    positions,
    DocId,
    Pos,
};
pub use features::IndexFeatures;
pub use iterator::{
    empty_iterator,
    Attribute,
    DocIterator,
    DocIteratorExt,
    EmptyIterator,
    FilterBoost,
    Frequency,
    Norm,
    Offsets,
    Payload,
    PositionIterator,
};
pub use reader::{
    FieldMeta,
    IndexReader,
    SeekCookie,
    SeekResult,
    SeekTermIterator,
    SegmentId,
    SegmentIter,
    SegmentReader,
    TermReader,
};
