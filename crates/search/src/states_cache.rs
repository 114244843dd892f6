use std::collections::BTreeMap;

use index::SegmentId;

/// Per-segment state of a prepared query, keyed by the reader-assigned
/// segment identity. Filled once during `prepare`; read-only afterwards, so
/// concurrent `execute` calls need no synchronization. A missing entry means
/// the segment contributes nothing and is answered with the empty iterator,
/// never with an error.
#[derive(Debug)]
pub struct StatesCache<S> {
    states: BTreeMap<SegmentId, S>,
}

impl<S> Default for StatesCache<S> {
    fn default() -> Self {
        StatesCache {
            states: BTreeMap::new(),
        }
    }
}

impl<S> StatesCache<S> {
    pub fn new() -> Self {
        StatesCache::default()
    }

    pub fn insert(&mut self, segment: SegmentId, state: S) {
        self.states.insert(segment, state);
    }

    pub fn find(&self, segment: SegmentId) -> Option<&S> {
        self.states.get(&segment)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
}
