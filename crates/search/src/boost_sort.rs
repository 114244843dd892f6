//! Scorer whose only signal is the query boost: each hit scores the
//! prepared boost times whatever dynamic `FilterBoost` the iterator
//! surfaces. Useful to rank by filter structure alone.

use index::{
    DocIterator,
    SegmentReader,
    TermReader,
};

use crate::score::{
    PreparedScorer,
    ScoreFunction,
    Scorer,
};

pub fn make_json(_args: Option<&str>) -> anyhow::Result<Box<dyn Scorer>> {
    Ok(Box::new(BoostSort))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoostSort;

impl Scorer for BoostSort {
    fn prepare(&self) -> Box<dyn PreparedScorer> {
        Box::new(PreparedBoostSort)
    }
}

struct PreparedBoostSort;

impl PreparedScorer for PreparedBoostSort {
    // No features, no collectors, no stats: the constant fast path covers
    // everything. A present FilterBoost attribute multiplies in at
    // evaluation time, which is the volatile path.
    fn prepare_leaf(
        &self,
        _segment: &dyn SegmentReader,
        _field: Option<&dyn TermReader>,
        _stats: &[u8],
        _attrs: &mut dyn DocIterator,
        boost: f32,
    ) -> ScoreFunction {
        ScoreFunction::Constant(boost)
    }
}
