//! TF-IDF scorer. `idf = 1 + ln((N + 1) / (df + 1))` summed over collected
//! term rows, `tf = sqrt(freq)`, with optional document-length
//! normalization.

use std::any::Any;

use byteorder::{
    ByteOrder,
    LittleEndian,
};
use serde::Deserialize;

use index::{
    DocIterator,
    IndexFeatures,
    IndexReader,
    SeekTermIterator,
    SegmentReader,
    TermReader,
};

use crate::{
    collectors::TermCollector,
    error::QueryError,
    score::{
        PreparedScorer,
        ScoreFunction,
        ScoreInput,
        Scorer,
    },
};

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TfIdfArgs {
    pub with_norms: bool,
}

impl Default for TfIdfArgs {
    fn default() -> Self {
        TfIdfArgs { with_norms: false }
    }
}

pub fn make_json(args: Option<&str>) -> anyhow::Result<Box<dyn Scorer>> {
    let args = match args {
        None => TfIdfArgs::default(),
        Some(json) => {
            serde_json::from_str(json).map_err(|err| QueryError::InvalidScorerArgs {
                name: "tfidf".to_string(),
                message: err.to_string(),
            })?
        },
    };
    Ok(Box::new(TfIdf { args }))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TfIdf {
    pub args: TfIdfArgs,
}

impl Scorer for TfIdf {
    fn prepare(&self) -> Box<dyn PreparedScorer> {
        Box::new(PreparedTfIdf { args: self.args })
    }
}

const STATS_SIZE: usize = 4;

struct PreparedTfIdf {
    args: TfIdfArgs,
}

#[derive(Default)]
struct TfIdfTermCollector {
    docs_with_term: u64,
}

impl TermCollector for TfIdfTermCollector {
    fn collect(
        &mut self,
        _segment: &dyn SegmentReader,
        _field: &dyn TermReader,
        terms: &dyn SeekTermIterator,
    ) {
        self.docs_with_term += terms.doc_freq();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PreparedScorer for PreparedTfIdf {
    fn index_features(&self) -> IndexFeatures {
        IndexFeatures::FREQ
    }

    fn term_collector(&self) -> Option<Box<dyn TermCollector>> {
        Some(Box::<TfIdfTermCollector>::default())
    }

    fn stats_size(&self) -> usize {
        STATS_SIZE
    }

    fn finish_stats(
        &self,
        stats: &mut [u8],
        index: &dyn IndexReader,
        _field: Option<&dyn crate::collectors::FieldCollector>,
        term: Option<&dyn TermCollector>,
    ) {
        let docs_with_term = term
            .and_then(|collector| collector.as_any().downcast_ref::<TfIdfTermCollector>())
            .map(|collector| collector.docs_with_term)
            .unwrap_or(0);
        let idf =
            1.0 + ((index.docs_count() as f32 + 1.0) / (docs_with_term as f32 + 1.0)).ln();
        let total = LittleEndian::read_f32(stats) + idf;
        LittleEndian::write_f32(stats, total);
    }

    fn prepare_leaf(
        &self,
        _segment: &dyn SegmentReader,
        _field: Option<&dyn TermReader>,
        stats: &[u8],
        _attrs: &mut dyn DocIterator,
        boost: f32,
    ) -> ScoreFunction {
        let idf = if stats.len() >= STATS_SIZE {
            LittleEndian::read_f32(stats)
        } else {
            0.0
        };
        let with_norms = self.args.with_norms;
        ScoreFunction::Leaf(Box::new(move |input: &ScoreInput| {
            let tf = (input.freq as f32).sqrt();
            let norm = if with_norms && input.norm > 0 {
                (input.norm as f32).sqrt().recip()
            } else {
                1.0
            };
            boost * idf * tf * norm
        }))
    }
}
