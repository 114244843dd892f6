//! Okapi BM25 scorer.
//!
//! Collects document frequency per term row plus field-level token totals,
//! and finishes them into `(idf, avgdl)`. The leaf function is the usual
//! saturating tf with length normalization against the average field
//! length.

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
    collectors::{
        FieldCollector,
        TermCollector,
    },
    error::QueryError,
    score::{
        PreparedScorer,
        ScoreFunction,
        ScoreInput,
        Scorer,
    },
};

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bm25Args {
    /// Term-frequency saturation.
    pub k: f32,
    /// Document-length normalization strength.
    pub b: f32,
}

impl Default for Bm25Args {
    fn default() -> Self {
        Bm25Args { k: 1.2, b: 0.75 }
    }
}

pub fn make_json(args: Option<&str>) -> anyhow::Result<Box<dyn Scorer>> {
    let args = match args {
        None => Bm25Args::default(),
        Some(json) => {
            serde_json::from_str(json).map_err(|err| QueryError::InvalidScorerArgs {
                name: "bm25".to_string(),
                message: err.to_string(),
            })?
        },
    };
    Ok(Box::new(Bm25 { args }))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Bm25 {
    pub args: Bm25Args,
}

impl Scorer for Bm25 {
    fn prepare(&self) -> Box<dyn PreparedScorer> {
        Box::new(PreparedBm25 { args: self.args })
    }
}

// [idf: f32][avgdl: f32]
const STATS_SIZE: usize = 8;

struct PreparedBm25 {
    args: Bm25Args,
}

#[derive(Default)]
struct Bm25FieldCollector {
    docs_with_field: u64,
    total_tokens: u64,
}

impl FieldCollector for Bm25FieldCollector {
    fn collect(&mut self, _segment: &dyn SegmentReader, field: &dyn TermReader) {
        self.docs_with_field += field.docs_count();
        self.total_tokens += field.total_tokens();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Bm25TermCollector {
    docs_with_term: u64,
}

impl TermCollector for Bm25TermCollector {
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

impl PreparedScorer for PreparedBm25 {
    fn index_features(&self) -> IndexFeatures {
        IndexFeatures::FREQ
    }

    fn field_collector(&self) -> Option<Box<dyn FieldCollector>> {
        Some(Box::<Bm25FieldCollector>::default())
    }

    fn term_collector(&self) -> Option<Box<dyn TermCollector>> {
        Some(Box::<Bm25TermCollector>::default())
    }

    fn stats_size(&self) -> usize {
        STATS_SIZE
    }

    fn finish_stats(
        &self,
        stats: &mut [u8],
        index: &dyn IndexReader,
        field: Option<&dyn FieldCollector>,
        term: Option<&dyn TermCollector>,
    ) {
        let docs_with_term = term
            .and_then(|collector| collector.as_any().downcast_ref::<Bm25TermCollector>())
            .map(|collector| collector.docs_with_term)
            .unwrap_or(0);

        // Guard against querying snapshots from which everything vanished;
        // an N of zero would make the idf meaningless.
        let total_docs = index.docs_count().max(1) as f32;
        let df = docs_with_term as f32;
        let idf = (1.0 + (total_docs - df + 0.5) / (df + 0.5)).ln();
        let total = LittleEndian::read_f32(&stats[..4]) + idf;
        LittleEndian::write_f32(&mut stats[..4], total);

        // Field stats are identical for every term row of the filter, so
        // rewriting the average is idempotent.
        if let Some(field) = field.and_then(|c| c.as_any().downcast_ref::<Bm25FieldCollector>()) {
            let avgdl = if field.docs_with_field == 0 {
                0.0
            } else {
                field.total_tokens as f32 / field.docs_with_field as f32
            };
            LittleEndian::write_f32(&mut stats[4..8], avgdl);
        }
    }

    fn prepare_leaf(
        &self,
        _segment: &dyn SegmentReader,
        _field: Option<&dyn TermReader>,
        stats: &[u8],
        _attrs: &mut dyn DocIterator,
        boost: f32,
    ) -> ScoreFunction {
        let (idf, avgdl) = if stats.len() >= STATS_SIZE {
            (
                LittleEndian::read_f32(&stats[..4]),
                LittleEndian::read_f32(&stats[4..8]),
            )
        } else {
            (0.0, 0.0)
        };
        let Bm25Args { k, b } = self.args;
        ScoreFunction::Leaf(Box::new(move |input: &ScoreInput| {
            let freq = input.freq as f32;
            let length_ratio = if avgdl > 0.0 {
                input.norm as f32 / avgdl
            } else {
                1.0
            };
            let norm = k * (1.0 - b + b * length_ratio);
            boost * idf * (freq * (k + 1.0)) / (freq + norm)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::NO_BOOST;

    #[test]
    fn args_default_and_parse() {
        assert!(make_json(None).is_ok());
        assert!(make_json(Some(r#"{"k": 0.9, "b": 0.4}"#)).is_ok());
        let err = make_json(Some(r#"{"k1": 0.9}"#)).unwrap_err();
        assert!(crate::error::is_config_error(&err));
    }

    fn leaf_with(idf: f32, avgdl: f32, args: Bm25Args) -> ScoreFunction {
        let prepared = Bm25 { args }.prepare();
        let mut stats = vec![0u8; STATS_SIZE];
        LittleEndian::write_f32(&mut stats[..4], idf);
        LittleEndian::write_f32(&mut stats[4..8], avgdl);
        let mut attrs = index::EmptyIterator;
        prepared.prepare_leaf(
            &crate::test_support::DummySegment,
            None,
            &stats,
            &mut attrs,
            NO_BOOST,
        )
    }

    fn input(freq: u32, norm: u32) -> ScoreInput {
        ScoreInput {
            doc: 1,
            freq,
            norm,
            filter_boost: NO_BOOST,
        }
    }

    #[test]
    fn term_frequency_saturates() {
        let func = leaf_with(2.0, 10.0, Bm25Args::default());
        let one = func.evaluate(&input(1, 10));
        let two = func.evaluate(&input(2, 10));
        let ten = func.evaluate(&input(10, 10));
        assert!(one < two && two < ten);
        // Diminishing returns.
        assert!(two - one > ten / 10.0 - one / 10.0);
        // Bounded by idf * (k + 1).
        assert!(ten < 2.0 * (1.2 + 1.0));
    }

    #[test]
    fn longer_documents_score_lower() {
        let func = leaf_with(2.0, 10.0, Bm25Args::default());
        let short = func.evaluate(&input(2, 5));
        let long = func.evaluate(&input(2, 50));
        assert!(short > long);
    }

    #[test]
    fn b_zero_disables_length_normalization() {
        let func = leaf_with(2.0, 10.0, Bm25Args { k: 1.2, b: 0.0 });
        assert_eq!(func.evaluate(&input(2, 5)), func.evaluate(&input(2, 500)));
    }

    #[test]
    fn finish_accumulates_idf_and_sets_avgdl() {
        let prepared = Bm25::default().prepare();
        let index = crate::test_support::tiny_index();
        let mut stats = vec![0u8; STATS_SIZE];

        let term = Bm25TermCollector { docs_with_term: 1 };
        let field = Bm25FieldCollector {
            docs_with_field: 4,
            total_tokens: 12,
        };
        prepared.finish_stats(&mut stats, &index, Some(&field), Some(&term));
        let idf_once = LittleEndian::read_f32(&stats[..4]);
        assert!(idf_once > 0.0);
        assert!((LittleEndian::read_f32(&stats[4..8]) - 3.0).abs() < 1e-6);

        prepared.finish_stats(&mut stats, &index, Some(&field), Some(&term));
        let idf_twice = LittleEndian::read_f32(&stats[..4]);
        assert!((idf_twice - 2.0 * idf_once).abs() < 1e-5);
        assert!((LittleEndian::read_f32(&stats[4..8]) - 3.0).abs() < 1e-6);
    }
}
