use index::{
    empty_iterator,
    DocIterator,
    IndexFeatures,
    IndexReader,
    SeekCookie,
};

use crate::{
    collectors::{
        FieldCollectors,
        TermCollectors,
    },
    filter::{
        ExecutionContext,
        PreparedQuery,
    },
    score::{
        Order,
        ScoredIterator,
    },
    states_cache::StatesCache,
};

pub(crate) struct TermState {
    pub cookie: SeekCookie,
}

/// Compiled single-term query.
pub(crate) struct TermQuery {
    states: StatesCache<TermState>,
    stats: Vec<u8>,
    field: String,
    boost: f32,
}

impl TermQuery {
    pub const REQUIRED_FEATURES: IndexFeatures = IndexFeatures::DOCS;

    pub fn prepare(
        index: &dyn IndexReader,
        order: &Order,
        boost: f32,
        field: &str,
        term: &[u8],
    ) -> anyhow::Result<TermQuery> {
        let mut states = StatesCache::new();
        let mut field_stats = FieldCollectors::new(order);
        let mut term_stats = TermCollectors::new(order, 1);

        for segment in index.segments() {
            let Some(reader) = segment.field(field) else {
                continue;
            };
            if !reader
                .meta()
                .index_features
                .contains(Self::REQUIRED_FEATURES)
            {
                continue;
            }
            let mut terms = reader.iterator();
            if !terms.seek(term) {
                continue;
            }
            field_stats.collect(segment, reader);
            term_stats.collect(segment, reader, 0, &*terms);
            states.insert(segment.id(), TermState {
                cookie: terms.cookie(),
            });
        }

        let mut stats = vec![0u8; order.stats_size()];
        term_stats.finish(&mut stats, 0, &field_stats, index, order);

        Ok(TermQuery {
            states,
            stats,
            field: field.to_string(),
            boost,
        })
    }
}

impl PreparedQuery for TermQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn execute<'a>(
        &'a self,
        ctx: ExecutionContext<'a>,
    ) -> anyhow::Result<Box<dyn DocIterator + 'a>> {
        let Some(state) = self.states.find(ctx.segment.id()) else {
            return Ok(empty_iterator());
        };
        let Some(reader) = ctx.segment.field(&self.field) else {
            return Ok(empty_iterator());
        };
        let features = ctx.order.features() | Self::REQUIRED_FEATURES;
        let mut postings = reader.postings(&state.cookie, features)?;
        if ctx.order.is_empty() {
            return Ok(postings);
        }
        let funcs = ctx.order.compile(
            ctx.segment,
            Some(reader),
            &self.stats,
            &mut postings,
            self.boost,
        );
        Ok(Box::new(ScoredIterator::new(postings, funcs)))
    }
}
