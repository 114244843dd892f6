//! Phrase preparation: walks every segment collecting one posting handle
//! per slot (fixed) or per accepted term per slot (variadic), together with
//! the statistics scorers asked for.

use std::collections::BTreeMap;

use itertools::Itertools;

use index::{
    IndexReader,
    SeekCookie,
    SeekTermIterator,
    SegmentReader,
    TermReader,
};

use crate::{
    collectors::{
        FieldCollectors,
        TermCollectors,
    },
    error::QueryError,
    filter::{
        prepare_part,
        PhrasePart,
        PreparedQuery,
    },
    levenshtein_dfa,
    multiterm_query::{
        visit_all_terms,
        visit_edit_distance,
        visit_prefix,
        visit_range,
        visit_term,
        visit_wildcard,
        FilterVisitor,
    },
    phrase_query::{
        FixedPhraseQuery,
        FixedPhraseState,
        VariadicPhraseQuery,
        VariadicPhraseState,
        PHRASE_FEATURES,
    },
    score::{
        Order,
        NO_BOOST,
    },
    states_cache::StatesCache,
    wildcard::{
        self,
        WildcardKind,
    },
};

/// Collects `(cookie, boost)` pairs plus term statistics while a slot's
/// accepted terms are visited. `term_offset` restarts where the caller
/// says: per segment for fixed phrases, per slot for variadic ones.
struct PhraseTermVisitor<'a, 'b> {
    segment: &'a dyn SegmentReader,
    reader: &'a dyn TermReader,
    order: &'b Order,
    stats: &'b mut TermCollectors,
    terms: &'b mut Vec<(SeekCookie, f32)>,
    term_offset: usize,
    grow_rows: bool,
    volatile_boost: bool,
}

impl FilterVisitor for PhraseTermVisitor<'_, '_> {
    fn prepare(&mut self) {}

    fn visit(&mut self, terms: &dyn SeekTermIterator, boost: f32) {
        let boost = boost.max(0.0);
        if self.grow_rows && self.stats.size() <= self.term_offset {
            self.stats.push(self.order);
        }
        if self.term_offset < self.stats.size() {
            self.stats
                .collect(self.segment, self.reader, self.term_offset, terms);
        }
        self.terms.push((terms.cookie(), boost));
        self.volatile_boost |= boost != NO_BOOST;
        self.term_offset += 1;
    }
}

/// Relative slot offsets against the first slot, in slot order.
fn relative_positions(slots: &BTreeMap<u32, PhrasePart>) -> Vec<u32> {
    let base = *slots.keys().next().expect("non-empty phrase");
    slots.keys().map(|offset| offset - base).collect()
}

pub(crate) fn prepare_phrase(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    slots: &BTreeMap<u32, PhrasePart>,
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    // Variadic expansion for enumerated term sets is not supported; fail
    // loudly instead of dropping the slot.
    for (offset, part) in slots {
        if matches!(part, PhrasePart::Terms { .. }) {
            return Err(QueryError::UnsupportedPhraseSlot {
                offset: *offset,
                kind: "terms",
            }
            .into());
        }
    }

    // A one-slot phrase is the underlying filter; the wrapper adds nothing.
    if slots.len() == 1 {
        let part = slots.values().next().expect("one slot");
        return prepare_part(index, order, boost, field, part);
    }

    let fixed = slots
        .values()
        .all(|part| matches!(part, PhrasePart::Term { .. }));
    if fixed {
        fixed_prepare_collect(index, order, boost, field, slots)
    } else {
        variadic_prepare_collect(index, order, boost, field, slots)
    }
}

fn fixed_prepare_collect(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    slots: &BTreeMap<u32, PhrasePart>,
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    let phrase_size = slots.len();
    let mut states = StatesCache::new();
    let mut field_stats = FieldCollectors::new(order);
    let mut term_stats = TermCollectors::new(order, phrase_size);

    for segment in index.segments() {
        let Some(reader) = segment.field(field) else {
            continue;
        };
        if !reader.meta().index_features.contains(PHRASE_FEATURES) {
            continue;
        }

        let mut phrase_terms = Vec::with_capacity(phrase_size);
        let mut visitor = PhraseTermVisitor {
            segment,
            reader,
            order,
            stats: &mut term_stats,
            terms: &mut phrase_terms,
            term_offset: 0,
            grow_rows: false,
            volatile_boost: false,
        };
        for part in slots.values() {
            let PhrasePart::Term { term } = part else {
                unreachable!("fixed phrase has only literal slots");
            };
            let before = visitor.terms.len();
            visit_term(reader, term, &mut visitor);
            if visitor.terms.len() == before && order.is_empty() {
                // Nothing to collect without scorers; the segment is out.
                break;
            }
        }

        if !phrase_terms.is_empty() {
            field_stats.collect(segment, reader);
        }
        if phrase_terms.len() != phrase_size {
            continue;
        }
        states.insert(segment.id(), FixedPhraseState {
            terms: phrase_terms,
        });
    }

    let mut stats = vec![0u8; order.stats_size()];
    for row in 0..phrase_size {
        term_stats.finish(&mut stats, row, &field_stats, index, order);
    }

    Ok(Box::new(FixedPhraseQuery {
        states,
        positions: relative_positions(slots),
        stats,
        field: field.to_string(),
        boost,
    }))
}

/// Per-slot term enumeration, compiled once from the options and reused
/// for every segment.
enum SlotMatcher {
    Term(Vec<u8>),
    Prefix(Vec<u8>),
    AllTerms,
    Wildcard {
        prefix: Vec<u8>,
        tokens: Vec<wildcard::Token>,
    },
    Dfa(levenshtein_automata::DFA),
    Range(crate::multiterm_query::BytesRange),
}

fn compile_slot(part: &PhrasePart) -> anyhow::Result<SlotMatcher> {
    Ok(match part {
        PhrasePart::Term { term } => SlotMatcher::Term(term.clone()),
        PhrasePart::Prefix { term } => SlotMatcher::Prefix(term.clone()),
        PhrasePart::Wildcard { pattern } => match wildcard::classify(pattern) {
            WildcardKind::MatchAll => SlotMatcher::AllTerms,
            WildcardKind::Term(term) => SlotMatcher::Term(term),
            WildcardKind::Prefix(prefix) => SlotMatcher::Prefix(prefix),
            WildcardKind::Pattern { prefix } => SlotMatcher::Wildcard {
                prefix,
                tokens: wildcard::compile(pattern),
            },
        },
        PhrasePart::EditDistance {
            term,
            max_distance,
            transpositions,
            prefix,
        } => {
            let term = std::str::from_utf8(term).map_err(|_| {
                QueryError::InvalidOptions("edit-distance term is not valid utf-8".to_string())
            })?;
            SlotMatcher::Dfa(levenshtein_dfa::build_dfa(
                term,
                *max_distance,
                *transpositions,
                *prefix,
            ))
        },
        PhrasePart::Range { range } => SlotMatcher::Range(range.clone()),
        PhrasePart::Terms { .. } => {
            unreachable!("terms slots rejected before collection")
        },
    })
}

fn visit_slot(matcher: &SlotMatcher, reader: &dyn TermReader, visitor: &mut dyn FilterVisitor) {
    match matcher {
        SlotMatcher::Term(term) => visit_term(reader, term, visitor),
        SlotMatcher::Prefix(prefix) => visit_prefix(reader, prefix, visitor),
        SlotMatcher::AllTerms => visit_all_terms(reader, visitor),
        SlotMatcher::Wildcard { prefix, tokens } => {
            visit_wildcard(reader, prefix, tokens, visitor)
        },
        SlotMatcher::Dfa(dfa) => visit_edit_distance(reader, dfa, visitor),
        SlotMatcher::Range(range) => visit_range(reader, range, visitor),
    }
}

fn variadic_prepare_collect(
    index: &dyn IndexReader,
    order: &Order,
    boost: f32,
    field: &str,
    slots: &BTreeMap<u32, PhrasePart>,
) -> anyhow::Result<Box<dyn PreparedQuery>> {
    let phrase_size = slots.len();
    let mut states = StatesCache::new();
    let mut field_stats = FieldCollectors::new(order);
    let mut part_stats: Vec<TermCollectors> = (0..phrase_size)
        .map(|_| TermCollectors::new(order, 0))
        .collect();
    let matchers: Vec<SlotMatcher> = slots.values().map(compile_slot).try_collect()?;

    for segment in index.segments() {
        let Some(reader) = segment.field(field) else {
            continue;
        };
        if !reader.meta().index_features.contains(PHRASE_FEATURES) {
            continue;
        }

        let mut phrase_terms = Vec::with_capacity(phrase_size);
        let mut num_terms = vec![0usize; phrase_size];
        let mut found_parts = 0usize;
        let mut volatile_boost = false;

        for (slot_idx, matcher) in matchers.iter().enumerate() {
            let before = phrase_terms.len();
            let mut visitor = PhraseTermVisitor {
                segment,
                reader,
                order,
                stats: &mut part_stats[slot_idx],
                terms: &mut phrase_terms,
                term_offset: 0,
                grow_rows: true,
                volatile_boost: false,
            };
            visit_slot(matcher, reader, &mut visitor);
            volatile_boost |= visitor.volatile_boost;
            let accepted = phrase_terms.len() - before;
            num_terms[slot_idx] = accepted;
            if accepted > 0 {
                found_parts += 1;
            } else if order.is_empty() {
                break;
            }
        }

        if !phrase_terms.is_empty() {
            field_stats.collect(segment, reader);
        }
        if found_parts != phrase_size {
            continue;
        }
        states.insert(segment.id(), VariadicPhraseState {
            terms: phrase_terms,
            num_terms,
            volatile_boost: !order.is_empty() && volatile_boost,
        });
    }

    let mut stats = vec![0u8; order.stats_size()];
    for slot_stats in &part_stats {
        for row in 0..slot_stats.size() {
            slot_stats.finish(&mut stats, row, &field_stats, index, order);
        }
    }

    Ok(Box::new(VariadicPhraseQuery {
        states,
        positions: relative_positions(slots),
        stats,
        field: field.to_string(),
        boost,
    }))
}
