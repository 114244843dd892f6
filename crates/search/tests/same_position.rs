//! Same-position conjunction over parallel fields.

mod common;

use common::{
    docs,
    phrase_corpus,
    same_position_corpus,
    scored_docs,
};
use index::IndexReader;
use search::{
    Filter,
    Order,
    SamePositionFilter,
    ScorerSpec,
    TermFilter,
    NO_BOOST,
};

#[test]
fn single_term_degenerates_to_term_filter() {
    let index = phrase_corpus();
    let same: Filter = SamePositionFilter::new().term("phrase", "quick").into();
    let term: Filter = TermFilter::new("phrase", "quick").into();
    assert_eq!(docs(&index, &same), docs(&index, &term));
}

#[test]
fn terms_at_different_positions_do_not_match() {
    let index = phrase_corpus();
    // Both words occur in d1 and d3 but never at the same position.
    let same: Filter = SamePositionFilter::new()
        .term("phrase", "quick")
        .term("phrase", "brown")
        .into();
    assert!(docs(&index, &same).is_empty());
}

#[test]
fn duplicated_term_is_identity() {
    let index = phrase_corpus();
    let same: Filter = SamePositionFilter::new()
        .term("phrase", "fox")
        .term("phrase", "fox")
        .into();
    assert_eq!(
        docs(&index, &same),
        docs(&index, &TermFilter::new("phrase", "fox").into())
    );
}

#[test]
fn three_fields_align_on_one_document() {
    let index = same_position_corpus();
    let same: Filter = SamePositionFilter::new()
        .term("a", "300")
        .term("b", "90")
        .term("c", "9")
        .into();
    assert_eq!(docs(&index, &same), vec![1]);
}

#[test]
fn two_fields_align_on_several_documents() {
    let index = same_position_corpus();
    let same: Filter = SamePositionFilter::new()
        .term("a", "700")
        .term("c", "7")
        .into();
    // d4 has 700 but no 7; strictly ascending result.
    assert_eq!(docs(&index, &same), vec![2, 3]);
}

#[test]
fn seeking_backwards_is_a_noop() {
    let index = same_position_corpus();
    let filter: Filter = SamePositionFilter::new()
        .term("a", "700")
        .term("c", "7")
        .into();
    let order = Order::empty();
    let prepared = filter.prepare(&index, &order, NO_BOOST).unwrap();
    let segment = index.segment(0);
    let mut it = prepared.execute(segment, &order).unwrap();

    assert!(it.next());
    assert_eq!(it.value(), 2);
    assert!(it.next());
    assert_eq!(it.value(), 3);
    // Seeking to a smaller id returns the current value.
    assert_eq!(it.seek(1), 3);
    assert_eq!(it.value(), 3);
    assert!(!it.next());
    assert_eq!(it.seek(2), index::doc_ids::EOF);
}

#[test]
fn missing_term_drops_every_segment() {
    let index = same_position_corpus();
    let same: Filter = SamePositionFilter::new()
        .term("a", "700")
        .term("zzz", "7")
        .into();
    assert!(docs(&index, &same).is_empty());
}

#[test]
fn empty_options_prepare_to_nothing() {
    let index = same_position_corpus();
    let same: Filter = SamePositionFilter::new().into();
    assert!(docs(&index, &same).is_empty());
}

#[test]
fn scored_same_position_sums_term_components() {
    let index = same_position_corpus();
    let filter: Filter = SamePositionFilter::new()
        .term("a", "700")
        .term("c", "7")
        .into();
    let results = scored_docs(&index, &filter, &[ScorerSpec::new("boost_sort")]);
    assert_eq!(results.len(), 2);
    // Two legs, each contributing the neutral boost, merged by sum.
    for (_, scores) in results {
        assert!((scores[0] - 2.0).abs() < 1e-6);
    }
}
