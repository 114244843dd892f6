//! Behavior of the term-set filters against the in-memory index.

mod common;

use std::ops::Bound;

use common::{
    docs,
    execute_all,
    phrase_corpus,
    phrase_corpus_two_segments,
    scored_docs,
};
use index::{
    memory::MemoryIndexBuilder,
    IndexFeatures,
};
use search::{
    is_config_error,
    AllFilter,
    BoostFilter,
    BytesRange,
    EditDistanceFilter,
    EmptyFilter,
    Filter,
    MergeType,
    Order,
    PrefixFilter,
    RangeFilter,
    ScorerSpec,
    TermFilter,
    TermsFilter,
    WildcardFilter,
    NO_BOOST,
};

#[test]
fn term_filter_matches_exactly() {
    let index = phrase_corpus();
    assert_eq!(
        docs(&index, &TermFilter::new("phrase", "quick").into()),
        vec![1, 2, 3]
    );
    assert_eq!(
        docs(&index, &TermFilter::new("phrase", "brown").into()),
        vec![1, 3]
    );
    assert_eq!(
        docs(&index, &TermFilter::new("phrase", "the").into()),
        vec![2]
    );
    assert!(docs(&index, &TermFilter::new("phrase", "missing").into()).is_empty());
}

#[test]
fn term_filter_skips_missing_field() {
    let index = phrase_corpus();
    assert!(docs(&index, &TermFilter::new("absent", "quick").into()).is_empty());
}

#[test]
fn term_filter_spans_segments() {
    let index = phrase_corpus_two_segments();
    assert_eq!(
        execute_all(&index, &TermFilter::new("phrase", "fox").into()),
        vec![(0, 1), (0, 2), (1, 1)]
    );
}

#[test]
fn empty_filter_matches_nothing_anywhere() {
    let filter: Filter = EmptyFilter.into();
    assert!(execute_all(&phrase_corpus(), &filter).is_empty());

    let empty_index = MemoryIndexBuilder::new().build();
    assert!(execute_all(&empty_index, &filter).is_empty());
}

#[test]
fn all_filter_matches_everything() {
    let index = phrase_corpus();
    assert_eq!(docs(&index, &AllFilter::default().into()), vec![1, 2, 3]);

    let multi = phrase_corpus_two_segments();
    assert_eq!(
        execute_all(&multi, &AllFilter::default().into()),
        vec![(0, 1), (0, 2), (1, 1)]
    );
}

#[test]
fn prefix_filter_unions_matching_terms() {
    let index = phrase_corpus();
    // "f" matches fox; "b" matches brown.
    assert_eq!(
        docs(&index, &PrefixFilter::new("phrase", "f").into()),
        vec![1, 2, 3]
    );
    assert_eq!(
        docs(&index, &PrefixFilter::new("phrase", "b").into()),
        vec![1, 3]
    );
    assert!(docs(&index, &PrefixFilter::new("phrase", "z").into()).is_empty());
    // The whole term is a prefix of itself.
    assert_eq!(
        docs(&index, &PrefixFilter::new("phrase", "the").into()),
        vec![2]
    );
}

#[test]
fn wildcard_filter_classifies_and_matches() {
    let index = phrase_corpus();
    // Pure literal behaves as a term filter.
    assert_eq!(
        docs(&index, &WildcardFilter::new("phrase", "quick").into()),
        vec![1, 2, 3]
    );
    // Trailing % behaves as a prefix filter.
    assert_eq!(
        docs(&index, &WildcardFilter::new("phrase", "qu%").into()),
        vec![1, 2, 3]
    );
    // Bare % matches every document with the field.
    assert_eq!(
        docs(&index, &WildcardFilter::new("phrase", "%").into()),
        vec![1, 2, 3]
    );
    // General patterns run the byte matcher.
    assert_eq!(
        docs(&index, &WildcardFilter::new("phrase", "b%wn").into()),
        vec![1, 3]
    );
    assert_eq!(
        docs(&index, &WildcardFilter::new("phrase", "f_x").into()),
        vec![1, 2, 3]
    );
    assert!(docs(&index, &WildcardFilter::new("phrase", "f__x").into()).is_empty());
}

#[test]
fn edit_distance_filter_accepts_close_terms() {
    let index = phrase_corpus();
    // "quack" is one substitution from "quick".
    assert_eq!(
        docs(&index, &EditDistanceFilter::new("phrase", "quack", 1).into()),
        vec![1, 2, 3]
    );
    // Distance zero is exact match only.
    assert!(docs(&index, &EditDistanceFilter::new("phrase", "quack", 0).into()).is_empty());
    // "brown" and "frown" are within one.
    assert_eq!(
        docs(&index, &EditDistanceFilter::new("phrase", "frown", 1).into()),
        vec![1, 3]
    );
}

#[test]
fn edit_distance_over_limit_is_config_error() {
    let index = phrase_corpus();
    let filter: Filter = EditDistanceFilter::new("phrase", "quick", 3).into();
    let err = filter
        .prepare(&index, &Order::empty(), NO_BOOST)
        .unwrap_err();
    assert!(is_config_error(&err));
}

#[test]
fn edit_distance_boosts_closer_terms() {
    let index = phrase_corpus();
    let results = scored_docs(
        &index,
        &EditDistanceFilter::new("phrase", "quack", 1).into(),
        &[ScorerSpec::new("boost_sort")],
    );
    // Everything matched via "quick" at distance 1 -> filter boost 0.5.
    assert_eq!(results.len(), 3);
    for (_, scores) in results {
        assert!((scores[0] - 0.5).abs() < 1e-6);
    }

    let exact = scored_docs(
        &index,
        &EditDistanceFilter::new("phrase", "quick", 1).into(),
        &[ScorerSpec::new("boost_sort")],
    );
    // Exact matches keep the neutral boost.
    assert_eq!(exact.len(), 3);
    for (_, scores) in exact {
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn range_filter_walks_bounded_terms() {
    let index = phrase_corpus();
    // Dictionary: brown, fox, quick, the.
    let range = |min, max| {
        Filter::from(RangeFilter::new("phrase", BytesRange {
            min,
            max,
        }))
    };
    assert_eq!(
        docs(
            &index,
            &range(
                Bound::Included(b"brown".to_vec()),
                Bound::Included(b"fox".to_vec())
            )
        ),
        vec![1, 2, 3]
    );
    assert_eq!(
        docs(
            &index,
            &range(
                Bound::Excluded(b"brown".to_vec()),
                Bound::Excluded(b"quick".to_vec())
            )
        ),
        vec![1, 2, 3]
    );
    // fox only.
    assert_eq!(
        docs(
            &index,
            &range(
                Bound::Excluded(b"brown".to_vec()),
                Bound::Excluded(b"the".to_vec())
            )
        ),
        vec![1, 2, 3]
    );
    assert_eq!(
        docs(
            &index,
            &range(Bound::Unbounded, Bound::Excluded(b"fox".to_vec()))
        ),
        vec![1, 3]
    );
    assert!(docs(
        &index,
        &range(
            Bound::Excluded(b"the".to_vec()),
            Bound::Unbounded
        )
    )
    .is_empty());
}

#[test]
fn terms_filter_unions_with_min_match() {
    let index = phrase_corpus();
    let any: Filter = TermsFilter::new("phrase").term("brown").term("the").into();
    assert_eq!(docs(&index, &any), vec![1, 2, 3]);

    let both: Filter = TermsFilter::new("phrase")
        .term("brown")
        .term("quick")
        .min_match(2)
        .into();
    assert_eq!(docs(&index, &both), vec![1, 3]);

    let impossible: Filter = TermsFilter::new("phrase")
        .term("brown")
        .term("the")
        .min_match(3)
        .into();
    assert!(docs(&index, &impossible).is_empty());

    let empty: Filter = TermsFilter::new("phrase").into();
    assert!(docs(&index, &empty).is_empty());
}

#[test]
fn terms_filter_merge_types_shape_scores() {
    let index = phrase_corpus();
    let filter = |merge_type| {
        Filter::from(
            TermsFilter::new("phrase")
                .boosted_term("quick", 2.0)
                .boosted_term("fox", 3.0)
                .merge_type(merge_type),
        )
    };
    let spec = [ScorerSpec::new("boost_sort")];

    // Every document matches both terms.
    let sum = scored_docs(&index, &filter(MergeType::Sum), &spec);
    assert!(sum.iter().all(|(_, scores)| (scores[0] - 5.0).abs() < 1e-6));

    let max = scored_docs(&index, &filter(MergeType::Max), &spec);
    assert!(max.iter().all(|(_, scores)| (scores[0] - 3.0).abs() < 1e-6));

    let min = scored_docs(&index, &filter(MergeType::Min), &spec);
    assert!(min.iter().all(|(_, scores)| (scores[0] - 2.0).abs() < 1e-6));
}

#[test]
fn boost_wrapper_multiplies_down_the_tree() {
    let index = phrase_corpus();
    let inner: Filter = TermFilter::new("phrase", "quick").with_boost(2.0).into();
    let wrapped: Filter = BoostFilter::new(inner, 3.0).into();
    let results = scored_docs(&index, &wrapped, &[ScorerSpec::new("boost_sort")]);
    assert_eq!(results.len(), 3);
    for (_, scores) in results {
        assert!((scores[0] - 6.0).abs() < 1e-6);
    }
}

#[test]
fn features_are_checked_per_field() {
    use common::FeatureMaskedIndex;
    use search::PhraseFilter;

    let inner = phrase_corpus();
    let masked = FeatureMaskedIndex::new(&inner, &["phrase"], IndexFeatures::DOCS);

    // Term filters only need DOCS and still match.
    let term: Filter = TermFilter::new("phrase", "quick").into();
    assert_eq!(execute_all(&masked, &term).len(), 3);

    // Phrases need FREQ|POS and silently skip the segment.
    let phrase: Filter = PhraseFilter::new("phrase").term("quick").term("brown").into();
    assert!(execute_all(&masked, &phrase).is_empty());
}
