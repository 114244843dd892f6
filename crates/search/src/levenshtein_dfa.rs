//! Levenshtein DFA construction for edit-distance term matching.
//!
//! Builder tables are parametric in the distance alone, so they are built
//! once per (distance, transposition) pair and reused for every query term.

use levenshtein_automata::{
    Distance,
    LevenshteinAutomatonBuilder,
    DFA,
};
use once_cell::sync::Lazy;

/// Largest supported edit distance; larger automata get prohibitively big.
pub const MAX_DISTANCE: u8 = 2;

static BUILDERS: Lazy<[[LevenshteinAutomatonBuilder; 3]; 2]> = Lazy::new(|| {
    [false, true].map(|transpositions| {
        [0u8, 1, 2].map(|distance| LevenshteinAutomatonBuilder::new(distance, transpositions))
    })
});

pub(crate) fn build_dfa(term: &str, distance: u8, transpositions: bool, prefix: bool) -> DFA {
    assert!(distance <= MAX_DISTANCE);
    let builder = &BUILDERS[usize::from(transpositions)][distance as usize];
    if prefix {
        builder.build_prefix_dfa(term)
    } else {
        builder.build_dfa(term)
    }
}

/// Edit distance of `candidate` from the DFA's query term, if within the
/// DFA's bound.
pub(crate) fn matched_distance(dfa: &DFA, candidate: &[u8]) -> Option<u8> {
    match dfa.eval(candidate) {
        Distance::Exact(distance) => Some(distance),
        Distance::AtLeast(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_term_is_distance_zero() {
        let dfa = build_dfa("quick", 2, false, false);
        assert_eq!(matched_distance(&dfa, b"quick"), Some(0));
        assert_eq!(matched_distance(&dfa, b"quack"), Some(1));
        assert_eq!(matched_distance(&dfa, b"qucik"), Some(2));
        assert_eq!(matched_distance(&dfa, b"duck"), None);
    }

    #[test]
    fn transpositions_cost_one_when_enabled() {
        let strict = build_dfa("quick", 1, false, false);
        assert_eq!(matched_distance(&strict, b"qucik"), None);
        let damerau = build_dfa("quick", 1, true, false);
        assert_eq!(matched_distance(&damerau, b"qucik"), Some(1));
    }

    #[test]
    fn prefix_dfa_accepts_extensions() {
        let dfa = build_dfa("qui", 0, false, true);
        assert_eq!(matched_distance(&dfa, b"quick"), Some(0));
        assert_eq!(matched_distance(&dfa, b"quiet"), Some(0));
        assert_eq!(matched_distance(&dfa, b"qu"), None);
    }
}
