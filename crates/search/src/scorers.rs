//! Process-global scorer registry.
//!
//! Scorers register by name; the first registration of a name wins and
//! collisions only log a warning. The canonical scorers are installed when
//! the registry is first touched. Entries are never removed.

use std::collections::{
    btree_map::Entry,
    BTreeMap,
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    bm25,
    boost_sort,
    error::QueryError,
    score::Scorer,
    tfidf,
};

/// Factory invoked with the scorer's (JSON) arguments, if any.
pub type ScorerFactory = fn(Option<&str>) -> anyhow::Result<Box<dyn Scorer>>;

static REGISTRY: Lazy<RwLock<BTreeMap<String, ScorerFactory>>> = Lazy::new(|| {
    let mut factories: BTreeMap<String, ScorerFactory> = BTreeMap::new();
    factories.insert("boost_sort".to_string(), boost_sort::make_json);
    factories.insert("tfidf".to_string(), tfidf::make_json);
    factories.insert("bm25".to_string(), bm25::make_json);
    RwLock::new(factories)
});

/// Registers a scorer factory. Returns false (keeping the existing entry)
/// on a name collision.
pub fn register(name: &str, factory: ScorerFactory) -> bool {
    match REGISTRY.write().entry(name.to_string()) {
        Entry::Vacant(entry) => {
            entry.insert(factory);
            true
        },
        Entry::Occupied(_) => {
            tracing::warn!(
                scorer = name,
                "scorer name collision, keeping first registration"
            );
            false
        },
    }
}

pub fn exists(name: &str) -> bool {
    REGISTRY.read().contains_key(name)
}

/// Instantiates a registered scorer. Unknown names and factory failures are
/// configuration errors.
pub fn get(name: &str, args: Option<&str>) -> anyhow::Result<Box<dyn Scorer>> {
    let factory = REGISTRY
        .read()
        .get(name)
        .copied()
        .ok_or_else(|| QueryError::UnknownScorer {
            name: name.to_string(),
        })?;
    factory(args)
}

/// Walks registered names in order until the visitor returns false.
pub fn visit(mut visitor: impl FnMut(&str) -> bool) -> bool {
    for name in REGISTRY.read().keys() {
        if !visitor(name) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(_args: Option<&str>) -> anyhow::Result<Box<dyn Scorer>> {
        anyhow::bail!("dummy factory")
    }

    #[test]
    fn canonical_scorers_are_registered() {
        assert!(exists("boost_sort"));
        assert!(exists("tfidf"));
        assert!(exists("bm25"));
        assert!(!exists("pagerank"));
    }

    #[test]
    fn first_registration_wins() {
        assert!(register("collision_probe", dummy));
        assert!(!register("collision_probe", dummy));
        assert!(exists("collision_probe"));
    }

    #[test]
    fn visit_sees_all_names() {
        let mut names = Vec::new();
        assert!(visit(|name| {
            names.push(name.to_string());
            true
        }));
        assert!(names.iter().any(|name| name == "bm25"));
        // Early exit.
        let mut count = 0;
        assert!(!visit(|_| {
            count += 1;
            false
        }));
        assert_eq!(count, 1);
    }
}
