use std::{
    fmt,
    ops::{
        BitOr,
        BitOrAssign,
    },
};

/// Which per-posting streams a field has indexed, or which streams a
/// consumer requires. Filters declare a required subset; segments whose
/// field indexes less are skipped.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexFeatures(u8);

impl IndexFeatures {
    /// Document ids only.
    pub const DOCS: IndexFeatures = IndexFeatures(0);
    /// Term frequency per document.
    pub const FREQ: IndexFeatures = IndexFeatures(1);
    /// Token positions per document. Implies nothing about offsets.
    pub const POS: IndexFeatures = IndexFeatures(1 << 1);
    /// Character offsets per position.
    pub const OFFS: IndexFeatures = IndexFeatures(1 << 2);
    /// Per-position payload bytes.
    pub const PAY: IndexFeatures = IndexFeatures(1 << 3);

    pub const fn empty() -> IndexFeatures {
        IndexFeatures::DOCS
    }

    /// True iff every feature in `other` is present in `self`.
    pub const fn contains(self, other: IndexFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: IndexFeatures) -> IndexFeatures {
        IndexFeatures(self.0 | other.0)
    }

    pub const fn intersection(self, other: IndexFeatures) -> IndexFeatures {
        IndexFeatures(self.0 & other.0)
    }
}

impl BitOr for IndexFeatures {
    type Output = IndexFeatures;

    fn bitor(self, rhs: IndexFeatures) -> IndexFeatures {
        self.union(rhs)
    }
}

impl BitOrAssign for IndexFeatures {
    fn bitor_assign(&mut self, rhs: IndexFeatures) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for IndexFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec!["DOCS"];
        if self.contains(IndexFeatures::FREQ) {
            parts.push("FREQ");
        }
        if self.contains(IndexFeatures::POS) {
            parts.push("POS");
        }
        if self.contains(IndexFeatures::OFFS) {
            parts.push("OFFS");
        }
        if self.contains(IndexFeatures::PAY) {
            parts.push("PAY");
        }
        write!(f, "IndexFeatures({})", parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::IndexFeatures;

    #[test]
    fn contains_is_subset() {
        let indexed = IndexFeatures::FREQ | IndexFeatures::POS;
        assert!(indexed.contains(IndexFeatures::DOCS));
        assert!(indexed.contains(IndexFeatures::FREQ));
        assert!(indexed.contains(IndexFeatures::FREQ | IndexFeatures::POS));
        assert!(!indexed.contains(IndexFeatures::OFFS));
        assert!(!IndexFeatures::DOCS.contains(IndexFeatures::FREQ));
    }

    #[test]
    fn union_accumulates() {
        let mut features = IndexFeatures::empty();
        features |= IndexFeatures::FREQ;
        features |= IndexFeatures::PAY;
        assert!(features.contains(IndexFeatures::FREQ | IndexFeatures::PAY));
        assert!(!features.contains(IndexFeatures::POS));
    }
}
