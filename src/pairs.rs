//! Canonical keys for unordered counterparty pairs

use serde::{Deserialize, Serialize};

/// Separator between the two parties in a rendered pair key
pub const PAIR_SEPARATOR: &str = ",";

/// Unordered pair of counterparties, stored in lexicographic order
///
/// `(A, B)` and `(B, A)` produce equal keys, so transfers in both
/// directions aggregate into one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub low: String,
    pub high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn contains(&self, party: &str) -> bool {
        self.low == party || self.high == party
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.low, PAIR_SEPARATOR, self.high)
    }
}

/// Canonical string key for the pair `(source, destination)`
pub fn canonical_pair(source: &str, destination: &str) -> String {
    PairKey::new(source, destination).to_string()
}
