use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::User;

/// Unordered user pair in canonical order (`first < second`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserPair {
    pub first: Uuid,
    pub second: Uuid,
}

impl UserPair {
    /// Canonicalize two ids; `None` for a self-pair
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { first: a, second: b }),
            std::cmp::Ordering::Greater => Some(Self { first: b, second: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.first == id || self.second == id
    }
}

/// Generate every unordered pair from `users`
///
/// Pairs are keyed by their canonical form, so input order and repeated
/// users never produce duplicates. Output is sorted by the canonical key.
/// Quadratic in the number of users.
pub fn generate_pairs(users: &[User]) -> Vec<UserPair> {
    let mut pairs: BTreeMap<(Uuid, Uuid), UserPair> = BTreeMap::new();

    for (i, a) in users.iter().enumerate() {
        for b in &users[i + 1..] {
            if let Some(pair) = UserPair::new(a.id, b.id) {
                pairs.entry((pair.first, pair.second)).or_insert(pair);
            }
        }
    }

    pairs.into_values().collect()
}

/// Number of distinct users in `users`
pub fn distinct_participants(users: &[User]) -> usize {
    let mut ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}
