use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free list of tracked coin ids.
///
/// Ids are trimmed and lowercased on the way in, so comparisons are
/// effectively case-insensitive. Insertion order is kept for display and
/// for batching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedCoins {
    ids: Vec<String>,
}

/// Canonical form of a coin id.
pub fn normalize_coin_id(id: &str) -> String {
    id.trim().to_lowercase()
}

impl TrackedCoins {
    /// Builds the set from raw ids, dropping blanks and later duplicates.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut coins = Self::default();
        for id in ids {
            coins.insert(id.as_ref());
        }
        coins
    }

    /// Returns false if the id was blank or already tracked.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = normalize_coin_id(id);
        if id.is_empty() || self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Returns false if the id was not tracked.
    pub fn remove(&mut self, id: &str) -> bool {
        let id = normalize_coin_id(id);
        match self.ids.iter().position(|existing| *existing == id) {
            Some(pos) => {
                self.ids.remove(pos);
                true
            },
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
