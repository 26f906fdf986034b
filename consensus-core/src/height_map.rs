//! Canonical height → (header-hash, optional sub-epoch-summary) map.

use std::collections::BTreeMap;

use consensus_types::{BlockHeight, BlockId};

/// A sub-epoch summary placeholder: the engine stores these opaquely and
/// hands them back by height; it never interprets their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubEpochSummary(pub Vec<u8>);

#[derive(Debug, Clone, Default)]
struct Entry {
    hash: BlockId,
    ses: Option<SubEpochSummary>,
}

/// An in-memory array-like structure indexed by height, rolled back along
/// with the coin store on reorg.
#[derive(Debug, Default)]
pub struct HeightMap {
    entries: BTreeMap<BlockHeight, Entry>,
}

impl HeightMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_hash(&self, height: BlockHeight) -> Option<BlockId> {
        self.entries.get(&height).map(|e| e.hash)
    }

    #[must_use]
    pub fn contains_height(&self, height: BlockHeight) -> bool {
        self.entries.contains_key(&height)
    }

    /// Extends or overwrites the entry at `height`.
    pub fn update_height(&mut self, height: BlockHeight, hash: BlockId, ses: Option<SubEpochSummary>) {
        self.entries.insert(height, Entry { hash, ses });
    }

    /// Truncates every entry above `height`.
    pub fn rollback(&mut self, height: BlockHeight) {
        self.entries.split_off(&(height + 1));
    }

    #[must_use]
    pub fn get_ses_heights(&self) -> Vec<BlockHeight> {
        self.entries
            .iter()
            .filter(|(_, e)| e.ses.is_some())
            .map(|(h, _)| *h)
            .collect()
    }

    #[must_use]
    pub fn get_ses(&self, height: BlockHeight) -> Option<SubEpochSummary> {
        self.entries.get(&height).and_then(|e| e.ses.clone())
    }

    #[must_use]
    pub fn tip_height(&self) -> Option<BlockHeight> {
        self.entries.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_types::Hash256;

    #[test]
    fn update_then_get_hash_round_trips() {
        let mut map = HeightMap::new();
        let hash = Hash256::hash(b"h1");
        map.update_height(1, hash, None);
        assert_eq!(map.get_hash(1), Some(hash));
        assert!(map.contains_height(1));
        assert!(!map.contains_height(2));
    }

    #[test]
    fn rollback_truncates_entries_above_height() {
        let mut map = HeightMap::new();
        for h in 0..5u32 {
            map.update_height(h, Hash256::hash(&h.to_be_bytes()), None);
        }
        map.rollback(2);
        assert!(map.contains_height(2));
        assert!(!map.contains_height(3));
        assert!(!map.contains_height(4));
        assert_eq!(map.tip_height(), Some(2));
    }

    #[test]
    fn ses_heights_only_include_entries_with_a_summary() {
        let mut map = HeightMap::new();
        map.update_height(0, Hash256::zero(), None);
        map.update_height(1, Hash256::hash(b"h1"), Some(SubEpochSummary(vec![1, 2, 3])));
        assert_eq!(map.get_ses_heights(), vec![1]);
        assert_eq!(map.get_ses(1), Some(SubEpochSummary(vec![1, 2, 3])));
        assert_eq!(map.get_ses(0), None);
    }
}
