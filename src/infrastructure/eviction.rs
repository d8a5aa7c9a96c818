//! LRU eviction for the in-memory counter store.
//!
//! Expired entries are normally removed by the periodic sweep. The LRU cap is
//! the backstop for traffic from many distinct identities within one window.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Number of entries sampled when choosing a victim.
pub const EVICTION_SAMPLE_SIZE: usize = 32;

/// LRU eviction policy with an entry count limit.
///
/// Evicts the least recently touched entry among a sample once the store
/// holds `max_entries` keys.
#[derive(Debug, Clone, Copy)]
pub struct LruEviction {
    max_entries: usize,
}

impl LruEviction {
    /// Create a policy that caps the store at `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Configured cap.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K, V> EvictionPolicy<K, V> for LruEviction
where
    K: Clone,
    V: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K> {
        candidates
            .iter()
            .min_by_key(|candidate| candidate.last_access)
            .map(|candidate| candidate.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}
