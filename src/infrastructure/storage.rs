//! In-memory storage for counter and lockout state.
//!
//! [`ShardedStorage`] is the concurrent map underneath; [`MemoryCounterStore`]
//! layers window counting, lockout tracking, sweeping and an LRU cap on top.

use crate::application::metrics::Metrics;
use crate::application::ports::{CounterStore, EvictionCandidate, EvictionPolicy, Storage};
use crate::domain::counter::{CounterEntry, LockoutEntry, LockoutStatus};
use crate::domain::policy::LockoutPolicy;
use crate::infrastructure::eviction::{LruEviction, EVICTION_SAMPLE_SIZE};
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default cap on tracked keys for [`MemoryCounterStore`].
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Thread-safe sharded storage backed by DashMap.
///
/// DashMap provides lock-free reads and fine-grained locking for writes, so
/// unrelated keys never contend on the hot path.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, V, ahash::RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Insert or update a value.
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    /// Get a reference to a value.
    pub fn get<Q>(&self, key: &Q) -> Option<dashmap::mapref::one::Ref<'_, K, V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    /// Check if a key exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Remove a key and return its value.
    pub fn remove_entry<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key)
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + Debug,
    V: Send + Sync + Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let entry = self.map.entry(key);
        let mut value_ref = entry.or_insert_with(factory);
        accessor(&mut value_ref)
    }

    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.map.get(key).map(|value_ref| accessor(value_ref.value()))
    }

    fn remove(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }

    fn sample<F, R>(&self, limit: usize, mut f: F) -> Vec<R>
    where
        F: FnMut(&K, &V) -> Option<R>,
    {
        self.map
            .iter()
            .filter_map(|entry| f(entry.key(), entry.value()))
            .take(limit)
            .collect()
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.map.retain(f);
    }
}

/// A stored value plus the instant it was last touched.
#[derive(Debug, Clone, Copy)]
struct Tracked<T> {
    value: T,
    last_access: Instant,
}

impl<T> Tracked<T> {
    fn new(value: T, now: Instant) -> Self {
        Self {
            value,
            last_access: now,
        }
    }
}

/// Identifies an entry of a [`MemoryCounterStore`] by map and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Rate-limit window
    Counter(String),
    /// Failed-login history
    Lockout(String),
}

type SharedEviction = Arc<dyn EvictionPolicy<StoreKey, u32>>;

/// Process-local [`CounterStore`].
///
/// Counter and lockout state live in separate maps. Both count toward one
/// shared entry cap; once it is reached, admitting a new key evicts the least
/// recently touched entry sampled from either map. On a tie, failure history
/// goes before a rate-limit window.
///
/// Active lockouts are never evicted. When every tracked entry is an active
/// lockout, a new key is admitted anyway and the store grows past the cap.
///
/// State is lost on restart and is not shared between instances.
#[derive(Debug)]
pub struct MemoryCounterStore {
    counters: ShardedStorage<String, Tracked<CounterEntry>>,
    lockouts: ShardedStorage<String, Tracked<LockoutEntry>>,
    eviction: Option<SharedEviction>,
    metrics: Metrics,
}

impl MemoryCounterStore {
    /// Store capped at [`DEFAULT_MAX_ENTRIES`] keys.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Store capped at `max_entries` keys.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self::with_eviction(Some(Arc::new(LruEviction::new(max_entries))))
    }

    /// Store with a custom eviction policy, or none for an unbounded store.
    pub fn with_eviction(eviction: Option<SharedEviction>) -> Self {
        Self {
            counters: ShardedStorage::new(),
            lockouts: ShardedStorage::new(),
            eviction,
            metrics: Metrics::new(),
        }
    }

    /// Report evictions to `metrics` instead of a private counter set.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Evict one entry if admitting a new key would exceed the cap.
    fn make_room(&self, now: Instant) {
        let Some(policy) = &self.eviction else {
            return;
        };
        if !policy.should_evict(self.len()) {
            return;
        }

        let mut candidates = self.lockouts.sample(EVICTION_SAMPLE_SIZE, |key, tracked| {
            (!tracked.value.is_locked(now)).then(|| EvictionCandidate {
                key: StoreKey::Lockout(key.clone()),
                value: tracked.value.failed_attempts,
                last_access: tracked.last_access,
            })
        });
        candidates.extend(self.counters.sample(EVICTION_SAMPLE_SIZE, |key, tracked| {
            Some(EvictionCandidate {
                key: StoreKey::Counter(key.clone()),
                value: tracked.value.count,
                last_access: tracked.last_access,
            })
        }));

        let evicted = match policy.select_victim(&candidates) {
            Some(StoreKey::Counter(key)) => self.counters.remove(&key),
            Some(StoreKey::Lockout(key)) => self.lockouts.remove(&key),
            None => false,
        };
        if evicted {
            self.metrics.record_eviction();
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, window: Duration, now: Instant) -> CounterEntry {
        let key = key.to_string();
        if !self.counters.contains(&key) {
            self.make_room(now);
        }

        let empty = CounterEntry {
            count: 0,
            window_start: now,
            window,
        };
        self.counters.with_entry_mut(
            key,
            || Tracked::new(empty, now),
            |tracked| {
                tracked.value.observe(now, window);
                tracked.last_access = now;
                tracked.value
            },
        )
    }

    fn peek(&self, key: &str) -> Option<CounterEntry> {
        self.counters.get(key).map(|tracked| tracked.value)
    }

    fn reset(&self, key: &str) {
        self.counters.remove_entry(key);
    }

    fn record_failure(&self, identity: &str, policy: &LockoutPolicy, now: Instant) -> LockoutStatus {
        let key = identity.to_string();
        if !self.lockouts.contains(&key) {
            self.make_room(now);
        }

        self.lockouts.with_entry_mut(
            key,
            || Tracked::new(LockoutEntry::new(now), now),
            |tracked| {
                tracked.last_access = now;
                tracked.value.record_failure(now, policy)
            },
        )
    }

    fn lockout_entry(&self, identity: &str) -> Option<LockoutEntry> {
        self.lockouts.get(identity).map(|tracked| tracked.value)
    }

    fn clear_lockout(&self, identity: &str) {
        self.lockouts.remove_entry(identity);
    }

    fn sweep(&self, now: Instant, lockout_retention: Duration) -> usize {
        let mut removed = 0;
        self.counters.retain(|_, tracked| {
            let keep = !tracked.value.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.lockouts.retain(|_, tracked| {
            let entry = &tracked.value;
            let keep = entry.is_locked(now)
                || now.saturating_duration_since(entry.last_attempt) <= lockout_retention;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.counters.len() + self.lockouts.len()
    }

    fn clear(&self) {
        self.counters.clear();
        self.lockouts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_sharded_storage_basic_operations() {
        let storage: ShardedStorage<String, u32> = ShardedStorage::new();

        storage.insert("auth:a".to_string(), 1);
        storage.insert("auth:b".to_string(), 2);

        assert_eq!(*storage.get("auth:a").unwrap(), 1);
        assert_eq!(storage.with_entry(&"auth:b".to_string(), |v| *v), Some(2));
        assert!(storage.get("auth:c").is_none());
        assert_eq!(Storage::len(&storage), 2);

        assert!(storage.remove(&"auth:a".to_string()));
        assert!(!storage.remove(&"auth:a".to_string()));
        assert!(!storage.contains_key("auth:a"));
    }

    #[test]
    fn test_with_entry_mut_creates_then_updates() {
        let storage: ShardedStorage<String, u32> = ShardedStorage::new();

        let first = storage.with_entry_mut("k".to_string(), || 10, |v| {
            *v += 1;
            *v
        });
        let second = storage.with_entry_mut("k".to_string(), || 10, |v| {
            *v += 1;
            *v
        });

        assert_eq!(first, 11);
        assert_eq!(second, 12);
    }

    #[test]
    fn test_increment_counts_within_window() {
        let store = MemoryCounterStore::new();
        let now = Instant::now();

        assert_eq!(store.increment("api:u1", MINUTE, now).count, 1);
        assert_eq!(store.increment("api:u1", MINUTE, now).count, 2);
        assert_eq!(store.increment("api:u2", MINUTE, now).count, 1);
        assert_eq!(store.peek("api:u1").unwrap().count, 2);
    }

    #[test]
    fn test_increment_reopens_closed_window() {
        let store = MemoryCounterStore::new();
        let start = Instant::now();

        store.increment("api:u1", MINUTE, start);
        store.increment("api:u1", MINUTE, start);
        let entry = store.increment("api:u1", MINUTE, start + MINUTE);

        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, start + MINUTE);
    }

    #[test]
    fn test_reset_forgets_counter() {
        let store = MemoryCounterStore::new();
        let now = Instant::now();

        store.increment("upload:u1", MINUTE, now);
        store.reset("upload:u1");

        assert!(store.peek("upload:u1").is_none());
        assert_eq!(store.increment("upload:u1", MINUTE, now).count, 1);
    }

    #[test]
    fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(MemoryCounterStore::new());
        let now = Instant::now();
        let mut handles = vec![];

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                (0..100)
                    .map(|_| store.increment("auth:shared", MINUTE, now).count)
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen: Vec<u32> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        seen.sort_unstable();

        assert_eq!(seen, (1..=800).collect::<Vec<_>>());
    }

    #[test]
    fn test_record_failure_locks_at_threshold() {
        let store = MemoryCounterStore::new();
        let policy = LockoutPolicy::single(3, Duration::from_secs(300)).unwrap();
        let now = Instant::now();

        assert!(!store.record_failure("a@example.com", &policy, now).is_locked);
        assert!(!store.record_failure("a@example.com", &policy, now).is_locked);
        let status = store.record_failure("a@example.com", &policy, now);

        assert!(status.is_locked);
        assert_eq!(status.remaining_minutes, 5);
        assert_eq!(store.lockout_entry("a@example.com").unwrap().failed_attempts, 3);

        store.clear_lockout("a@example.com");
        assert!(store.lockout_entry("a@example.com").is_none());
    }

    #[test]
    fn test_sweep_removes_expired_state() {
        let store = MemoryCounterStore::new();
        let policy = LockoutPolicy::single(1, Duration::from_secs(60)).unwrap();
        let start = Instant::now();

        store.increment("api:old", MINUTE, start);
        store.increment("api:new", MINUTE, start + Duration::from_secs(50));
        store.record_failure("locked@example.com", &policy, start + Duration::from_secs(50));

        let idle = LockoutPolicy::single(5, Duration::from_secs(60)).unwrap();
        store.record_failure("idle@example.com", &idle, start);

        let removed = store.sweep(start + Duration::from_secs(70), Duration::from_secs(30));

        assert_eq!(removed, 2);
        assert!(store.peek("api:old").is_none());
        assert!(store.peek("api:new").is_some());
        assert!(store.lockout_entry("locked@example.com").is_some());
        assert!(store.lockout_entry("idle@example.com").is_none());
    }

    #[test]
    fn test_lru_cap_evicts_least_recent() {
        let metrics = Metrics::new();
        let store = MemoryCounterStore::with_max_entries(3).with_metrics(metrics.clone());
        let start = Instant::now();

        store.increment("api:a", MINUTE, start);
        store.increment("api:b", MINUTE, start + Duration::from_secs(1));
        store.increment("api:c", MINUTE, start + Duration::from_secs(2));
        store.increment("api:a", MINUTE, start + Duration::from_secs(3));
        store.increment("api:d", MINUTE, start + Duration::from_secs(4));

        assert_eq!(store.len(), 3);
        assert!(store.peek("api:b").is_none());
        assert!(store.peek("api:a").is_some());
        assert_eq!(metrics.snapshot().entries_evicted, 1);
    }

    #[test]
    fn test_active_lockouts_survive_eviction() {
        let store = MemoryCounterStore::with_max_entries(1);
        let policy = LockoutPolicy::single(1, Duration::from_secs(300)).unwrap();
        let now = Instant::now();

        store.record_failure("victim@example.com", &policy, now);
        store.record_failure("other@example.com", &policy, now);

        assert!(store.lockout_entry("victim@example.com").is_some());
    }

    #[test]
    fn test_cap_is_shared_by_counters_and_lockouts() {
        let metrics = Metrics::new();
        let store = MemoryCounterStore::with_max_entries(3).with_metrics(metrics.clone());
        let policy = LockoutPolicy::progressive();
        let start = Instant::now();

        for identity in ["a@example.com", "b@example.com", "c@example.com"] {
            store.record_failure(identity, &policy, start);
        }
        store.increment("api:u1", MINUTE, start + Duration::from_secs(1));
        store.increment("api:u2", MINUTE, start + Duration::from_secs(2));
        let entry = store.increment("api:u1", MINUTE, start + Duration::from_secs(3));

        assert_eq!(entry.count, 2);
        assert_eq!(store.peek("api:u2").unwrap().count, 1);
        assert_eq!(store.len(), 3);
        assert_eq!(metrics.snapshot().entries_evicted, 2);
    }

    #[test]
    fn test_tie_evicts_failure_history_first() {
        let store = MemoryCounterStore::with_max_entries(2);
        let policy = LockoutPolicy::progressive();
        let now = Instant::now();

        store.record_failure("a@example.com", &policy, now);
        store.increment("api:u1", MINUTE, now);
        store.increment("api:u2", MINUTE, now);

        assert!(store.lockout_entry("a@example.com").is_none());
        assert!(store.peek("api:u1").is_some());
        assert!(store.peek("api:u2").is_some());
    }

    #[test]
    fn test_only_active_lockouts_push_past_cap() {
        let store = MemoryCounterStore::with_max_entries(2);
        let policy = LockoutPolicy::single(1, Duration::from_secs(300)).unwrap();
        let now = Instant::now();

        store.record_failure("a@example.com", &policy, now);
        store.record_failure("b@example.com", &policy, now);
        store.increment("api:u1", MINUTE, now);
        assert_eq!(store.len(), 3);

        store.increment("api:u2", MINUTE, now + Duration::from_secs(1));
        assert_eq!(store.len(), 3);
        assert!(store.peek("api:u1").is_none());
        assert!(store.lockout_entry("a@example.com").is_some());
        assert!(store.lockout_entry("b@example.com").is_some());
    }

    #[test]
    fn test_sample_stops_at_limit() {
        let storage: ShardedStorage<String, u32> = ShardedStorage::new();
        for i in 0..100 {
            storage.insert(format!("k{}", i), i);
        }

        let mut visited = 0;
        let sampled = storage.sample(5, |_, v| {
            visited += 1;
            (v % 2 == 0).then_some(*v)
        });

        assert_eq!(sampled.len(), 5);
        assert!(sampled.iter().all(|v| v % 2 == 0));
        assert!(visited < 100);
    }

    #[test]
    fn test_unbounded_store() {
        let store = MemoryCounterStore::with_eviction(None);
        let now = Instant::now();
        for i in 0..50 {
            store.increment(&format!("api:{}", i), MINUTE, now);
        }
        assert_eq!(store.len(), 50);

        store.clear();
        assert!(store.is_empty());
    }
}
