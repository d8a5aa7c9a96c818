//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::audit::AuditEvent;
use crate::domain::counter::{CounterEntry, LockoutEntry, LockoutStatus};
use crate::domain::policy::LockoutPolicy;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Candidate entry for eviction consideration.
///
/// Values are cloned to avoid lifetime issues with concurrent maps.
pub struct EvictionCandidate<K, V> {
    /// The key of the entry
    pub key: K,
    /// The value of the entry (cloned)
    pub value: V,
    /// Last access time for LRU-based strategies
    pub last_access: Instant,
}

/// Port for eviction policy decisions.
///
/// The in-memory counter store asks this policy whether it is full and, if
/// so, which sampled entry to drop before admitting a new key.
pub trait EvictionPolicy<K, V>: Send + Sync + Debug
where
    K: Clone,
    V: Clone,
{
    /// Select a victim from the given candidates, or `None` to keep them all.
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K>;

    /// Whether a new entry can only be admitted after evicting one.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for obtaining current time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage.
///
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// The accessor runs while the entry is exclusively held, so a
    /// read-modify-write inside it is atomic with respect to other writers
    /// of the same key.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an entry without creating it.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Remove an entry, returning whether it existed.
    fn remove(&self, key: &K) -> bool;

    /// Whether a key is present.
    fn contains(&self, key: &K) -> bool;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Map entries through `f` and collect the first `limit` results.
    ///
    /// Iteration stops as soon as `limit` results are collected.
    fn sample<F, R>(&self, limit: usize, f: F) -> Vec<R>
    where
        F: FnMut(&K, &V) -> Option<R>;

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Shared keyed counters backing both rate limiting and account lockout.
///
/// Every mutating method must be atomic per key: two concurrent callers on
/// the same key must observe distinct post-increment values.
pub trait CounterStore: Send + Sync + Debug {
    /// Count one request for `key` in a window of length `window`.
    ///
    /// Opens a new window when the key is absent or its window has closed,
    /// otherwise increments in place. Returns the post-increment entry.
    fn increment(&self, key: &str, window: Duration, now: Instant) -> CounterEntry;

    /// Current entry for `key`, without modifying it.
    fn peek(&self, key: &str) -> Option<CounterEntry>;

    /// Forget the counter for `key`.
    fn reset(&self, key: &str);

    /// Count one failed login for `identity` and return the resulting status.
    fn record_failure(&self, identity: &str, policy: &LockoutPolicy, now: Instant) -> LockoutStatus;

    /// Current lockout entry for `identity`, without modifying it.
    fn lockout_entry(&self, identity: &str) -> Option<LockoutEntry>;

    /// Drop all failure history for `identity`.
    fn clear_lockout(&self, identity: &str);

    /// Remove expired windows and lockout entries idle for longer than
    /// `lockout_retention`. Returns how many entries were removed.
    fn sweep(&self, now: Instant, lockout_retention: Duration) -> usize;

    /// Number of entries held locally. Remote stores may report 0.
    fn len(&self) -> usize;

    /// Whether no entries are held locally.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    fn clear(&self);
}

/// Destination for redacted audit events.
///
/// Implementations must not block the caller for long; slow transports
/// should hand the event off to a background task.
pub trait AuditSink: Send + Sync + Debug {
    /// Deliver one event.
    fn record(&self, event: &AuditEvent);
}

/// Resolves translation keys to user-facing text.
///
/// The security layer only ever passes keys and numeric parameters.
pub trait Translator {
    /// Render `key` with named parameters.
    fn translate(&self, key: &str, params: &[(&str, String)]) -> String;
}

impl<F> Translator for F
where
    F: Fn(&str, &[(&str, String)]) -> String,
{
    fn translate(&self, key: &str, params: &[(&str, String)]) -> String {
        self(key, params)
    }
}
