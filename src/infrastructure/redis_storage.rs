//! Redis-backed counter store.
//!
//! Lets several portal instances share rate limit windows and lockout state.
//!
//! ## Data model
//!
//! - Rate limit windows: hash `{prefix}rl:{digest}` with fields `count` and
//!   `window_ms`. The key expires with the window (`PEXPIRE`).
//! - Lockouts: hash `{prefix}lock:{digest}` with fields `failed`,
//!   `locked_until` and `last` (unix milliseconds). The key expires once the
//!   lock has lifted and the failure history has aged out.
//!
//! Identities are stored as SHA-256 digests so emails and IPs never appear in
//! Redis. Every read-modify-write runs as a Lua script, which Redis executes
//! atomically.
//!
//! ## Failure handling
//!
//! Redis errors are logged as warnings and the call is served from an
//! in-memory [`MemoryCounterStore`] instead. A circuit breaker stops calling
//! Redis after repeated failures and probes it again after a recovery period.
//! While failed over, limits are enforced per instance only.
//!
//! ## Runtime requirements
//!
//! The [`CounterStore`] port is synchronous. Calls made inside a
//! multi-threaded tokio runtime use `block_in_place`; calls made outside any
//! runtime create a temporary one. Inside a current-thread runtime blocking
//! is impossible, so those calls always use the fallback.
//!
//! ```rust,ignore
//! use portal_guard::{RedisCounterStore, SecurityGate};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisCounterStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("redis reachable");
//!     let gate = SecurityGate::builder()
//!         .with_store(Arc::new(store))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::metrics::Metrics;
use crate::application::ports::CounterStore;
use crate::domain::counter::{CounterEntry, LockoutEntry, LockoutStatus};
use crate::domain::policy::LockoutPolicy;
use crate::infrastructure::storage::MemoryCounterStore;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, RedisResult, Script};
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Extra lifetime given to lockout keys beyond the point they become stale.
const LOCKOUT_KEY_SLACK_MS: u64 = 1_000;

static INCREMENT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('PTTL', KEYS[1]) < 0 then
          redis.call('DEL', KEYS[1])
        end
        local count = redis.call('HINCRBY', KEYS[1], 'count', 1)
        local ttl = redis.call('PTTL', KEYS[1])
        if count == 1 then
          redis.call('HSET', KEYS[1], 'window_ms', ARGV[1])
          redis.call('PEXPIRE', KEYS[1], ARGV[1])
          ttl = tonumber(ARGV[1])
        end
        return {count, ttl}
        ",
    )
});

static PEEK: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local values = redis.call('HMGET', KEYS[1], 'count', 'window_ms')
        if not values[1] then
          return false
        end
        return {tonumber(values[1]), tonumber(values[2]) or 0, redis.call('PTTL', KEYS[1])}
        ",
    )
});

// ARGV: now_ms, reset_after_ms, slack_ms, then (threshold, duration_ms) per tier
static RECORD_FAILURE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local now = tonumber(ARGV[1])
        local reset_after = tonumber(ARGV[2])
        local failed = tonumber(redis.call('HGET', KEYS[1], 'failed') or '0')
        local locked_until = tonumber(redis.call('HGET', KEYS[1], 'locked_until') or '0')
        local last = tonumber(redis.call('HGET', KEYS[1], 'last') or '0')
        if failed > 0 and locked_until <= now and now - last > reset_after then
          failed = 0
        end
        failed = failed + 1
        locked_until = 0
        for i = 4, #ARGV, 2 do
          if failed >= tonumber(ARGV[i]) then
            locked_until = now + tonumber(ARGV[i + 1])
          end
        end
        redis.call('HSET', KEYS[1], 'failed', failed, 'locked_until', locked_until, 'last', now)
        local keep = reset_after
        if locked_until - now > keep then
          keep = locked_until - now
        end
        redis.call('PEXPIRE', KEYS[1], keep + tonumber(ARGV[3]))
        return {failed, locked_until}
        ",
    )
});

/// Configuration for [`RedisCounterStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix for every key (default: "portal-guard:")
    pub key_prefix: String,
    /// When to stop calling Redis and serve from memory
    pub circuit_breaker: CircuitBreakerConfig,
    /// Entry cap for the in-memory fallback
    pub fallback_max_entries: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "portal-guard:".to_string(),
            circuit_breaker: CircuitBreakerConfig::default(),
            fallback_max_entries: crate::infrastructure::storage::DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Shared [`CounterStore`] on Redis with an in-memory fallback.
pub struct RedisCounterStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    fallback: MemoryCounterStore,
    breaker: CircuitBreaker,
    metrics: Metrics,
    /// Pair used to translate `Instant`s to unix milliseconds
    base_instant: Instant,
    base_unix_ms: u64,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .field("circuit", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        let base_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Self {
            connection,
            fallback: MemoryCounterStore::with_max_entries(config.fallback_max_entries),
            breaker: CircuitBreaker::with_config(config.circuit_breaker.clone()).named("redis"),
            config,
            metrics: Metrics::new(),
            base_instant: Instant::now(),
            base_unix_ms,
        })
    }

    /// Report fallbacks and fallback evictions to `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.fallback = self.fallback.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    fn digest(value: &str) -> String {
        hex::encode(Sha256::digest(value.as_bytes()))
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}rl:{}", self.config.key_prefix, Self::digest(key))
    }

    fn lockout_key(&self, identity: &str) -> String {
        format!("{}lock:{}", self.config.key_prefix, Self::digest(identity))
    }

    fn to_unix_ms(&self, instant: Instant) -> u64 {
        if instant >= self.base_instant {
            self.base_unix_ms + (instant - self.base_instant).as_millis() as u64
        } else {
            self.base_unix_ms
                .saturating_sub((self.base_instant - instant).as_millis() as u64)
        }
    }

    fn from_unix_ms(&self, unix_ms: u64) -> Instant {
        if unix_ms >= self.base_unix_ms {
            self.base_instant + Duration::from_millis(unix_ms - self.base_unix_ms)
        } else {
            self.base_instant
                .checked_sub(Duration::from_millis(self.base_unix_ms - unix_ms))
                .unwrap_or(self.base_instant)
        }
    }

    /// Drive a future to completion from synchronous code.
    ///
    /// Returns `None` when blocking is impossible in the current context.
    fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Some(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            Ok(_) => None,
            Err(_) => match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => Some(runtime.block_on(future)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create tokio runtime for Redis call");
                    None
                }
            },
        }
    }

    /// Run one Redis call, or return `None` if the fallback must be used.
    fn call<T, F, Fut>(&self, op: &'static str, call: F) -> Option<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        if !self.breaker.allow_request() {
            self.metrics.record_store_fallback();
            return None;
        }

        match self.block_on(call(self.connection.clone())) {
            Some(Ok(value)) => {
                self.breaker.record_success();
                Some(value)
            }
            Some(Err(e)) => {
                self.breaker.record_failure();
                self.metrics.record_store_fallback();
                tracing::warn!(error = %e, op, "Redis counter store call failed, using in-memory fallback");
                None
            }
            None => {
                self.metrics.record_store_fallback();
                None
            }
        }
    }
}

impl CounterStore for RedisCounterStore {
    fn increment(&self, key: &str, window: Duration, now: Instant) -> CounterEntry {
        let redis_key = self.counter_key(key);
        let window_ms = window.as_millis().max(1) as u64;

        let reply = self.call("increment", |mut conn| async move {
            let reply: (u32, i64) = INCREMENT
                .key(&redis_key)
                .arg(window_ms)
                .invoke_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(reply)
        });

        match reply {
            Some((count, ttl_ms)) => {
                let reset_at = now + Duration::from_millis(ttl_ms.max(0) as u64);
                CounterEntry {
                    count,
                    window_start: reset_at.checked_sub(window).unwrap_or(now),
                    window,
                }
            }
            None => self.fallback.increment(key, window, now),
        }
    }

    fn peek(&self, key: &str) -> Option<CounterEntry> {
        let redis_key = self.counter_key(key);
        let reply = self.call("peek", |mut conn| async move {
            let reply: Option<(u32, u64, i64)> =
                PEEK.key(&redis_key).invoke_async(&mut conn).await?;
            Ok::<_, RedisError>(reply)
        });

        match reply {
            Some(Some((count, window_ms, ttl_ms))) => {
                let now = Instant::now();
                let window = Duration::from_millis(window_ms);
                let reset_at = now + Duration::from_millis(ttl_ms.max(0) as u64);
                Some(CounterEntry {
                    count,
                    window_start: reset_at.checked_sub(window).unwrap_or(now),
                    window,
                })
            }
            Some(None) => None,
            None => self.fallback.peek(key),
        }
    }

    fn reset(&self, key: &str) {
        let redis_key = self.counter_key(key);
        self.call("reset", |mut conn| async move { conn.del::<_, ()>(&redis_key).await });
        self.fallback.reset(key);
    }

    fn record_failure(&self, identity: &str, policy: &LockoutPolicy, now: Instant) -> LockoutStatus {
        let redis_key = self.lockout_key(identity);
        let now_ms = self.to_unix_ms(now);
        let reset_after_ms = policy.reset_after().as_millis() as u64;
        let tiers: Vec<(u32, u64)> = policy
            .tiers()
            .iter()
            .map(|tier| (tier.threshold, tier.duration.as_millis() as u64))
            .collect();

        let reply = self.call("record_failure", |mut conn| async move {
            let mut invocation = RECORD_FAILURE.key(&redis_key);
            invocation
                .arg(now_ms)
                .arg(reset_after_ms)
                .arg(LOCKOUT_KEY_SLACK_MS);
            for (threshold, duration_ms) in tiers {
                invocation.arg(threshold).arg(duration_ms);
            }
            let reply: (u32, u64) = invocation.invoke_async(&mut conn).await?;
            Ok::<_, RedisError>(reply)
        });

        match reply {
            Some((failed_attempts, locked_until_ms)) => LockoutEntry {
                failed_attempts,
                locked_until: (locked_until_ms > 0).then(|| self.from_unix_ms(locked_until_ms)),
                last_attempt: now,
            }
            .status(now),
            None => self.fallback.record_failure(identity, policy, now),
        }
    }

    fn lockout_entry(&self, identity: &str) -> Option<LockoutEntry> {
        let redis_key = self.lockout_key(identity);
        let reply = self.call("lockout_entry", |mut conn| async move {
            let values: (Option<u32>, Option<u64>, Option<u64>) = redis::cmd("HMGET")
                .arg(&redis_key)
                .arg("failed")
                .arg("locked_until")
                .arg("last")
                .query_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(values)
        });

        match reply {
            Some((Some(failed_attempts), locked_until_ms, last_ms)) => Some(LockoutEntry {
                failed_attempts,
                locked_until: locked_until_ms
                    .filter(|ms| *ms > 0)
                    .map(|ms| self.from_unix_ms(ms)),
                last_attempt: self.from_unix_ms(last_ms.unwrap_or(self.base_unix_ms)),
            }),
            Some(_) => None,
            None => self.fallback.lockout_entry(identity),
        }
    }

    fn clear_lockout(&self, identity: &str) {
        let redis_key = self.lockout_key(identity);
        self.call("clear_lockout", |mut conn| async move {
            conn.del::<_, ()>(&redis_key).await
        });
        self.fallback.clear_lockout(identity);
    }

    /// Redis expires keys natively; only the fallback needs sweeping.
    fn sweep(&self, now: Instant, lockout_retention: Duration) -> usize {
        self.fallback.sweep(now, lockout_retention)
    }

    /// Entries held by the in-memory fallback.
    ///
    /// Counting Redis keys would need a full SCAN, so they are not included.
    fn len(&self) -> usize {
        self.fallback.len()
    }

    fn clear(&self) {
        let pattern = format!("{}*", self.config.key_prefix);
        self.call("clear", |mut conn| async move {
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                if !keys.is_empty() {
                    conn.del::<_, ()>(&keys).await?;
                }
                if next == 0 {
                    return Ok::<(), RedisError>(());
                }
                cursor = next;
            }
        });
        self.fallback.clear();
    }
}
