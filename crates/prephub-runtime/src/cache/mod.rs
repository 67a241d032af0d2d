//! Two-tier response cache.
//!
//! The fast tier is an in-process moka cache with its own short lifetime.
//! The optional durable tier is any [`DurableStore`]. Reads try fast then
//! durable (backfilling fast on a durable hit); writes go to both. Expiry
//! is judged against an injectable [`Clock`], so a fast-tier entry never
//! outlives the entry's own expiry.
//!
//! Cache operations never fail the caller: durable-store errors are logged
//! and treated as a miss or a skipped write.

mod clock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheRecord, DurableStore, FileStore, MemoryStore, StoreError};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct FastEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Read-through, write-through cache of generated payloads.
pub struct ResponseCache {
    fast: Cache<String, FastEntry>,
    fast_ttl: Duration,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Fast tier only, real clock.
    pub fn new(config: &CacheConfig) -> Self {
        let fast = Cache::builder()
            .max_capacity(config.fast_capacity)
            .time_to_live(config.fast_ttl)
            .build();

        Self {
            fast,
            fast_ttl: config.fast_ttl,
            durable: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attach a durable tier.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Replace the clock used for expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Look up a live value.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();

        if let Some(entry) = self.fast.get(key).await {
            if entry.expires_at > now {
                tracing::debug!(key = %key, tier = "fast", "Cache hit");
                return Some(entry.value);
            }
            self.fast.invalidate(key).await;
        }

        let store = self.durable.as_ref()?;
        match store.find_one(key).await {
            Ok(Some(record)) if record.is_live(now) => {
                let expires_at = record.expires_at.min(clock::add(now, self.fast_ttl));
                self.fast
                    .insert(
                        key.to_string(),
                        FastEntry {
                            value: record.value.clone(),
                            expires_at,
                        },
                    )
                    .await;
                tracing::debug!(key = %key, tier = "durable", "Cache hit");
                Some(record.value)
            }
            Ok(_) => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Durable cache read failed");
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = clock::add(now, ttl);
        let fast_expires_at = expires_at.min(clock::add(now, self.fast_ttl));

        if let Some(store) = &self.durable {
            if let Err(e) = store.upsert(key, &value, expires_at).await {
                tracing::warn!(key = %key, error = %e, "Durable cache write failed");
            }
        }

        self.fast
            .insert(
                key.to_string(),
                FastEntry {
                    value,
                    expires_at: fast_expires_at,
                },
            )
            .await;
    }

    /// Drop `key` from both tiers.
    ///
    /// The durable record is overwritten with an already-expired one.
    pub async fn invalidate(&self, key: &str) {
        self.fast.invalidate(key).await;
        if let Some(store) = &self.durable {
            let expired = self.clock.now() - chrono::Duration::seconds(1);
            if let Err(e) = store.upsert(key, &Value::Null, expired).await {
                tracing::warn!(key = %key, error = %e, "Durable cache invalidation failed");
            }
        }
    }

    /// Approximate number of fast-tier entries.
    pub fn entry_count(&self) -> u64 {
        self.fast.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("fast_ttl", &self.fast_ttl)
            .field("durable", &self.durable.is_some())
            .field("clock", &self.clock)
            .finish()
    }
}
