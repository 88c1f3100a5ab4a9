//! Counter cache abstraction and the in-process implementation

use crate::error::{Result, WardError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Shared key-value counter store used by the rate limiter
///
/// `increment` must be a single atomic operation on the backing store:
/// two concurrent callers never observe the same resulting count.
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// Add one to `key` (creating it at zero) and arm its expiry. Returns the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Current count, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<u64>>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Instant,
}

/// Sweep expired keys once the map grows past this size
const SWEEP_THRESHOLD: usize = 1024;

/// In-memory counter cache for tests and single-process deployments
#[derive(Default)]
pub struct MemoryCounterCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterCache for MemoryCounterCache {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WardError::DependencyFailure("counter cache lock poisoned".to_string()))?;

        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, e| e.expires_at > now);
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + ttl;

        Ok(entry.count)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let entries = self
            .entries
            .lock()
            .map_err(|_| WardError::DependencyFailure("counter cache lock poisoned".to_string()))?;

        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.count))
    }
}
