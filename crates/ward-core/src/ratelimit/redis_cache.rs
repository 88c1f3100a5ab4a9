//! Redis-backed counter cache shared across server processes

use super::counter::CounterCache;
use crate::error::{Result, WardError};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const CONNECT_RETRIES: usize = 1;

/// No new connection attempt is made this soon after a failed one
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Counter cache over a Redis connection that is opened on first use
///
/// Until Redis answers, every call fails with a dependency error so the
/// limiter can apply its failure policy.
pub struct RedisCounterCache {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    last_failure: Mutex<Option<Instant>>,
}

impl RedisCounterCache {
    /// Parse `url` without connecting
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            manager: OnceCell::new(),
            last_failure: Mutex::new(None),
        })
    }

    /// Connect to the Redis server at `url`, failing if it is unreachable
    pub async fn connect(url: &str) -> Result<Self> {
        let cache = Self::new(url)?;
        cache.connection().await?;

        log::info!("Connected rate-limit counter cache to {}", url);
        Ok(cache)
    }

    fn connection_config() -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_number_of_retries(CONNECT_RETRIES)
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT)
    }

    fn in_backoff(&self) -> bool {
        self.last_failure
            .lock()
            .map(|last| last.map_or(false, |at| at.elapsed() < RECONNECT_BACKOFF))
            .unwrap_or(false)
    }

    fn record_failure(&self) {
        if let Ok(mut last) = self.last_failure.lock() {
            *last = Some(Instant::now());
        }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        if let Some(manager) = self.manager.get() {
            return Ok(manager.clone());
        }
        if self.in_backoff() {
            return Err(WardError::DependencyFailure(
                "redis counter cache unreachable, waiting before reconnecting".to_string(),
            ));
        }

        let connected = self
            .manager
            .get_or_try_init(|| {
                self.client
                    .get_connection_manager_with_config(Self::connection_config())
            })
            .await;

        match connected {
            Ok(manager) => Ok(manager.clone()),
            Err(e) => {
                self.record_failure();
                log::warn!("Redis counter cache connection failed: {}", e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CounterCache for RedisCounterCache {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.connection().await?;
        // INCR and EXPIRE run inside one MULTI/EXEC block
        let (count, _armed): (u64, bool) = redis::pipe()
            .atomic()
            .incr(key, 1_u64)
            .expire(key, ttl.as_secs().max(1) as i64)
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection().await?;
        let count: Option<u64> = conn.get(key).await?;
        Ok(count)
    }
}
