//! Fixed-window rate limiting backed by a shared counter cache

pub mod counter;
pub mod identity;
pub mod limiter;
pub mod redis_cache;

pub use counter::{CounterCache, MemoryCounterCache};
pub use identity::{client_ip, RequesterIdentity};
pub use limiter::{cache_key, Decision, RateLimiter};
pub use redis_cache::RedisCounterCache;
