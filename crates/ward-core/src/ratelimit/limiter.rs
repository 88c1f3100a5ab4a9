//! Fixed-window rate limiter

use super::counter::CounterCache;
use super::identity::RequesterIdentity;
use crate::config::{FailurePolicy, RateLimitPolicy};
use crate::error::{Result, WardError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use ward_types::{Actor, Role};

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the current window closes
    pub reset_at: u64,
    pub retry_after_seconds: u64,
}

impl Decision {
    /// Turn a denied decision into `RateLimitExceeded`
    pub fn into_result(self) -> Result<Decision> {
        if self.allowed {
            Ok(self)
        } else {
            Err(WardError::RateLimitExceeded {
                retry_after: self.retry_after_seconds,
            })
        }
    }
}

/// Cache key for one limiter, requester and window
pub fn cache_key(limiter: &str, identity: &RequesterIdentity, window_index: u64) -> String {
    format!("ratelimit:{}:{}:{}", limiter, identity, window_index)
}

pub struct RateLimiter {
    cache: Arc<dyn CounterCache>,
    failure_policy: FailurePolicy,
    exempt_roles: Vec<Role>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CounterCache>, failure_policy: FailurePolicy) -> Self {
        Self {
            cache,
            failure_policy,
            exempt_roles: Vec::new(),
        }
    }

    pub fn with_exempt_roles(mut self, roles: Vec<Role>) -> Self {
        self.exempt_roles = roles;
        self
    }

    /// Staff accounts and exempt roles skip the limiter entirely
    pub fn is_exempt(&self, actor: Option<&Actor>) -> bool {
        actor.map_or(false, |a| a.is_staff || self.exempt_roles.contains(&a.role))
    }

    /// Count this request against `policy` using the wall clock
    pub async fn check(
        &self,
        limiter: &str,
        identity: &RequesterIdentity,
        policy: RateLimitPolicy,
    ) -> Result<Decision> {
        self.check_and_increment(limiter, identity, policy.limit, policy.window_seconds)
            .await
    }

    pub async fn check_and_increment(
        &self,
        limiter: &str,
        identity: &RequesterIdentity,
        limit: u64,
        window_seconds: u64,
    ) -> Result<Decision> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.check_and_increment_at(limiter, identity, limit, window_seconds, now)
            .await
    }

    /// Same as `check_and_increment` with an explicit clock reading in epoch seconds
    pub async fn check_and_increment_at(
        &self,
        limiter: &str,
        identity: &RequesterIdentity,
        limit: u64,
        window_seconds: u64,
        now: u64,
    ) -> Result<Decision> {
        if window_seconds == 0 {
            return Err(WardError::Validation(
                "rate limit window must be positive".to_string(),
            ));
        }

        let window_index = now / window_seconds;
        let retry_after = window_seconds - now % window_seconds;
        let key = cache_key(limiter, identity, window_index);

        // The attempt is recorded even when it ends up over the limit
        let count = match self
            .cache
            .increment(&key, Duration::from_secs(retry_after + 1))
            .await
        {
            Ok(count) => count,
            Err(e) => return self.on_cache_failure(limiter, identity, limit, now, retry_after, e),
        };

        let allowed = count <= limit;
        if !allowed {
            log::warn!(
                "Rate limit exceeded: {} on {} ({} > {} in {}s)",
                identity,
                limiter,
                count,
                limit,
                window_seconds
            );
        }

        Ok(Decision {
            allowed,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: now + retry_after,
            retry_after_seconds: retry_after,
        })
    }

    fn on_cache_failure(
        &self,
        limiter: &str,
        identity: &RequesterIdentity,
        limit: u64,
        now: u64,
        retry_after: u64,
        error: WardError,
    ) -> Result<Decision> {
        match self.failure_policy {
            FailurePolicy::FailOpen => {
                log::warn!(
                    "Counter cache unavailable for {} on {}, admitting request: {}",
                    identity,
                    limiter,
                    error
                );
                Ok(Decision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_at: now + retry_after,
                    retry_after_seconds: retry_after,
                })
            }
            FailurePolicy::FailClosed => {
                log::error!(
                    "Counter cache unavailable for {} on {}, refusing request: {}",
                    identity,
                    limiter,
                    error
                );
                Err(WardError::DependencyFailure(format!(
                    "rate limit counter cache unavailable: {}",
                    error
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MemoryCounterCache;
    use async_trait::async_trait;
    use ward_types::UserId;

    struct UnreachableCache;

    #[async_trait]
    impl CounterCache for UnreachableCache {
        async fn increment(&self, _key: &str, _ttl: Duration) -> Result<u64> {
            Err(WardError::DependencyFailure("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<u64>> {
            Err(WardError::DependencyFailure("connection refused".to_string()))
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterCache::new()), FailurePolicy::FailOpen)
    }

    fn user(id: i64) -> RequesterIdentity {
        RequesterIdentity::User(UserId::new(id))
    }

    #[tokio::test]
    async fn test_first_limit_requests_allowed_then_denied() {
        let limiter = limiter();
        let identity = user(7);
        let now = 7_200 + 100;

        for i in 1..=3 {
            let decision = limiter
                .check_and_increment_at("letter_request", &identity, 3, 3600, now)
                .await
                .unwrap();
            assert!(decision.allowed, "request {} should be allowed", i);
            assert_eq!(decision.remaining, 3 - i);
        }

        for _ in 0..2 {
            let decision = limiter
                .check_and_increment_at("letter_request", &identity, 3, 3600, now)
                .await
                .unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.remaining, 0);
            assert_eq!(decision.retry_after_seconds, 3500);
            assert_eq!(decision.reset_at, 10_800);
        }
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        let limiter = limiter();
        let identity = user(7);
        let t = 1_000;

        assert!(limiter.check_and_increment_at("l", &identity, 1, 60, t).await.unwrap().allowed);
        assert!(!limiter.check_and_increment_at("l", &identity, 1, 60, t).await.unwrap().allowed);

        let next = limiter
            .check_and_increment_at("l", &identity, 1, 60, t + 60)
            .await
            .unwrap();
        assert!(next.allowed);
        assert_eq!(next.remaining, 0);
    }

    #[tokio::test]
    async fn test_limiters_and_identities_are_independent() {
        let limiter = limiter();
        let now = 500;
        assert!(limiter.check_and_increment_at("a", &user(1), 1, 60, now).await.unwrap().allowed);
        assert!(limiter.check_and_increment_at("b", &user(1), 1, 60, now).await.unwrap().allowed);
        assert!(limiter.check_and_increment_at("a", &user(2), 1, 60, now).await.unwrap().allowed);
        assert!(!limiter.check_and_increment_at("a", &user(1), 1, 60, now).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_concurrent_requests_admit_exactly_limit() {
        let limiter = Arc::new(limiter());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .check_and_increment_at("race", &user(9), 5, 60, 120)
                    .await
                    .unwrap()
                    .allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn test_fail_open_admits_when_cache_unreachable() {
        let limiter = RateLimiter::new(Arc::new(UnreachableCache), FailurePolicy::FailOpen);
        let decision = limiter
            .check_and_increment_at("l", &user(1), 4, 60, 30)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_fail_closed_reports_dependency_failure() {
        let limiter = RateLimiter::new(Arc::new(UnreachableCache), FailurePolicy::FailClosed);
        let err = limiter
            .check_and_increment_at("l", &user(1), 4, 60, 30)
            .await
            .unwrap_err();
        assert!(matches!(err, WardError::DependencyFailure(_)));
    }

    #[tokio::test]
    async fn test_denied_decision_converts_to_error() {
        let limiter = limiter();
        limiter.check_and_increment_at("l", &user(1), 1, 60, 0).await.unwrap();
        let denied = limiter.check_and_increment_at("l", &user(1), 1, 60, 10).await.unwrap();
        match denied.into_result() {
            Err(WardError::RateLimitExceeded { retry_after }) => assert_eq!(retry_after, 50),
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_exemptions() {
        let limiter = limiter().with_exempt_roles(vec![Role::Admin]);
        let admin = Actor::new(1, "leader", Role::Admin);
        let clerk = Actor::new(2, "clerk", Role::Clerk);
        let staff_resident = Actor::new(3, "ops", Role::Resident).staff();

        assert!(limiter.is_exempt(Some(&admin)));
        assert!(!limiter.is_exempt(Some(&clerk)));
        assert!(limiter.is_exempt(Some(&staff_resident)));
        assert!(!limiter.is_exempt(None));
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(
            cache_key("letter_request", &user(5), 478_000),
            "ratelimit:letter_request:user:5:478000"
        );
    }
}
