//! Rate limiting, built entirely on `Cache::increment_with_expiry` so it
//! works identically against any backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::{keys, Cache, CacheResult};

/// Which route class a request belongs to; separate budgets exist for
/// public, authentication, and general routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Public,
    Auth,
    General,
}

impl RouteClass {
    fn scope(self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::Auth => "auth",
            RouteClass::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitBudgets {
    pub public_per_minute: u32,
    pub auth_per_minute: u32,
    pub general_per_minute: u32,
    /// The rate-limit window; the counter's TTL equals this (default 60s).
    pub window: Duration,
}

impl Default for RateLimitBudgets {
    fn default() -> Self {
        Self {
            public_per_minute: 60,
            auth_per_minute: 10,
            general_per_minute: 120,
            window: Duration::from_secs(60),
        }
    }
}

/// Result of checking a single request against its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    /// Reject with a `Retry-After` hint, in seconds, bounded by the window.
    Reject { retry_after_secs: u64 },
}

pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    budgets: RateLimitBudgets,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, budgets: RateLimitBudgets) -> Self {
        Self { cache, budgets }
    }

    fn budget_for(&self, class: RouteClass) -> u32 {
        match class {
            RouteClass::Public => self.budgets.public_per_minute,
            RouteClass::Auth => self.budgets.auth_per_minute,
            RouteClass::General => self.budgets.general_per_minute,
        }
    }

    /// `subject` is the remote IP for unauthenticated routes or the user id
    /// for authenticated ones.
    pub async fn check(&self, subject: &str, class: RouteClass) -> CacheResult<RateLimitDecision> {
        let key = keys::rate_limit(subject, class.scope());
        let count = self
            .cache
            .increment_with_expiry(&key, self.budgets.window)
            .await?;
        let budget = self.budget_for(class) as i64;
        if count > budget {
            let retry_after = self.budgets.window.as_secs().min(60);
            Ok(RateLimitDecision::Reject {
                retry_after_secs: retry_after,
            })
        } else {
            Ok(RateLimitDecision::Allow)
        }
    }
}

/// Convert a rate-limit window into a `chrono::Duration`, used when logging
/// or reporting reset times alongside the plain `Duration` the cache trait
/// takes.
pub fn window_as_chrono(window: Duration) -> ChronoDuration {
    ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    #[tokio::test]
    async fn allows_up_to_budget_then_rejects() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new(
            cache,
            RateLimitBudgets {
                public_per_minute: 3,
                ..Default::default()
            },
        );
        for _ in 0..3 {
            assert_eq!(
                limiter.check("1.2.3.4", RouteClass::Public).await.unwrap(),
                RateLimitDecision::Allow
            );
        }
        match limiter.check("1.2.3.4", RouteClass::Public).await.unwrap() {
            RateLimitDecision::Reject { retry_after_secs } => assert!(retry_after_secs <= 60),
            RateLimitDecision::Allow => panic!("expected rejection past budget"),
        }
    }

    #[tokio::test]
    async fn budgets_are_independent_per_subject() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new(
            cache,
            RateLimitBudgets {
                public_per_minute: 1,
                ..Default::default()
            },
        );
        assert_eq!(
            limiter.check("a", RouteClass::Public).await.unwrap(),
            RateLimitDecision::Allow
        );
        assert_eq!(
            limiter.check("b", RouteClass::Public).await.unwrap(),
            RateLimitDecision::Allow
        );
    }
}
