//! Per-subscription token-bucket admission control.
//!
//! Each subscription gets a lazily created bucket sized by its
//! `RateLimitConfig`: capacity equals the burst size, refill rate is
//! requests-per-minute divided by sixty. Buckets idle beyond a TTL are
//! evicted to bound memory. All timing goes through `Clock` so tests run on
//! virtual time.

use std::{collections::HashMap, sync::Arc, time::Duration, time::Instant};

use hookrelay_core::{
    models::{RateLimitConfig, SubscriptionId},
    Clock, Error, Result,
};
use tokio::sync::Mutex;
use tracing::debug;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<SubscriptionId, Bucket>>,
    clock: Arc<dyn Clock>,
    idle_ttl: Duration,
}

impl RateLimiter {
    /// Default TTL after which an untouched bucket is dropped.
    pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(15 * 60);

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_idle_ttl(clock, Self::DEFAULT_IDLE_TTL)
    }

    pub fn with_idle_ttl(clock: Arc<dyn Clock>, idle_ttl: Duration) -> Self {
        Self { buckets: Mutex::new(HashMap::new()), clock, idle_ttl }
    }

    /// Takes one token, or reports how long the caller would have to wait
    /// for one.
    pub async fn try_acquire(
        &self,
        id: SubscriptionId,
        config: &RateLimitConfig,
    ) -> std::result::Result<(), Duration> {
        let now = self.clock.now();
        let capacity = f64::from(config.burst.max(1));
        let rate = config.tokens_per_second().max(f64::MIN_POSITIVE);

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(id).or_insert_with(|| Bucket {
            tokens: capacity,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(capacity);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(deficit / rate))
        }
    }

    /// Waits for a token, giving up once the accumulated wait would exceed
    /// `ceiling`.
    pub async fn acquire(
        &self,
        id: SubscriptionId,
        config: &RateLimitConfig,
        ceiling: Duration,
    ) -> Result<()> {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_acquire(id, config).await {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    if waited + wait > ceiling {
                        return Err(Error::RateLimitTimeout { ceiling });
                    }
                    waited += wait;
                    self.clock.sleep(wait).await;
                },
            }
        }
    }

    /// Drops buckets that have not been touched within the idle TTL.
    pub async fn evict_idle(&self) {
        let now = self.clock.now();
        let ttl = self.idle_ttl;
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_used) <= ttl);
        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!(evicted, remaining = buckets.len(), "evicted idle rate-limit buckets");
        }
    }

    #[cfg(test)]
    pub(crate) async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use hookrelay_core::TestClock;

    use super::*;

    fn limiter_with_clock(clock: &TestClock) -> RateLimiter {
        RateLimiter::new(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn burst_grants_immediately_then_throttles() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let id = SubscriptionId::new();
        let config = RateLimitConfig { requests_per_minute: 60, burst: 1 };

        assert!(limiter.try_acquire(id, &config).await.is_ok());

        let wait = limiter.try_acquire(id, &config).await.unwrap_err();
        assert!(wait >= Duration::from_millis(990), "wait was {wait:?}");
        assert!(wait <= Duration::from_millis(1010), "wait was {wait:?}");
    }

    #[tokio::test]
    async fn tokens_refill_with_time() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let id = SubscriptionId::new();
        let config = RateLimitConfig { requests_per_minute: 60, burst: 1 };

        limiter.try_acquire(id, &config).await.unwrap();
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire(id, &config).await.is_ok());
    }

    #[tokio::test]
    async fn grants_are_spaced_at_sustained_rate() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let id = SubscriptionId::new();
        let config = RateLimitConfig { requests_per_minute: 60, burst: 1 };

        let mut grant_times = Vec::new();
        for _ in 0..5 {
            limiter
                .acquire(id, &config, Duration::from_secs(5))
                .await
                .unwrap();
            grant_times.push(clock.elapsed());
        }

        for pair in grant_times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(990), "gap was {gap:?}");
        }
    }

    #[tokio::test]
    async fn acquire_fails_when_wait_exceeds_ceiling() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let id = SubscriptionId::new();
        // One token per minute: any wait is beyond a 2s ceiling.
        let config = RateLimitConfig { requests_per_minute: 1, burst: 1 };

        limiter.try_acquire(id, &config).await.unwrap();

        let err = limiter
            .acquire(id, &config, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitTimeout { .. }));
    }

    #[tokio::test]
    async fn burst_capacity_is_honored() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let id = SubscriptionId::new();
        let config = RateLimitConfig { requests_per_minute: 60, burst: 3 };

        for _ in 0..3 {
            assert!(limiter.try_acquire(id, &config).await.is_ok());
        }
        assert!(limiter.try_acquire(id, &config).await.is_err());
    }

    #[tokio::test]
    async fn idle_buckets_are_evicted() {
        let clock = TestClock::new();
        let limiter = RateLimiter::with_idle_ttl(Arc::new(clock.clone()), Duration::from_secs(60));
        let config = RateLimitConfig::default();

        limiter.try_acquire(SubscriptionId::new(), &config).await.unwrap();
        limiter.try_acquire(SubscriptionId::new(), &config).await.unwrap();
        assert_eq!(limiter.bucket_count().await, 2);

        clock.advance(Duration::from_secs(61));
        limiter.evict_idle().await;
        assert_eq!(limiter.bucket_count().await, 0);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_subscription() {
        let clock = TestClock::new();
        let limiter = limiter_with_clock(&clock);
        let config = RateLimitConfig { requests_per_minute: 60, burst: 1 };

        let a = SubscriptionId::new();
        let b = SubscriptionId::new();

        limiter.try_acquire(a, &config).await.unwrap();
        // Exhausting a's bucket leaves b untouched.
        assert!(limiter.try_acquire(a, &config).await.is_err());
        assert!(limiter.try_acquire(b, &config).await.is_ok());
    }
}
