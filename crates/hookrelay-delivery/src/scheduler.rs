//! Retry scheduling, exhaustion, and the subscription-level circuit breaker.
//!
//! Per-delivery retry is bounded by the attempt ceiling captured at
//! creation. Exhaustion feeds the subscription's consecutive-failure
//! counter; crossing the threshold pauses the subscription with a recorded
//! reason. Manual retry re-opens a terminal delivery without erasing its
//! attempt history.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{
    events::{DeliveryEvent, EventHandler},
    models::{
        Delivery, DeliveryId, RetryPolicy, Subscription, SubscriptionStatus, TenantId,
    },
    Clock, Error, Result, Store,
};
use tracing::{info, warn};

use crate::{
    queue::QueueHandle,
    retry::{self, RetryDecision},
};

/// Subscription-level breaker settings.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive exhausted deliveries that trigger an auto-pause.
    pub pause_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { pause_threshold: 10 }
    }
}

pub struct RetryScheduler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    queue: QueueHandle,
    events: Arc<dyn EventHandler>,
    breaker: CircuitBreakerConfig,
}

impl RetryScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        queue: QueueHandle,
        events: Arc<dyn EventHandler>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self { store, clock, queue, events, breaker }
    }

    /// Handles a retryable failure for a delivery that just recorded its
    /// n-th attempt.
    ///
    /// Either schedules the next attempt after backoff or exhausts the
    /// delivery and advances the circuit breaker.
    pub async fn schedule_retry(
        &self,
        delivery: &Delivery,
        policy: &RetryPolicy,
        attempt_number: u32,
        error: &str,
        retry_after: Option<Duration>,
    ) -> Result<()> {
        let now = self.clock.now_utc();
        match retry::decide(policy, attempt_number, delivery.max_attempts, retry_after, now) {
            RetryDecision::Retry { delay, next_attempt_at } => {
                info!(
                    delivery_id = %delivery.id,
                    attempt = attempt_number,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling retry"
                );
                self.store.mark_retrying(delivery.id, next_attempt_at, error).await
            },
            RetryDecision::GiveUp => self.exhaust(delivery, error).await,
        }
    }

    async fn exhaust(&self, delivery: &Delivery, error: &str) -> Result<()> {
        let reason = format!("retry attempts exhausted: {error}");
        self.store.mark_exhausted(delivery.id, &reason).await?;
        self.events
            .handle(DeliveryEvent::GaveUp {
                delivery_id: delivery.id,
                subscription_id: delivery.subscription_id,
                reason: reason.clone(),
            })
            .await;

        let failures = self
            .store
            .increment_consecutive_failures(delivery.subscription_id)
            .await?;
        warn!(
            delivery_id = %delivery.id,
            subscription_id = %delivery.subscription_id,
            consecutive_failures = failures,
            "delivery exhausted"
        );

        if failures >= self.breaker.pause_threshold {
            let reason = format!(
                "auto-paused after {failures} consecutive exhausted deliveries"
            );
            self.store
                .set_subscription_status(
                    delivery.subscription_id,
                    SubscriptionStatus::Paused,
                    Some(reason.clone()),
                )
                .await?;
            warn!(subscription_id = %delivery.subscription_id, %reason, "circuit breaker opened");
        }
        Ok(())
    }

    /// Operator-triggered retry of a delivery in a retryable terminal
    /// state.
    ///
    /// Keeps the attempt count (history is preserved) and grants exactly
    /// one more attempt, then re-enqueues immediately. Fails `Conflict`
    /// when the delivery is not terminal-retryable or its subscription is
    /// disabled.
    pub async fn retry_manually(
        &self,
        tenant_id: TenantId,
        delivery_id: DeliveryId,
    ) -> Result<Delivery> {
        let delivery = self
            .store
            .get_delivery(delivery_id)
            .await?
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or(Error::NotFound("delivery"))?;

        let subscription = self
            .store
            .get_subscription(tenant_id, delivery.subscription_id)
            .await?
            .ok_or(Error::NotFound("subscription"))?;
        if subscription.status == SubscriptionStatus::Disabled {
            return Err(Error::Conflict("subscription is disabled".into()));
        }

        if !self.store.reopen_delivery(delivery_id).await? {
            return Err(Error::Conflict(
                "delivery is not in a retryable terminal state".into(),
            ));
        }

        self.queue.submit(delivery_id).await?;
        info!(delivery_id = %delivery_id, "manual retry enqueued");

        self.store
            .get_delivery(delivery_id)
            .await?
            .ok_or(Error::NotFound("delivery"))
    }

    /// Resets the breaker counter after a successful delivery.
    pub async fn record_success(&self, subscription: &Subscription) -> Result<()> {
        if subscription.consecutive_failures > 0 {
            info!(
                subscription_id = %subscription.id,
                "subscriber recovered, resetting failure counter"
            );
        }
        self.store.reset_consecutive_failures(subscription.id).await
    }
}
