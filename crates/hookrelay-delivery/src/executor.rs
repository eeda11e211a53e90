//! Executes a single delivery attempt end to end.
//!
//! Claim, admit through the rate limiter, sign, call, record, classify,
//! and either finalize or hand off to the retry scheduler. The claim
//! transition into `delivering` is the only lock: a delivery that cannot
//! be claimed is silently skipped.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{
    events::{DeliveryEvent, EventHandler},
    models::{AttemptId, Delivery, DeliveryAttempt, DeliveryId, RetryPolicy},
    Clock, Error, Result, Store,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    client::{classify, AttemptResponse, DeliveryClient, OutboundRequest, ResponseClass},
    error::AttemptError,
    rate_limit::RateLimiter,
    scheduler::RetryScheduler,
    signer,
};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Longest the executor waits on the rate limiter before deferring the
    /// attempt.
    pub limiter_wait_ceiling: Duration,
    /// Fixed deferral applied when the limiter wait exceeds its ceiling.
    /// The attempt is pushed back, not failed, and the attempt count does
    /// not move.
    pub defer_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            limiter_wait_ceiling: Duration::from_secs(2),
            defer_delay: Duration::from_secs(1),
        }
    }
}

pub struct DeliveryExecutor {
    store: Arc<dyn Store>,
    client: DeliveryClient,
    limiter: Arc<RateLimiter>,
    scheduler: RetryScheduler,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
    config: ExecutorConfig,
}

impl DeliveryExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        client: DeliveryClient,
        limiter: Arc<RateLimiter>,
        scheduler: RetryScheduler,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, client, limiter, scheduler, clock, events, config }
    }

    /// Runs one attempt for the delivery, if it is claimable.
    pub async fn execute(&self, id: DeliveryId) -> Result<()> {
        let span = info_span!("delivery_attempt", delivery_id = %id);
        self.execute_inner(id).instrument(span).await
    }

    async fn execute_inner(&self, id: DeliveryId) -> Result<()> {
        let Some(delivery) = self.store.claim_delivery(id).await? else {
            // Already delivering, terminal, or gone. Duplicate enqueues
            // land here.
            debug!("delivery not claimable, skipping");
            return Ok(());
        };

        let Some(subscription) = self
            .store
            .get_subscription(delivery.tenant_id, delivery.subscription_id)
            .await?
        else {
            self.store.mark_failed(id, "subscription removed").await?;
            return Ok(());
        };

        // Paused or disabled subscriptions short-circuit queued work.
        if !subscription.is_active() {
            let reason = format!("subscription inactive ({})", subscription.status);
            self.store.mark_failed(id, &reason).await?;
            self.events
                .handle(DeliveryEvent::GaveUp {
                    delivery_id: id,
                    subscription_id: subscription.id,
                    reason,
                })
                .await;
            return Ok(());
        }

        if let Err(Error::RateLimitTimeout { .. }) = self
            .limiter
            .acquire(subscription.id, &subscription.rate_limit, self.config.limiter_wait_ceiling)
            .await
        {
            let next = self.clock.now_utc()
                + chrono::Duration::from_std(self.config.defer_delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(1));
            debug!("rate limiter wait exceeded ceiling, deferring attempt");
            self.store
                .mark_retrying(id, next, "deferred: rate limit wait exceeded")
                .await?;
            return Ok(());
        }

        let attempt_number = delivery.attempt_count + 1;
        self.events
            .handle(DeliveryEvent::AttemptStarted {
                delivery_id: id,
                subscription_id: subscription.id,
                attempt: attempt_number,
            })
            .await;

        let started_at = self.clock.now_utc();
        let started = self.clock.now();

        let outcome = match signer::sign(&delivery.secret, &delivery.body) {
            Ok(signature) => {
                let request = OutboundRequest {
                    url: &delivery.url,
                    body: &delivery.body,
                    signature: &signature,
                    delivery_id: id,
                    event_type: &delivery.event_type,
                    timestamp: started_at,
                    custom_headers: &delivery.headers,
                };
                self.client.send(&request).await
            },
            Err(err) => Err(AttemptError::from(err)),
        };

        match outcome {
            Ok(response) => {
                self.record_response(&delivery, attempt_number, started_at, &response)
                    .await?;
                self.handle_response(&delivery, &subscription.retry_policy, attempt_number, &response)
                    .await?;
                if classify(response.status) == ResponseClass::Success {
                    self.scheduler.record_success(&subscription).await?;
                }
                Ok(())
            },
            Err(err) => {
                let duration = self.clock.now().saturating_duration_since(started);
                let error = err.to_string();
                self.record_error(&delivery, attempt_number, started_at, duration, &error)
                    .await?;
                self.events
                    .handle(DeliveryEvent::AttemptFailed {
                        delivery_id: id,
                        subscription_id: subscription.id,
                        attempt: attempt_number,
                        error: error.clone(),
                    })
                    .await;
                // Timeouts, network failures, and signing failures are all
                // retryable.
                self.scheduler
                    .schedule_retry(&delivery, &subscription.retry_policy, attempt_number, &error, None)
                    .await
            },
        }
    }

    async fn handle_response(
        &self,
        delivery: &Delivery,
        policy: &RetryPolicy,
        attempt_number: u32,
        response: &AttemptResponse,
    ) -> Result<()> {
        match classify(response.status) {
            ResponseClass::Success => {
                self.store.mark_delivered(delivery.id, self.clock.now_utc()).await?;
                info!(status = response.status, attempt = attempt_number, "delivered");
                self.events
                    .handle(DeliveryEvent::Delivered {
                        delivery_id: delivery.id,
                        subscription_id: delivery.subscription_id,
                        attempts: attempt_number,
                    })
                    .await;
                Ok(())
            },
            ResponseClass::Rejected => {
                let reason = format!("subscriber returned {}", response.status);
                warn!(status = response.status, attempt = attempt_number, "delivery rejected");
                self.store.mark_failed(delivery.id, &reason).await?;
                self.events
                    .handle(DeliveryEvent::GaveUp {
                        delivery_id: delivery.id,
                        subscription_id: delivery.subscription_id,
                        reason,
                    })
                    .await;
                Ok(())
            },
            ResponseClass::Retryable => {
                let error = format!("subscriber returned {}", response.status);
                self.events
                    .handle(DeliveryEvent::AttemptFailed {
                        delivery_id: delivery.id,
                        subscription_id: delivery.subscription_id,
                        attempt: attempt_number,
                        error: error.clone(),
                    })
                    .await;
                self.scheduler
                    .schedule_retry(delivery, policy, attempt_number, &error, response.retry_after)
                    .await
            },
        }
    }

    async fn record_response(
        &self,
        delivery: &Delivery,
        attempt_number: u32,
        started_at: chrono::DateTime<chrono::Utc>,
        response: &AttemptResponse,
    ) -> Result<()> {
        self.store
            .record_attempt(&DeliveryAttempt {
                id: AttemptId::new(),
                delivery_id: delivery.id,
                attempt_number,
                status_code: Some(response.status),
                response_body: Some(response.body.clone()),
                error: None,
                duration_ms: response.latency.as_millis() as u64,
                started_at,
            })
            .await
    }

    async fn record_error(
        &self,
        delivery: &Delivery,
        attempt_number: u32,
        started_at: chrono::DateTime<chrono::Utc>,
        duration: Duration,
        error: &str,
    ) -> Result<()> {
        self.store
            .record_attempt(&DeliveryAttempt {
                id: AttemptId::new(),
                delivery_id: delivery.id,
                attempt_number,
                status_code: None,
                response_body: None,
                error: Some(error.to_string()),
                duration_ms: duration.as_millis() as u64,
                started_at,
            })
            .await
    }
}
