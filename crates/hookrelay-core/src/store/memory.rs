//! In-memory `Store` implementation.
//!
//! Backs the test suites and embedded deployments. Semantics mirror the
//! Postgres implementation, including the atomic claim transition and the
//! append-only attempt ledger.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{Error, Result},
    models::{
        Delivery, DeliveryAttempt, DeliveryId, DeliveryStats, DeliveryStatus, Subscription,
        SubscriptionId, SubscriptionStatus, TenantId,
    },
    store::{DeliveryFilter, Store, SubscriptionFilter},
    time::{Clock, RealClock},
};

pub struct MemoryStore {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    deliveries: RwLock<HashMap<DeliveryId, Delivery>>,
    attempts: RwLock<Vec<DeliveryAttempt>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealClock))
    }

    /// Uses the given clock for `updated_at` stamping, so tests can pin
    /// timestamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            deliveries: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_search(subscription: &Subscription, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    subscription.name.to_lowercase().contains(&needle)
        || subscription.url.to_lowercase().contains(&needle)
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        if subs.contains_key(&subscription.id) {
            return Err(Error::Conflict(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        subs.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn get_subscription(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let subs = self.subscriptions.read().await;
        Ok(subs.get(&id).filter(|s| s.tenant_id == tenant_id).cloned())
    }

    async fn list_subscriptions(
        &self,
        tenant_id: TenantId,
        filter: &SubscriptionFilter,
    ) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.read().await;
        let mut matched: Vec<Subscription> = subs
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| {
                filter
                    .event_type
                    .as_deref()
                    .is_none_or(|t| s.matches_event_type(t))
            })
            .filter(|s| filter.search.as_deref().is_none_or(|q| matches_search(s, q)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matched
            .into_iter()
            .skip(filter.page.offset())
            .take(filter.page.limit())
            .collect())
    }

    async fn list_active_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.read().await;
        let mut matched: Vec<Subscription> = subs
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.status == SubscriptionStatus::Active)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        match subs.get_mut(&subscription.id) {
            Some(existing) => {
                let mut updated = subscription.clone();
                updated.updated_at = self.clock.now_utc();
                *existing = updated;
                Ok(())
            },
            None => Err(Error::NotFound("subscription")),
        }
    }

    async fn remove_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.write().await.remove(&id);
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        reason: Option<String>,
    ) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs.get_mut(&id).ok_or(Error::NotFound("subscription"))?;
        sub.status = status;
        sub.status_reason = reason;
        sub.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn increment_consecutive_failures(&self, id: SubscriptionId) -> Result<u32> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs.get_mut(&id).ok_or(Error::NotFound("subscription"))?;
        sub.consecutive_failures += 1;
        sub.updated_at = self.clock.now_utc();
        Ok(sub.consecutive_failures)
    }

    async fn reset_consecutive_failures(&self, id: SubscriptionId) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs.get_mut(&id).ok_or(Error::NotFound("subscription"))?;
        sub.consecutive_failures = 0;
        sub.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn touch_last_triggered(&self, id: SubscriptionId, at: DateTime<Utc>) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs.get_mut(&id).ok_or(Error::NotFound("subscription"))?;
        sub.last_triggered_at = Some(at);
        Ok(())
    }

    async fn deleted_subscriptions(&self, limit: usize) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.read().await;
        let mut matched: Vec<Subscription> = subs
            .values()
            .filter(|s| {
                s.status == SubscriptionStatus::Disabled
                    && s.status_reason.as_deref() == Some(super::DELETED_REASON)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.updated_at);
        matched.truncate(limit);
        Ok(matched)
    }

    async fn insert_delivery_if_absent(&self, delivery: &Delivery) -> Result<bool> {
        let mut deliveries = self.deliveries.write().await;
        if deliveries.contains_key(&delivery.id) {
            return Ok(false);
        }
        deliveries.insert(delivery.id, delivery.clone());
        Ok(true)
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn claim_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        let mut deliveries = self.deliveries.write().await;
        let Some(delivery) = deliveries.get_mut(&id) else {
            return Ok(None);
        };
        match delivery.status {
            DeliveryStatus::Pending | DeliveryStatus::Retrying => {
                delivery.status = DeliveryStatus::Delivering;
                delivery.next_attempt_at = None;
                delivery.updated_at = self.clock.now_utc();
                Ok(Some(delivery.clone()))
            },
            _ => Ok(None),
        }
    }

    async fn mark_delivered(&self, id: DeliveryId, at: DateTime<Utc>) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries.get_mut(&id).ok_or(Error::NotFound("delivery"))?;
        delivery.status = DeliveryStatus::Delivered;
        delivery.delivered_at = Some(at);
        delivery.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn mark_retrying(
        &self,
        id: DeliveryId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries.get_mut(&id).ok_or(Error::NotFound("delivery"))?;
        delivery.status = DeliveryStatus::Retrying;
        delivery.next_attempt_at = Some(next_attempt_at);
        delivery.last_error = Some(error.to_string());
        delivery.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn mark_failed(&self, id: DeliveryId, reason: &str) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries.get_mut(&id).ok_or(Error::NotFound("delivery"))?;
        delivery.status = DeliveryStatus::Failed;
        delivery.next_attempt_at = None;
        delivery.last_error = Some(reason.to_string());
        delivery.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn mark_exhausted(&self, id: DeliveryId, reason: &str) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries.get_mut(&id).ok_or(Error::NotFound("delivery"))?;
        delivery.status = DeliveryStatus::Exhausted;
        delivery.next_attempt_at = None;
        delivery.last_error = Some(reason.to_string());
        delivery.updated_at = self.clock.now_utc();
        Ok(())
    }

    async fn reopen_delivery(&self, id: DeliveryId) -> Result<bool> {
        let mut deliveries = self.deliveries.write().await;
        let Some(delivery) = deliveries.get_mut(&id) else {
            return Ok(false);
        };
        match delivery.status {
            DeliveryStatus::Failed | DeliveryStatus::Exhausted => {
                delivery.status = DeliveryStatus::Pending;
                delivery.max_attempts = delivery.attempt_count + 1;
                delivery.next_attempt_at = None;
                delivery.updated_at = self.clock.now_utc();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries
            .get_mut(&attempt.delivery_id)
            .ok_or(Error::NotFound("delivery"))?;
        delivery.attempt_count = attempt.attempt_number;
        delivery.last_status_code = attempt.status_code;
        delivery.last_response_body = attempt.response_body.clone();
        delivery.last_error = attempt.error.clone();
        delivery.last_latency_ms = Some(attempt.duration_ms);
        delivery.updated_at = self.clock.now_utc();
        drop(deliveries);

        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn list_deliveries(
        &self,
        tenant_id: TenantId,
        subscription_id: SubscriptionId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        let mut matched: Vec<Delivery> = deliveries
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.subscription_id == subscription_id)
            .filter(|d| filter.status.is_none_or(|status| d.status == status))
            .filter(|d| filter.event_type.as_deref().is_none_or(|t| d.event_type == t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matched
            .into_iter()
            .skip(filter.page.offset())
            .take(filter.page.limit())
            .collect())
    }

    async fn list_attempts(&self, delivery_id: DeliveryId) -> Result<Vec<DeliveryAttempt>> {
        let attempts = self.attempts.read().await;
        let mut matched: Vec<DeliveryAttempt> = attempts
            .iter()
            .filter(|a| a.delivery_id == delivery_id)
            .cloned()
            .collect();
        matched.sort_by_key(|a| a.attempt_number);
        Ok(matched)
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DeliveryId>> {
        let deliveries = self.deliveries.read().await;
        let mut due: Vec<(DateTime<Utc>, DeliveryId)> = deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Retrying)
            .filter_map(|d| d.next_attempt_at.filter(|at| *at <= now).map(|at| (at, d.id)))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        Ok(due.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn recover_stranded(
        &self,
        pending_cutoff: DateTime<Utc>,
        delivering_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryId>> {
        let mut deliveries = self.deliveries.write().await;
        let now = self.clock.now_utc();
        let mut stranded: Vec<(DateTime<Utc>, DeliveryId)> = Vec::new();
        for delivery in deliveries.values_mut() {
            match delivery.status {
                DeliveryStatus::Pending if delivery.updated_at <= pending_cutoff => {
                    stranded.push((delivery.updated_at, delivery.id));
                },
                DeliveryStatus::Delivering if delivery.updated_at <= delivering_cutoff => {
                    stranded.push((delivery.updated_at, delivery.id));
                    delivery.status = DeliveryStatus::Pending;
                    delivery.updated_at = now;
                },
                _ => {},
            }
        }
        stranded.sort_by_key(|(at, _)| *at);
        Ok(stranded.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn exhaust_open_deliveries(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
    ) -> Result<u64> {
        let mut deliveries = self.deliveries.write().await;
        let now = self.clock.now_utc();
        let mut moved = 0;
        for delivery in deliveries
            .values_mut()
            .filter(|d| d.subscription_id == subscription_id && !d.status.is_terminal())
        {
            delivery.status = DeliveryStatus::Exhausted;
            delivery.next_attempt_at = None;
            delivery.last_error = Some(reason.to_string());
            delivery.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    async fn open_delivery_count(&self, subscription_id: SubscriptionId) -> Result<u64> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries
            .values()
            .filter(|d| d.subscription_id == subscription_id && !d.status.is_terminal())
            .count() as u64)
    }

    async fn subscription_stats(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<DeliveryStats> {
        let deliveries = self.deliveries.read().await;
        let rows: Vec<&Delivery> = deliveries
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.subscription_id == id)
            .collect();

        let total = rows.len() as u64;
        let delivered = rows
            .iter()
            .filter(|d| d.status == DeliveryStatus::Delivered)
            .count() as u64;
        let failed = rows
            .iter()
            .filter(|d| matches!(d.status, DeliveryStatus::Failed | DeliveryStatus::Exhausted))
            .count() as u64;
        let pending = total - delivered - failed;

        let latencies: Vec<u64> = rows
            .iter()
            .filter(|d| d.status == DeliveryStatus::Delivered)
            .filter_map(|d| d.last_latency_ms)
            .collect();
        let average_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
        };

        Ok(DeliveryStats {
            total,
            delivered,
            failed,
            pending,
            success_rate: if total == 0 { 0.0 } else { delivered as f64 / total as f64 },
            average_latency_ms,
            last_delivery_at: rows.iter().filter_map(|d| d.delivered_at).max(),
        })
    }
}
