//! Fans published events out into delivery obligations.
//!
//! `publish` is the producers' entry point. It matches the event against
//! the tenant's active subscriptions, creates one delivery per match with a
//! deterministic id, and enqueues the new work. It returns as soon as the
//! records exist and the ids are on the queue; subscriber-side failures are
//! never surfaced here.

use std::sync::Arc;

use bytes::Bytes;
use hookrelay_core::{
    models::{Delivery, DeliveryId, DeliveryStatus, Event, Subscription},
    Clock, Error, Result, Store,
};
use tracing::{debug, info};

use crate::queue::QueueHandle;

pub struct EventDispatcher {
    store: Arc<dyn Store>,
    queue: QueueHandle,
    clock: Arc<dyn Clock>,
}

impl EventDispatcher {
    pub fn new(store: Arc<dyn Store>, queue: QueueHandle, clock: Arc<dyn Clock>) -> Self {
        Self { store, queue, clock }
    }

    /// Creates and enqueues deliveries for every active subscription whose
    /// filter matches the event. Returns the ids of deliveries created by
    /// this call; re-publishing an already dispatched event returns an
    /// empty list for the subscriptions that were already covered.
    pub async fn publish(&self, event: &Event) -> Result<Vec<DeliveryId>> {
        if event.event_type.trim().is_empty() {
            return Err(Error::InvalidSpec("event type must not be empty".into()));
        }

        let subscriptions = self.store.list_active_subscriptions(event.tenant_id).await?;
        let mut created = Vec::new();

        for subscription in subscriptions
            .iter()
            .filter(|s| s.matches_event_type(&event.event_type))
        {
            let delivery = self.build_delivery(subscription, event)?;
            let id = delivery.id;

            if !self.store.insert_delivery_if_absent(&delivery).await? {
                debug!(
                    delivery_id = %id,
                    subscription_id = %subscription.id,
                    "delivery already exists, idempotent no-op"
                );
                continue;
            }

            self.queue.submit(id).await?;
            self.store
                .touch_last_triggered(subscription.id, self.clock.now_utc())
                .await?;
            created.push(id);
        }

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            deliveries = created.len(),
            "event published"
        );
        Ok(created)
    }

    /// Builds the delivery with the envelope and subscriber settings
    /// captured at dispatch time, so later subscription edits do not touch
    /// it.
    fn build_delivery(&self, subscription: &Subscription, event: &Event) -> Result<Delivery> {
        let id = DeliveryId::for_pair(subscription.id, event.id);
        let envelope = serde_json::json!({
            "delivery_id": id,
            "event_id": event.id,
            "event_type": event.event_type,
            "occurred_at": event.occurred_at,
            "schema_version": event.schema_version,
            "source": event.source,
            "payload": event.payload,
        });
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| Error::InvalidSpec(format!("event payload not serializable: {e}")))?;

        let now = self.clock.now_utc();
        Ok(Delivery {
            id,
            subscription_id: subscription.id,
            tenant_id: subscription.tenant_id,
            event_id: event.id,
            event_type: event.event_type.clone(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: subscription.retry_policy.max_attempts.max(1),
            url: subscription.url.clone(),
            secret: subscription.secret.clone(),
            headers: subscription.headers.clone(),
            body: Bytes::from(body),
            last_status_code: None,
            last_response_body: None,
            last_error: None,
            last_latency_ms: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        })
    }
}
