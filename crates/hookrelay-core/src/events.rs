//! Delivery lifecycle notifications.
//!
//! The executor publishes a `DeliveryEvent` at each significant transition.
//! Handlers observe outcomes without coupling to the delivery pipeline;
//! tests use a recording handler, production wiring is free to add metrics
//! or audit sinks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{DeliveryId, SubscriptionId};

/// Notification emitted by the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// An attempt is about to run.
    AttemptStarted {
        delivery_id: DeliveryId,
        subscription_id: SubscriptionId,
        attempt: u32,
    },
    /// The subscriber acknowledged the delivery.
    Delivered {
        delivery_id: DeliveryId,
        subscription_id: SubscriptionId,
        attempts: u32,
    },
    /// An attempt failed; the delivery may still be retried.
    AttemptFailed {
        delivery_id: DeliveryId,
        subscription_id: SubscriptionId,
        attempt: u32,
        error: String,
    },
    /// The delivery reached a terminal failure state.
    GaveUp {
        delivery_id: DeliveryId,
        subscription_id: SubscriptionId,
        reason: String,
    },
}

/// Observer of delivery lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: DeliveryEvent);
}

/// Handler that ignores every event. Default wiring when nothing observes
/// the pipeline.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

#[async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle(&self, _event: DeliveryEvent) {}
}

/// Fans one event out to several handlers concurrently.
#[derive(Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn add(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }
}

#[async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle(&self, event: DeliveryEvent) {
        let futures = self.handlers.iter().map(|h| h.handle(event.clone()));
        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<DeliveryEvent>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: DeliveryEvent) {
            self.seen.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn multicast_reaches_all_handlers() {
        let a = Arc::new(RecordingHandler::default());
        let b = Arc::new(RecordingHandler::default());

        let mut multicast = MulticastEventHandler::new();
        multicast.add(a.clone());
        multicast.add(b.clone());

        let event = DeliveryEvent::Delivered {
            delivery_id: DeliveryId::for_pair(SubscriptionId::new(), crate::models::EventId::new()),
            subscription_id: SubscriptionId::new(),
            attempts: 1,
        };
        multicast.handle(event.clone()).await;

        assert_eq!(a.seen.lock().unwrap().as_slice(), &[event.clone()]);
        assert_eq!(b.seen.lock().unwrap().as_slice(), &[event]);
    }
}
