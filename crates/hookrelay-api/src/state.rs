//! Shared application state for request handlers.

use std::sync::Arc;

use hookrelay_core::{
    models::{RateLimitConfig, RetryPolicy},
    registry::WebhookRegistry,
    store::Store,
    time::Clock,
};
use hookrelay_delivery::{
    client::{ClientConfig, DeliveryClient},
    dispatcher::EventDispatcher,
    scheduler::RetryScheduler,
    worker::DeliveryEngine,
};

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<WebhookRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    pub scheduler: Arc<RetryScheduler>,
    /// Client used by the synchronous test-delivery endpoint. Separate from
    /// the engine's client so endpoint probing shares its configuration but
    /// not its queue.
    pub client: DeliveryClient,
    /// Policy applied to subscriptions created without one.
    pub default_retry_policy: RetryPolicy,
    /// Rate limit applied to subscriptions created without one.
    pub default_rate_limit: RateLimitConfig,
}

impl AppState {
    /// Builds handler state wired to a delivery engine's queue.
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        engine: &DeliveryEngine,
        client_config: ClientConfig,
        default_retry_policy: RetryPolicy,
        default_rate_limit: RateLimitConfig,
    ) -> hookrelay_core::Result<Self> {
        Ok(Self {
            store: store.clone(),
            clock: clock.clone(),
            registry: Arc::new(WebhookRegistry::new(store, clock)),
            dispatcher: Arc::new(engine.dispatcher()),
            scheduler: Arc::new(engine.scheduler()),
            client: DeliveryClient::new(client_config)?,
            default_retry_policy,
            default_rate_limit,
        })
    }
}
