//! End-to-end tests for the delivery pipeline.
//!
//! Drives the engine against an in-memory store and a wiremock subscriber:
//! circuit breaker behaviour, deterministic rate-limit spacing, manual
//! retry, and outbound signature verification.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use hookrelay_core::{
    events::NoOpEventHandler,
    models::{
        Event, EventId, RateLimitConfig, RetryPolicy, Subscription, SubscriptionId,
        SubscriptionStatus, TenantId,
    },
    store::{MemoryStore, Store},
    time::{RealClock, TestClock},
};
use hookrelay_delivery::{
    signer,
    worker::{DeliveryEngine, EngineConfig},
};
use wiremock::{
    matchers::method,
    Mock, MockServer, ResponseTemplate,
};

fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        workers: 2,
        sweep_interval: Duration::from_millis(20),
        ..EngineConfig::default()
    }
}

fn subscription(tenant_id: TenantId, url: &str, policy: RetryPolicy) -> Subscription {
    let now = Utc::now();
    Subscription {
        id: SubscriptionId::new(),
        tenant_id,
        name: "orders".into(),
        url: url.to_string(),
        event_types: vec!["order.created".into()],
        secret: "whsec_pipeline_test".into(),
        status: SubscriptionStatus::Active,
        status_reason: None,
        consecutive_failures: 0,
        retry_policy: policy,
        rate_limit: RateLimitConfig::default(),
        headers: HashMap::new(),
        metadata: serde_json::Value::Null,
        created_at: now,
        updated_at: now,
        last_triggered_at: None,
    }
}

fn event(tenant_id: TenantId) -> Event {
    Event {
        id: EventId::new(),
        tenant_id,
        event_type: "order.created".into(),
        payload: serde_json::json!({"order_id": 42}),
        source: "test".into(),
        schema_version: "1.0".into(),
        occurred_at: Utc::now(),
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        jitter: 0.0,
        ..RetryPolicy::default()
    }
}

/// Polls until the condition holds or two seconds pass.
async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn breaker_pauses_subscription_after_consecutive_exhaustions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant_id = TenantId::new();
    // One attempt per delivery, so each failure exhausts immediately.
    let sub = subscription(tenant_id, &server.uri(), fast_policy(1));
    store.create_subscription(&sub).await.unwrap();

    let mut engine = DeliveryEngine::new(
        store.clone(),
        Arc::new(RealClock),
        Arc::new(NoOpEventHandler),
        fast_engine_config(),
    )
    .unwrap();
    let dispatcher = engine.dispatcher();
    engine.start();

    for _ in 0..10 {
        dispatcher.publish(&event(tenant_id)).await.unwrap();
    }

    let paused = wait_until(|| async {
        store
            .get_subscription(tenant_id, sub.id)
            .await
            .unwrap()
            .is_some_and(|s| s.status == SubscriptionStatus::Paused)
    })
    .await;
    assert!(paused, "subscription was not paused by the breaker");

    let sub_after = store.get_subscription(tenant_id, sub.id).await.unwrap().unwrap();
    assert!(sub_after.consecutive_failures >= 10);
    assert!(sub_after.status_reason.as_deref().unwrap_or("").contains("auto-paused"));

    // A paused subscription receives no new deliveries.
    let created = dispatcher.publish(&event(tenant_id)).await.unwrap();
    assert!(created.is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn attempts_respect_rate_limit_spacing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clock = Arc::new(TestClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let tenant_id = TenantId::new();

    // One request per second sustained, no burst headroom.
    let mut sub = subscription(tenant_id, &server.uri(), fast_policy(3));
    sub.rate_limit = RateLimitConfig { requests_per_minute: 60, burst: 1 };
    store.create_subscription(&sub).await.unwrap();

    // Workers stay parked; attempts run on the test clock by hand.
    let engine = DeliveryEngine::new(
        store.clone(),
        clock.clone(),
        Arc::new(NoOpEventHandler),
        EngineConfig::default(),
    )
    .unwrap();
    let dispatcher = engine.dispatcher();
    let executor = engine.executor();

    let mut delivery_ids = Vec::new();
    for _ in 0..5 {
        delivery_ids.extend(dispatcher.publish(&event(tenant_id)).await.unwrap());
    }
    assert_eq!(delivery_ids.len(), 5);

    for id in &delivery_ids {
        executor.execute(*id).await.unwrap();
    }

    let mut started = Vec::new();
    for id in &delivery_ids {
        let attempts = store.list_attempts(*id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        started.push(attempts[0].started_at);
    }
    started.sort();

    for pair in started.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap.num_milliseconds() >= 999,
            "attempts spaced {}ms apart, expected >= 1s",
            gap.num_milliseconds()
        );
    }
}

#[tokio::test]
async fn manual_retry_reopens_exhausted_delivery() {
    let server = MockServer::start().await;
    // First attempt fails, the retried one succeeds.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant_id = TenantId::new();
    let sub = subscription(tenant_id, &server.uri(), fast_policy(1));
    store.create_subscription(&sub).await.unwrap();

    let mut engine = DeliveryEngine::new(
        store.clone(),
        Arc::new(RealClock),
        Arc::new(NoOpEventHandler),
        fast_engine_config(),
    )
    .unwrap();
    let dispatcher = engine.dispatcher();
    let scheduler = engine.scheduler();
    engine.start();

    let delivery_ids = dispatcher.publish(&event(tenant_id)).await.unwrap();
    let delivery_id = delivery_ids[0];

    let exhausted = wait_until(|| async {
        store
            .get_delivery(delivery_id)
            .await
            .unwrap()
            .is_some_and(|d| d.status == hookrelay_core::models::DeliveryStatus::Exhausted)
    })
    .await;
    assert!(exhausted, "delivery was not exhausted");

    let reopened = scheduler.retry_manually(tenant_id, delivery_id).await.unwrap();
    // History preserved, exactly one more attempt granted.
    assert_eq!(reopened.attempt_count, 1);
    assert_eq!(reopened.max_attempts, 2);

    let delivered = wait_until(|| async {
        store
            .get_delivery(delivery_id)
            .await
            .unwrap()
            .is_some_and(|d| d.status == hookrelay_core::models::DeliveryStatus::Delivered)
    })
    .await;
    assert!(delivered, "manual retry did not deliver");

    let final_state = store.get_delivery(delivery_id).await.unwrap().unwrap();
    assert_eq!(final_state.attempt_count, 2);
    assert_eq!(store.list_attempts(delivery_id).await.unwrap().len(), 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn outbound_requests_carry_a_verifiable_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant_id = TenantId::new();
    let sub = subscription(tenant_id, &server.uri(), fast_policy(3));
    store.create_subscription(&sub).await.unwrap();

    let mut engine = DeliveryEngine::new(
        store.clone(),
        Arc::new(RealClock),
        Arc::new(NoOpEventHandler),
        fast_engine_config(),
    )
    .unwrap();
    let dispatcher = engine.dispatcher();
    engine.start();

    let delivery_ids = dispatcher.publish(&event(tenant_id)).await.unwrap();
    let delivery_id = delivery_ids[0];

    let delivered = wait_until(|| async {
        store
            .get_delivery(delivery_id)
            .await
            .unwrap()
            .is_some_and(|d| d.status == hookrelay_core::models::DeliveryStatus::Delivered)
    })
    .await;
    assert!(delivered);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let signature = request
        .headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .expect("signature header missing");
    assert!(signer::verify(&sub.secret, &request.body, signature));

    // Tampering with the body breaks verification.
    let mut tampered = request.body.clone();
    tampered[0] ^= 0x01;
    assert!(!signer::verify(&sub.secret, &tampered, signature));

    assert_eq!(
        request
            .headers
            .get("x-webhook-delivery-id")
            .and_then(|v| v.to_str().ok()),
        Some(delivery_id.to_string().as_str())
    );
    assert_eq!(
        request.headers.get("x-webhook-event-type").and_then(|v| v.to_str().ok()),
        Some("order.created")
    );

    engine.shutdown().await;
}
