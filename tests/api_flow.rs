//! End-to-end test of the management surface wired to a running engine.
//!
//! A webhook is registered over the API, an event is published over the
//! API, and the pipeline delivers it to a wiremock subscriber; delivery
//! history, stats, and the synchronous test endpoint are then checked
//! through the same surface.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use hookrelay_api::AppState;
use hookrelay_core::{
    events::NoOpEventHandler,
    models::{RateLimitConfig, RetryPolicy},
    store::MemoryStore,
    time::RealClock,
};
use hookrelay_delivery::{
    client::ClientConfig,
    worker::{DeliveryEngine, EngineConfig},
};
use tower::util::ServiceExt;
use uuid::Uuid;
use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

const TENANT_HEADER: &str = "x-tenant-id";

fn build_stack() -> (Router, DeliveryEngine) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(RealClock);
    let mut engine = DeliveryEngine::new(
        store.clone(),
        clock.clone(),
        Arc::new(NoOpEventHandler),
        EngineConfig {
            workers: 2,
            sweep_interval: Duration::from_millis(20),
            ..EngineConfig::default()
        },
    )
    .unwrap();
    let state = AppState::new(
        store,
        clock,
        &engine,
        ClientConfig::default(),
        RetryPolicy {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        },
        RateLimitConfig::default(),
    )
    .unwrap();
    engine.start();
    (hookrelay_api::create_router(state, Duration::from_secs(5)), engine)
}

fn request(method: &str, uri: &str, tenant: Uuid, body: Option<&serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(TENANT_HEADER, tenant.to_string());
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn register_publish_deliver_and_inspect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (router, engine) = build_stack();
    let tenant = Uuid::new_v4();

    // Register the webhook.
    let webhook = serde_json::json!({
        "name": "orders",
        "url": server.uri(),
        "event_types": ["order.created"],
        "secret": "whsec_api_flow_test",
    });
    let response = router
        .clone()
        .oneshot(request("POST", "/webhooks", tenant, Some(&webhook)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let webhook_id = created["id"].as_str().unwrap().to_string();

    // Publish an event.
    let event = serde_json::json!({
        "event_type": "order.created",
        "payload": {"order_id": 7},
    });
    let response = router
        .clone()
        .oneshot(request("POST", "/events", tenant, Some(&event)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let published = json_body(response).await;
    let delivery_id = published["delivery_ids"][0].as_str().unwrap().to_string();

    // The engine delivers in the background; poll the API for the result.
    let mut delivered = false;
    for _ in 0..200 {
        let response = router
            .clone()
            .oneshot(request("GET", &format!("/deliveries/{delivery_id}"), tenant, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let delivery = json_body(response).await;
        if delivery["status"] == "delivered" {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "delivery did not complete");

    // History for the subscription shows the single delivery.
    let response = router
        .clone()
        .oneshot(request("GET", &format!("/webhooks/{webhook_id}/deliveries"), tenant, None))
        .await
        .unwrap();
    let history = json_body(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    // Stats reflect one successful delivery.
    let response = router
        .clone()
        .oneshot(request("GET", &format!("/webhooks/{webhook_id}/stats"), tenant, None))
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["delivered"], 1);
    let recent = stats["recent_deliveries"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["id"].as_str().unwrap(), delivery_id);
    assert_eq!(recent[0]["status"], "delivered");

    // The attempt ledger is visible and append-only.
    let response = router
        .clone()
        .oneshot(request("GET", &format!("/deliveries/{delivery_id}/attempts"), tenant, None))
        .await
        .unwrap();
    let attempts = json_body(response).await;
    assert_eq!(attempts.as_array().unwrap().len(), 1);
    assert_eq!(attempts[0]["status_code"], 200);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_probes_without_recording() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (router, engine) = build_stack();
    let tenant = Uuid::new_v4();

    let webhook = serde_json::json!({
        "name": "probe",
        "url": server.uri(),
        "event_types": ["*"],
        "secret": "whsec_probe_test",
    });
    let response = router
        .clone()
        .oneshot(request("POST", "/webhooks", tenant, Some(&webhook)))
        .await
        .unwrap();
    let created = json_body(response).await;
    let webhook_id = created["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(request("POST", &format!("/webhooks/{webhook_id}/test"), tenant, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["status_code"], 200);

    // The probe left no trace in the ledger.
    let response = router
        .clone()
        .oneshot(request("GET", &format!("/webhooks/{webhook_id}/deliveries"), tenant, None))
        .await
        .unwrap();
    let history = json_body(response).await;
    assert!(history.as_array().unwrap().is_empty());

    // The subscriber did receive a signed request.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.contains_key("x-webhook-signature"));

    engine.shutdown().await;
}
