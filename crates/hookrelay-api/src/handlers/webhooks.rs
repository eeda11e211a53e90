//! Webhook subscription management handlers.
//!
//! CRUD over subscriptions, delivery history for one subscription, the
//! synchronous test-delivery endpoint, and aggregate stats. All routes are
//! tenant-scoped through the `x-tenant-id` header; responses never include
//! the signing secret.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hookrelay_core::{
    models::{DeliveryId, DeliveryStats, DeliveryStatus, EventId, Subscription, SubscriptionId,
        SubscriptionStatus},
    registry::{SubscriptionSpec, SubscriptionUpdate},
    store::{DeliveryFilter, Page, SubscriptionFilter},
    Error,
};
use hookrelay_delivery::{
    client::{self, OutboundRequest, ResponseClass},
    signer,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    extract::TenantScope,
    handlers::deliveries::DeliveryResponse,
    state::AppState,
};

/// Listing parameters for `GET /webhooks`.
#[derive(Debug, Default, Deserialize)]
pub struct ListWebhooksQuery {
    pub status: Option<SubscriptionStatus>,
    pub event_type: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListWebhooksQuery {
    fn into_filter(self) -> SubscriptionFilter {
        let default_page = Page::default();
        SubscriptionFilter {
            status: self.status,
            event_type: self.event_type,
            search: self.search,
            page: Page {
                number: self.page.unwrap_or(default_page.number).max(1),
                size: self.page_size.unwrap_or(default_page.size).clamp(1, 200),
            },
        }
    }
}

/// Listing parameters for `GET /webhooks/{id}/deliveries`.
#[derive(Debug, Default, Deserialize)]
pub struct ListDeliveriesQuery {
    pub status: Option<DeliveryStatus>,
    pub event_type: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListDeliveriesQuery {
    fn into_filter(self) -> DeliveryFilter {
        let default_page = Page::default();
        DeliveryFilter {
            status: self.status,
            event_type: self.event_type,
            page: Page {
                number: self.page.unwrap_or(default_page.number).max(1),
                size: self.page_size.unwrap_or(default_page.size).clamp(1, 200),
            },
        }
    }
}

/// `POST /webhooks`
#[instrument(name = "create_webhook", skip(state, spec), fields(tenant_id = %scope.tenant_id))]
pub async fn create_webhook(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Json(mut spec): Json<SubscriptionSpec>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    if spec.retry_policy.is_none() {
        spec.retry_policy = Some(state.default_retry_policy.clone());
    }
    if spec.rate_limit.is_none() {
        spec.rate_limit = Some(state.default_rate_limit);
    }

    let subscription = state.registry.create(scope, spec).await?;
    info!(subscription_id = %subscription.id, "webhook subscription created");
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// `GET /webhooks`
pub async fn list_webhooks(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Query(query): Query<ListWebhooksQuery>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state.registry.list(scope, &query.into_filter()).await?;
    Ok(Json(subscriptions))
}

/// `GET /webhooks/{id}`
pub async fn get_webhook(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state.registry.get(scope, SubscriptionId::from(id)).await?;
    Ok(Json(subscription))
}

/// `PUT /webhooks/{id}`
#[instrument(name = "update_webhook", skip(state, update), fields(tenant_id = %scope.tenant_id))]
pub async fn update_webhook(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<SubscriptionUpdate>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .registry
        .update(scope, SubscriptionId::from(id), update)
        .await?;
    Ok(Json(subscription))
}

/// `DELETE /webhooks/{id}`
#[instrument(name = "delete_webhook", skip(state), fields(tenant_id = %scope.tenant_id))]
pub async fn delete_webhook(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.registry.delete(scope, SubscriptionId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /webhooks/{id}/deliveries`
pub async fn list_deliveries(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<Vec<DeliveryResponse>>> {
    let subscription_id = SubscriptionId::from(id);
    // Tenant ownership check; a foreign id is indistinguishable from a
    // missing one.
    state.registry.get(scope, subscription_id).await?;

    let deliveries = state
        .store
        .list_deliveries(scope.tenant_id, subscription_id, &query.into_filter())
        .await?;
    Ok(Json(deliveries.iter().map(DeliveryResponse::from).collect()))
}

/// How many of the latest deliveries ride along in the stats payload.
const RECENT_DELIVERIES: u32 = 10;

/// Aggregate counters plus the most recent deliveries.
#[derive(Debug, Serialize)]
pub struct SubscriptionStatsResponse {
    #[serde(flatten)]
    pub stats: DeliveryStats,
    pub recent_deliveries: Vec<DeliveryResponse>,
}

/// `GET /webhooks/{id}/stats`
pub async fn subscription_stats(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionStatsResponse>> {
    let subscription_id = SubscriptionId::from(id);
    state.registry.get(scope, subscription_id).await?;

    let stats = state
        .store
        .subscription_stats(scope.tenant_id, subscription_id)
        .await?;
    let recent = state
        .store
        .list_deliveries(
            scope.tenant_id,
            subscription_id,
            &DeliveryFilter {
                page: Page { number: 1, size: RECENT_DELIVERIES },
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(SubscriptionStatsResponse {
        stats,
        recent_deliveries: recent.iter().map(DeliveryResponse::from).collect(),
    }))
}

/// Optional overrides for the test-delivery endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TestWebhookRequest {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Outcome of a synchronous test delivery.
#[derive(Debug, Serialize)]
pub struct TestWebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /webhooks/{id}/test`
///
/// Sends one signed synthetic delivery to the subscriber and returns the
/// outcome directly. Nothing is recorded in the delivery ledger and no
/// retries are scheduled; this is a connectivity and signature probe.
#[instrument(name = "test_webhook", skip(state, request), fields(tenant_id = %scope.tenant_id))]
pub async fn test_webhook(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<TestWebhookRequest>>,
) -> ApiResult<Json<TestWebhookResponse>> {
    let subscription = state.registry.get(scope, SubscriptionId::from(id)).await?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let event_id = EventId::new();
    let delivery_id = DeliveryId::for_pair(subscription.id, event_id);
    let event_type = request.event_type.unwrap_or_else(|| "webhook.test".to_string());
    let now = state.clock.now_utc();

    let envelope = serde_json::json!({
        "delivery_id": delivery_id,
        "event_id": event_id,
        "event_type": event_type,
        "occurred_at": now,
        "schema_version": "1.0",
        "source": "test",
        "payload": request.payload.unwrap_or_else(|| serde_json::json!({"test": true})),
    });
    let body = serde_json::to_vec(&envelope)
        .map(bytes::Bytes::from)
        .map_err(|e| ApiError(Error::InvalidSpec(format!("payload not serializable: {e}"))))?;

    let signature = signer::sign(&subscription.secret, &body)
        .map_err(|e| ApiError(Error::Signature(e.to_string())))?;

    let outbound = OutboundRequest {
        url: &subscription.url,
        body: &body,
        signature: &signature,
        delivery_id,
        event_type: &event_type,
        timestamp: now,
        custom_headers: &subscription.headers,
    };

    let response = match state.client.send(&outbound).await {
        Ok(response) => TestWebhookResponse {
            success: client::classify(response.status) == ResponseClass::Success,
            status_code: Some(response.status),
            response_body: Some(response.body),
            latency_ms: u64::try_from(response.latency.as_millis()).unwrap_or(u64::MAX),
            error: None,
        },
        Err(e) => TestWebhookResponse {
            success: false,
            status_code: None,
            response_body: None,
            latency_ms: 0,
            error: Some(e.to_string()),
        },
    };

    Ok(Json(response))
}
