//! Delivery inspection and manual retry handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use hookrelay_core::{
    models::{Delivery, DeliveryAttempt, DeliveryId, DeliveryStatus, EventId, SubscriptionId},
    Error,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{error::ApiResult, extract::TenantScope, state::AppState};

/// Delivery as exposed over the API. The captured signing secret and
/// envelope body stay internal.
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub id: DeliveryId,
    pub subscription_id: SubscriptionId,
    pub event_id: EventId,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&Delivery> for DeliveryResponse {
    fn from(delivery: &Delivery) -> Self {
        Self {
            id: delivery.id,
            subscription_id: delivery.subscription_id,
            event_id: delivery.event_id,
            event_type: delivery.event_type.clone(),
            status: delivery.status,
            attempt_count: delivery.attempt_count,
            max_attempts: delivery.max_attempts,
            url: delivery.url.clone(),
            last_status_code: delivery.last_status_code,
            last_error: delivery.last_error.clone(),
            last_latency_ms: delivery.last_latency_ms,
            next_attempt_at: delivery.next_attempt_at,
            created_at: delivery.created_at,
            updated_at: delivery.updated_at,
            delivered_at: delivery.delivered_at,
        }
    }
}

/// `GET /deliveries/{id}`
pub async fn get_delivery(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeliveryResponse>> {
    let delivery = state
        .store
        .get_delivery(DeliveryId::from(id))
        .await?
        .filter(|d| d.tenant_id == scope.tenant_id)
        .ok_or(Error::NotFound("delivery"))?;
    Ok(Json(DeliveryResponse::from(&delivery)))
}

/// `GET /deliveries/{id}/attempts`
pub async fn list_attempts(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeliveryAttempt>>> {
    let delivery_id = DeliveryId::from(id);
    state
        .store
        .get_delivery(delivery_id)
        .await?
        .filter(|d| d.tenant_id == scope.tenant_id)
        .ok_or(Error::NotFound("delivery"))?;

    let attempts = state.store.list_attempts(delivery_id).await?;
    Ok(Json(attempts))
}

/// `POST /deliveries/{id}/retry`
///
/// Re-opens a delivery in a retryable terminal state for exactly one more
/// attempt. History is preserved; the attempt count does not reset.
#[instrument(name = "retry_delivery", skip(state), fields(tenant_id = %scope.tenant_id))]
pub async fn retry_delivery(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<DeliveryResponse>)> {
    let delivery = state
        .scheduler
        .retry_manually(scope.tenant_id, DeliveryId::from(id))
        .await?;
    info!(delivery_id = %delivery.id, "manual retry accepted");
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse::from(&delivery))))
}
