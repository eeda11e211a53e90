//! Event ingest handler.
//!
//! Producers publish events here; the dispatcher fans them out into
//! delivery records and the bounded queue. The response returns once every
//! matching delivery is enqueued, never after the outbound calls complete.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use hookrelay_core::models::{DeliveryId, Event, EventId};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{error::ApiResult, extract::TenantScope, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    /// Producer-assigned event id. Re-publishing with the same id is
    /// idempotent. Generated when omitted.
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    pub event_id: EventId,
    /// Deliveries created by this publish. Already-existing deliveries for
    /// the same (subscription, event) pair are not listed again.
    pub delivery_ids: Vec<DeliveryId>,
}

/// `POST /events`
#[instrument(
    name = "publish_event",
    skip(state, request),
    fields(tenant_id = %scope.tenant_id, event_type = %request.event_type)
)]
pub async fn publish_event(
    TenantScope(scope): TenantScope,
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> ApiResult<(StatusCode, Json<PublishEventResponse>)> {
    let event = Event {
        id: request.event_id.map(EventId::from).unwrap_or_default(),
        tenant_id: scope.tenant_id,
        event_type: request.event_type,
        payload: request.payload,
        source: request.source.unwrap_or_else(|| "api".to_string()),
        schema_version: request.schema_version.unwrap_or_else(|| "1.0".to_string()),
        occurred_at: request.occurred_at.unwrap_or_else(|| state.clock.now_utc()),
    };

    let delivery_ids = state.dispatcher.publish(&event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PublishEventResponse { event_id: event.id, delivery_ids }),
    ))
}
