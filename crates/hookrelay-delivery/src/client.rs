//! Outbound HTTP client for delivery attempts.
//!
//! Redirects are never followed: a 3xx counts as a failure, since following
//! one would deliver a signed payload to a target the signature was not
//! computed for. Response bodies are read up to a cap and truncated again
//! before storage.

use std::{collections::HashMap, time::Duration, time::Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hookrelay_core::models::DeliveryId;
use hookrelay_core::{Error, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER},
    redirect::Policy,
};
use tracing::{debug, warn};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const DELIVERY_ID_HEADER: &str = "x-webhook-delivery-id";
pub const EVENT_TYPE_HEADER: &str = "x-webhook-event-type";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Cap on bytes read from a subscriber response.
const MAX_RESPONSE_READ: usize = 64 * 1024;
/// Cap on the response prefix kept in the attempt record.
const MAX_STORED_BODY: usize = 1024;

/// What an HTTP status means for the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx: the subscriber acknowledged the delivery.
    Success,
    /// Subscriber-side data error (3xx, or 4xx other than 429). Retrying
    /// will not help.
    Rejected,
    /// 429 or 5xx: worth another attempt.
    Retryable,
}

/// Classifies a subscriber status code.
pub fn classify(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        300..=499 => ResponseClass::Rejected,
        _ => ResponseClass::Retryable,
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Outbound call timeout, connection establishment included.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("hookrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One outbound request, fully prepared by the executor.
#[derive(Debug)]
pub struct OutboundRequest<'a> {
    pub url: &'a str,
    pub body: &'a Bytes,
    pub signature: &'a str,
    pub delivery_id: DeliveryId,
    pub event_type: &'a str,
    pub timestamp: DateTime<Utc>,
    /// Subscriber-configured headers, merged after the standard set.
    pub custom_headers: &'a HashMap<String, String>,
}

/// Subscriber response, trimmed for recording.
#[derive(Debug, Clone)]
pub struct AttemptResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
    pub latency: Duration,
}

#[derive(Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
}

impl DeliveryClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| Error::InvalidSpec(format!("http client config: {e}")))?;
        Ok(Self { http })
    }

    /// Performs one delivery attempt and returns the subscriber response.
    ///
    /// Transport-level failures (timeout, connect, protocol) come back as
    /// `AttemptError`; any received status code, including 3xx and 5xx, is
    /// a response.
    pub async fn send(
        &self,
        request: &OutboundRequest<'_>,
    ) -> std::result::Result<AttemptResponse, crate::error::AttemptError> {
        let headers = build_headers(request);
        let started = Instant::now();

        let result = self
            .http
            .post(request.url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await;

        let latency = started.elapsed();
        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);

                let raw = response.bytes().await.unwrap_or_default();
                let read = &raw[..raw.len().min(MAX_RESPONSE_READ)];
                let body = truncate_utf8(read, MAX_STORED_BODY);

                debug!(
                    delivery_id = %request.delivery_id,
                    status,
                    latency_ms = latency.as_millis() as u64,
                    "delivery attempt completed"
                );
                Ok(AttemptResponse { status, body, retry_after, latency })
            },
            Err(err) if err.is_timeout() => Err(crate::error::AttemptError::Timeout),
            Err(err) => Err(crate::error::AttemptError::Network(err.to_string())),
        }
    }
}

fn build_headers(request: &OutboundRequest<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let standard = [
        (SIGNATURE_HEADER, request.signature.to_string()),
        (DELIVERY_ID_HEADER, request.delivery_id.to_string()),
        (EVENT_TYPE_HEADER, request.event_type.to_string()),
        (TIMESTAMP_HEADER, request.timestamp.to_rfc3339()),
    ];
    for (name, value) in standard {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }

    for (name, value) in request.custom_headers {
        if is_managed_header(name) {
            warn!(header = %name, "skipping custom header that shadows a managed one");
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            },
            _ => warn!(header = %name, "skipping invalid custom header"),
        }
    }

    headers
}

/// Headers the pipeline owns; custom headers may not override them.
fn is_managed_header(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "content-type"
        || lower == "content-length"
        || lower == "host"
        || lower == "user-agent"
        || lower.starts_with("x-webhook-")
}

/// Parses a Retry-After value: delay seconds or an HTTP date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let target = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = target.with_timezone(&Utc) - Utc::now();
    delta.to_std().ok()
}

/// Truncates to `max` bytes, backing up to a UTF-8 boundary.
fn truncate_utf8(bytes: &[u8], max: usize) -> String {
    let slice = &bytes[..bytes.len().min(max)];
    match std::str::from_utf8(slice) {
        Ok(s) => s.to_string(),
        Err(e) => String::from_utf8_lossy(&slice[..e.valid_up_to()]).into_owned(),
    }
}
