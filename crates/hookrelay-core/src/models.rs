//! Core domain models for webhook subscription and delivery tracking.
//!
//! A `Subscription` is a tenant's registered notification target. An `Event`
//! is an immutable fact published by a domain producer. A `Delivery` is one
//! subscription's obligation to receive one event, together with its
//! append-only attempt history.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Unique identifier for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a webhook subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a published event. Assigned by the producer and
/// used as the idempotency seed for delivery ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a delivery.
///
/// Derived deterministically from the subscription and event ids so that
/// re-publishing the same event never creates a second obligation for the
/// same subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Derives the delivery id for a (subscription, event) pair.
    ///
    /// SHA-256 over both raw uuid byte sequences, folded into the first 16
    /// digest bytes. Version and variant bits are patched so the result
    /// still parses as an RFC 4122 uuid.
    pub fn for_pair(subscription_id: SubscriptionId, event_id: EventId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subscription_id.0.as_bytes());
        hasher.update(event_id.0.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a single delivery attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a subscription.
///
/// `active ⇄ paused` transitions happen both manually and through the
/// circuit breaker; `disabled` is terminal and doubles as logical deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Disabled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Current state of a delivery.
///
/// `delivering` acts as the single-attempt lock: a delivery picked up while
/// already delivering is skipped. `delivered` and `exhausted` are terminal
/// (manual retry re-opens exhausted via an explicit operator action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivering,
    Delivered,
    Retrying,
    Failed,
    Exhausted,
}

impl DeliveryStatus {
    /// Whether the delivery has reached a state no scheduler will move it
    /// out of on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Exhausted)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivering" => Ok(Self::Delivering),
            "delivered" => Ok(Self::Delivered),
            "retrying" => Ok(Self::Retrying),
            "failed" => Ok(Self::Failed),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// Backoff progression between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry behaviour for a subscription, copied onto each delivery at
/// creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (>= 1).
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction in [0, 1]. Each computed delay is multiplied by a
    /// uniform factor in [1 - jitter, 1 + jitter]. Zero disables jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}

/// Token-bucket admission settings for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_minute: 600, burst: 10 }
    }
}

impl RateLimitConfig {
    /// Sustained refill rate in tokens per second.
    pub fn tokens_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }
}

/// A tenant's registered notification target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Target URL. Scheme restricted to http/https at creation.
    pub url: String,
    /// Event-type filter. `*` matches every type.
    pub event_types: Vec<String>,
    /// Signing secret. Immutable once set; rotation writes a new value onto
    /// the same record. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub secret: String,
    pub status: SubscriptionStatus,
    /// Recorded reason for the most recent pause or disable, if any.
    pub status_reason: Option<String>,
    /// Exhausted deliveries in a row. Reset on any successful delivery;
    /// crossing the breaker threshold pauses the subscription.
    pub consecutive_failures: u32,
    pub retry_policy: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    /// Custom headers merged into every outbound request.
    pub headers: HashMap<String, String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Whether an event type passes the subscription's filter.
    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == "*" || t == event_type)
    }

    /// Whether the subscription should receive new deliveries.
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// An immutable fact to be broadcast to matching subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source: String,
    pub schema_version: String,
    pub occurred_at: DateTime<Utc>,
}

/// One subscription's obligation to receive one event.
///
/// Target URL, secret, and custom headers are captured at dispatch time so
/// that later subscription edits never change an in-flight delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: DeliveryId,
    pub subscription_id: SubscriptionId,
    pub tenant_id: TenantId,
    pub event_id: EventId,
    pub event_type: String,
    pub status: DeliveryStatus,
    /// Attempts performed so far. Never exceeds `max_attempts`.
    pub attempt_count: u32,
    /// Attempt ceiling copied from the policy at creation. Manual retry of
    /// an exhausted delivery raises it by one instead of resetting history.
    pub max_attempts: u32,
    pub url: String,
    pub secret: String,
    pub headers: HashMap<String, String>,
    /// The exact envelope bytes sent on every attempt. Signatures are
    /// computed over these bytes.
    pub body: Bytes,
    pub last_status_code: Option<u16>,
    pub last_response_body: Option<String>,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    /// Earliest time the next attempt may run, when status is retrying.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Whether another automatic attempt is permitted.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }
}

/// Immutable audit record of a single delivery attempt.
///
/// Attempt records are append-only. The delivery row carries a projection of
/// the latest attempt for quick reads, but history is never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: AttemptId,
    pub delivery_id: DeliveryId,
    /// 1-based attempt ordinal.
    pub attempt_number: u32,
    pub status_code: Option<u16>,
    /// Response body, truncated for storage.
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Aggregate delivery statistics for one subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: u64,
    pub delivered: u64,
    pub failed: u64,
    pub pending: u64,
    /// Delivered / total, in [0, 1]. Zero when no deliveries exist.
    pub success_rate: f64,
    pub average_latency_ms: Option<f64>,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_id_is_deterministic() {
        let sub = SubscriptionId::new();
        let event = EventId::new();

        let a = DeliveryId::for_pair(sub, event);
        let b = DeliveryId::for_pair(sub, event);
        assert_eq!(a, b);
    }

    #[test]
    fn delivery_id_differs_per_subscription() {
        let event = EventId::new();
        let a = DeliveryId::for_pair(SubscriptionId::new(), event);
        let b = DeliveryId::for_pair(SubscriptionId::new(), event);
        assert_ne!(a, b);
    }

    #[test]
    fn delivery_id_has_uuid_version_bits() {
        let id = DeliveryId::for_pair(SubscriptionId::new(), EventId::new());
        assert_eq!(id.0.get_version_num(), 4);
    }

    #[test]
    fn status_roundtrips_through_display() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Delivering,
            DeliveryStatus::Delivered,
            DeliveryStatus::Retrying,
            DeliveryStatus::Failed,
            DeliveryStatus::Exhausted,
        ] {
            let parsed: DeliveryStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Exhausted.is_terminal());
        assert!(!DeliveryStatus::Retrying.is_terminal());
        assert!(!DeliveryStatus::Delivering.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
    }

    #[test]
    fn wildcard_filter_matches_everything() {
        let sub = test_subscription(vec!["*".to_string()]);
        assert!(sub.matches_event_type("model.created"));
        assert!(sub.matches_event_type("report.completed"));
    }

    #[test]
    fn filter_matches_exact_types_only() {
        let sub = test_subscription(vec!["model.created".to_string()]);
        assert!(sub.matches_event_type("model.created"));
        assert!(!sub.matches_event_type("model.deleted"));
    }

    #[test]
    fn secret_is_not_serialized() {
        let sub = test_subscription(vec!["*".to_string()]);
        let json = serde_json::to_value(&sub).unwrap();
        assert!(json.get("secret").is_none());
    }

    fn test_subscription(event_types: Vec<String>) -> Subscription {
        Subscription {
            id: SubscriptionId::new(),
            tenant_id: TenantId::new(),
            name: "test".into(),
            url: "https://example.com/hook".into(),
            event_types,
            secret: "whsec_test".into(),
            status: SubscriptionStatus::Active,
            status_reason: None,
            consecutive_failures: 0,
            retry_policy: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            headers: HashMap::new(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_triggered_at: None,
        }
    }
}
