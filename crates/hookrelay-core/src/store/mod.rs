//! Storage contract for subscriptions and the delivery ledger.
//!
//! The pipeline talks to persistence only through the `Store` trait so the
//! engine can run against Postgres in production and the in-memory store in
//! tests or embedded setups. Attempt records are append-only; the delivery
//! row carries a projection of the latest attempt.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    models::{
        Delivery, DeliveryAttempt, DeliveryId, DeliveryStats, DeliveryStatus, Subscription,
        SubscriptionId, SubscriptionStatus, TenantId,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Status reason marking a subscription as logically deleted and awaiting
/// drain.
pub const DELETED_REASON: &str = "deleted";

/// Pagination window, 1-based.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 50 }
    }
}

impl Page {
    pub fn offset(&self) -> usize {
        (self.number.saturating_sub(1) as usize) * self.size as usize
    }

    pub fn limit(&self) -> usize {
        self.size as usize
    }
}

/// Filters for subscription listing.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
    /// Matches subscriptions whose filter set contains this event type.
    pub event_type: Option<String>,
    /// Case-insensitive substring match on name and URL.
    pub search: Option<String>,
    pub page: Page,
}

/// Filters for delivery history listing.
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
    pub event_type: Option<String>,
    pub page: Page,
}

/// Persistence seam for subscriptions, deliveries, and attempt records.
///
/// All subscription reads are tenant-scoped; an id owned by another tenant
/// behaves exactly like a missing id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity probe for readiness checks.
    async fn health_check(&self) -> Result<()>;

    // Subscriptions

    async fn create_subscription(&self, subscription: &Subscription) -> Result<()>;

    async fn get_subscription(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>>;

    async fn list_subscriptions(
        &self,
        tenant_id: TenantId,
        filter: &SubscriptionFilter,
    ) -> Result<Vec<Subscription>>;

    /// All subscriptions for a tenant with status `active`.
    async fn list_active_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>>;

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Physically removes a subscription row. Logical deletion goes through
    /// `set_subscription_status` with `Disabled`.
    async fn remove_subscription(&self, id: SubscriptionId) -> Result<()>;

    async fn set_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        reason: Option<String>,
    ) -> Result<()>;

    /// Increments the consecutive-exhaustion counter and returns the new
    /// value.
    async fn increment_consecutive_failures(&self, id: SubscriptionId) -> Result<u32>;

    async fn reset_consecutive_failures(&self, id: SubscriptionId) -> Result<()>;

    async fn touch_last_triggered(&self, id: SubscriptionId, at: DateTime<Utc>) -> Result<()>;

    /// Subscriptions disabled with [`DELETED_REASON`], oldest first. These
    /// are awaiting drain and eventual physical removal.
    async fn deleted_subscriptions(&self, limit: usize) -> Result<Vec<Subscription>>;

    // Deliveries

    /// Inserts a delivery unless one with the same id already exists.
    /// Returns whether a row was inserted. The no-op path is what makes
    /// re-publishing an event idempotent.
    async fn insert_delivery_if_absent(&self, delivery: &Delivery) -> Result<bool>;

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>>;

    /// Atomically transitions `pending` or `retrying` into `delivering`
    /// and returns the claimed delivery. Returns `None` when the delivery
    /// is missing, already delivering, or terminal; the delivering status
    /// is the single-attempt lock.
    async fn claim_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>>;

    async fn mark_delivered(&self, id: DeliveryId, at: DateTime<Utc>) -> Result<()>;

    async fn mark_retrying(
        &self,
        id: DeliveryId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()>;

    async fn mark_failed(&self, id: DeliveryId, reason: &str) -> Result<()>;

    async fn mark_exhausted(&self, id: DeliveryId, reason: &str) -> Result<()>;

    /// Re-opens a delivery in a retryable terminal state (`failed` or
    /// `exhausted`) back to `pending`, keeping the attempt count and
    /// granting one more attempt. Returns whether the transition applied.
    async fn reopen_delivery(&self, id: DeliveryId) -> Result<bool>;

    /// Appends an immutable attempt record and refreshes the delivery's
    /// latest-attempt projection (attempt count, last status/body/error,
    /// latency).
    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()>;

    async fn list_deliveries(
        &self,
        tenant_id: TenantId,
        subscription_id: SubscriptionId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>>;

    async fn list_attempts(&self, delivery_id: DeliveryId) -> Result<Vec<DeliveryAttempt>>;

    /// Deliveries in `retrying` whose `next_attempt_at` has passed.
    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DeliveryId>>;

    /// Deliveries stranded outside the execution queue: `pending` rows
    /// untouched since `pending_cutoff` (their queue entry was lost, e.g.
    /// across a restart) and `delivering` rows untouched since
    /// `delivering_cutoff` (a worker died mid-attempt). Delivering rows are
    /// reset to `pending`; the returned ids are ready for re-enqueue.
    async fn recover_stranded(
        &self,
        pending_cutoff: DateTime<Utc>,
        delivering_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryId>>;

    /// Force-exhausts every non-terminal delivery of a subscription.
    /// Returns how many rows moved. Used when a deleted subscription's
    /// drain window runs out.
    async fn exhaust_open_deliveries(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
    ) -> Result<u64>;

    /// Count of non-terminal deliveries still referencing a subscription.
    async fn open_delivery_count(&self, subscription_id: SubscriptionId) -> Result<u64>;

    async fn subscription_stats(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<DeliveryStats>;
}
