//! Core domain types and storage contract for the hookrelay delivery service.
//!
//! This crate defines the entities the rest of the system moves around
//! (subscriptions, events, deliveries, attempt records), the error taxonomy,
//! the clock abstraction used for deterministic tests, and the `Store` trait
//! with its in-memory and Postgres implementations, plus the tenant-scoped
//! subscription registry that fronts all configuration changes.

#![forbid(unsafe_code)]

pub mod error;
pub mod events;
pub mod models;
pub mod registry;
pub mod scope;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    BackoffKind, Delivery, DeliveryAttempt, DeliveryId, DeliveryStatus, Event, EventId,
    RateLimitConfig, RetryPolicy, Subscription, SubscriptionId, SubscriptionStatus, TenantId,
};
pub use registry::{SubscriptionSpec, SubscriptionUpdate, WebhookRegistry};
pub use scope::RequestScope;
pub use store::Store;
pub use time::{Clock, RealClock, TestClock};
