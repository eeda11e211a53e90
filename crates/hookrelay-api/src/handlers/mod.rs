//! Request handlers for the management and ingest surface.

pub mod deliveries;
pub mod events;
pub mod health;
pub mod webhooks;

pub use deliveries::{get_delivery, list_attempts, retry_delivery};
pub use events::publish_event;
pub use health::{health_check, liveness_check, readiness_check};
pub use webhooks::{
    create_webhook, delete_webhook, get_webhook, list_deliveries, list_webhooks,
    subscription_stats, test_webhook, update_webhook,
};
