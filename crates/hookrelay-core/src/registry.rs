//! Tenant-scoped CRUD over subscription configuration.
//!
//! All validation lives here so every front-end shares one contract.
//! Cross-tenant access reports not-found, never forbidden. The signing
//! secret is write-only: rotation stores a new value on the same record,
//! and no read path returns it.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    models::{
        RateLimitConfig, RetryPolicy, Subscription, SubscriptionId, SubscriptionStatus,
    },
    scope::RequestScope,
    store::{Store, SubscriptionFilter, DELETED_REASON},
    time::Clock,
};

const MAX_NAME_LEN: usize = 128;
const MIN_SECRET_LEN: usize = 8;

/// Requested configuration for a new subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSpec {
    pub name: String,
    pub url: String,
    pub event_types: Vec<String>,
    pub secret: String,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Partial update for an existing subscription. Absent fields keep their
/// current value. `secret` rotates the signing secret in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub secret: Option<String>,
    /// Only `active` and `paused` are assignable; `disabled` is reserved
    /// for deletion.
    pub status: Option<SubscriptionStatus>,
    pub retry_policy: Option<RetryPolicy>,
    pub rate_limit: Option<RateLimitConfig>,
    pub headers: Option<HashMap<String, String>>,
    pub metadata: Option<serde_json::Value>,
}

pub struct WebhookRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl WebhookRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validates the submitted definition and creates the subscription.
    pub async fn create(&self, scope: RequestScope, spec: SubscriptionSpec) -> Result<Subscription> {
        validate_name(&spec.name)?;
        validate_url(&spec.url)?;
        validate_event_types(&spec.event_types)?;
        validate_secret(&spec.secret)?;

        let retry_policy = spec.retry_policy.unwrap_or_default();
        validate_retry_policy(&retry_policy)?;
        let rate_limit = spec.rate_limit.unwrap_or_default();
        validate_rate_limit(&rate_limit)?;

        let now = self.clock.now_utc();
        let subscription = Subscription {
            id: SubscriptionId::new(),
            tenant_id: scope.tenant_id,
            name: spec.name,
            url: spec.url,
            event_types: spec.event_types,
            secret: spec.secret,
            status: SubscriptionStatus::Active,
            status_reason: None,
            consecutive_failures: 0,
            retry_policy,
            rate_limit,
            headers: spec.headers,
            metadata: spec.metadata,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
        };

        self.store.create_subscription(&subscription).await?;
        info!(
            subscription_id = %subscription.id,
            tenant_id = %scope.tenant_id,
            name = %subscription.name,
            "subscription registered"
        );
        Ok(subscription)
    }

    pub async fn get(&self, scope: RequestScope, id: SubscriptionId) -> Result<Subscription> {
        self.store
            .get_subscription(scope.tenant_id, id)
            .await?
            .ok_or(Error::NotFound("subscription"))
    }

    pub async fn list(
        &self,
        scope: RequestScope,
        filter: &SubscriptionFilter,
    ) -> Result<Vec<Subscription>> {
        self.store.list_subscriptions(scope.tenant_id, filter).await
    }

    /// Applies a partial update. Edits take effect for deliveries created
    /// afterwards; in-flight deliveries keep the target and secret they
    /// captured at dispatch time.
    pub async fn update(
        &self,
        scope: RequestScope,
        id: SubscriptionId,
        update: SubscriptionUpdate,
    ) -> Result<Subscription> {
        let mut subscription = self.get(scope, id).await?;
        if subscription.status == SubscriptionStatus::Disabled {
            return Err(Error::Conflict("subscription is disabled".into()));
        }

        if let Some(name) = update.name {
            validate_name(&name)?;
            subscription.name = name;
        }
        if let Some(url) = update.url {
            validate_url(&url)?;
            subscription.url = url;
        }
        if let Some(event_types) = update.event_types {
            validate_event_types(&event_types)?;
            subscription.event_types = event_types;
        }
        if let Some(secret) = update.secret {
            validate_secret(&secret)?;
            subscription.secret = secret;
        }
        let mut reactivated = false;
        if let Some(status) = update.status {
            if status == SubscriptionStatus::Disabled {
                return Err(Error::InvalidSpec(
                    "status cannot be set to disabled; delete the subscription instead".into(),
                ));
            }
            if subscription.status != status {
                subscription.status = status;
                subscription.status_reason = Some("operator status change".into());
                reactivated = status == SubscriptionStatus::Active;
            }
        }
        if let Some(retry_policy) = update.retry_policy {
            validate_retry_policy(&retry_policy)?;
            subscription.retry_policy = retry_policy;
        }
        if let Some(rate_limit) = update.rate_limit {
            validate_rate_limit(&rate_limit)?;
            subscription.rate_limit = rate_limit;
        }
        if let Some(headers) = update.headers {
            subscription.headers = headers;
        }
        if let Some(metadata) = update.metadata {
            subscription.metadata = metadata;
        }

        self.store.update_subscription(&subscription).await?;
        // Manual reactivation restarts the circuit breaker window.
        if reactivated {
            self.store.reset_consecutive_failures(id).await?;
        }
        debug!(subscription_id = %id, tenant_id = %scope.tenant_id, "subscription updated");
        self.get(scope, id).await
    }

    /// Logically deletes a subscription.
    ///
    /// The record flips to disabled so queued and retrying deliveries can
    /// drain. Removal happens here when nothing non-terminal references
    /// the subscription; otherwise the engine's sweep removes the row once
    /// the drain finishes, force-exhausting stragglers past its drain
    /// window.
    pub async fn delete(&self, scope: RequestScope, id: SubscriptionId) -> Result<()> {
        // Tenant check first so cross-tenant deletes read as not-found.
        self.get(scope, id).await?;

        self.store
            .set_subscription_status(id, SubscriptionStatus::Disabled, Some(DELETED_REASON.into()))
            .await?;

        let open = self.store.open_delivery_count(id).await?;
        if open == 0 {
            self.store.remove_subscription(id).await?;
            info!(subscription_id = %id, tenant_id = %scope.tenant_id, "subscription removed");
        } else {
            info!(
                subscription_id = %id,
                tenant_id = %scope.tenant_id,
                open_deliveries = open,
                "subscription disabled, awaiting drain"
            );
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidSpec("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidSpec(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(Error::InvalidSpec(
            "url must use the http or https scheme".into(),
        )),
    }
}

fn validate_event_types(event_types: &[String]) -> Result<()> {
    if event_types.is_empty() {
        return Err(Error::InvalidSpec("event filter must not be empty".into()));
    }
    if event_types.iter().any(|t| t.trim().is_empty()) {
        return Err(Error::InvalidSpec("event types must not be blank".into()));
    }
    Ok(())
}

fn validate_secret(secret: &str) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::InvalidSpec(format!(
            "secret must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_retry_policy(policy: &RetryPolicy) -> Result<()> {
    if policy.max_attempts == 0 {
        return Err(Error::InvalidSpec("max_attempts must be at least 1".into()));
    }
    if policy.base_delay.is_zero() {
        return Err(Error::InvalidSpec("base_delay must be positive".into()));
    }
    if policy.max_delay < policy.base_delay {
        return Err(Error::InvalidSpec(
            "max_delay must not be below base_delay".into(),
        ));
    }
    if !(0.0..=1.0).contains(&policy.jitter) {
        return Err(Error::InvalidSpec("jitter must be within [0, 1]".into()));
    }
    Ok(())
}

fn validate_rate_limit(config: &RateLimitConfig) -> Result<()> {
    if config.requests_per_minute == 0 {
        return Err(Error::InvalidSpec(
            "requests_per_minute must be at least 1".into(),
        ));
    }
    if config.burst == 0 {
        return Err(Error::InvalidSpec("burst must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::TenantId,
        store::MemoryStore,
        time::RealClock,
    };

    fn registry() -> WebhookRegistry {
        WebhookRegistry::new(Arc::new(MemoryStore::new()), Arc::new(RealClock))
    }

    fn registry_with_store(store: Arc<MemoryStore>) -> WebhookRegistry {
        WebhookRegistry::new(store, Arc::new(RealClock))
    }

    fn valid_spec() -> SubscriptionSpec {
        SubscriptionSpec {
            name: "billing".into(),
            url: "https://example.com/hook".into(),
            event_types: vec!["invoice.paid".into()],
            secret: "whsec_0123456789".into(),
            retry_policy: None,
            rate_limit: None,
            headers: HashMap::new(),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn create_rejects_bad_urls() {
        let registry = registry();
        let scope = RequestScope::new(TenantId::new());

        for url in ["ftp://example.com", "file:///etc/passwd", "example.com", "https://", ""] {
            let spec = SubscriptionSpec { url: url.into(), ..valid_spec() };
            let err = registry.create(scope, spec).await.unwrap_err();
            assert!(matches!(err, Error::InvalidSpec(_)), "url {url:?} was accepted");
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_filter_and_long_name() {
        let registry = registry();
        let scope = RequestScope::new(TenantId::new());

        let spec = SubscriptionSpec { event_types: vec![], ..valid_spec() };
        assert!(matches!(
            registry.create(scope, spec).await.unwrap_err(),
            Error::InvalidSpec(_)
        ));

        let spec = SubscriptionSpec { name: "x".repeat(200), ..valid_spec() };
        assert!(matches!(
            registry.create(scope, spec).await.unwrap_err(),
            Error::InvalidSpec(_)
        ));
    }

    #[tokio::test]
    async fn cross_tenant_access_reads_as_not_found() {
        let registry = registry();
        let owner = RequestScope::new(TenantId::new());
        let created = registry.create(owner, valid_spec()).await.unwrap();

        let stranger = RequestScope::new(TenantId::new());
        assert!(matches!(
            registry.get(stranger, created.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            registry.delete(stranger, created.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        // Still intact for the owner.
        assert!(registry.get(owner, created.id).await.is_ok());
    }

    #[tokio::test]
    async fn update_rotates_secret_in_place() {
        let registry = registry();
        let scope = RequestScope::new(TenantId::new());
        let created = registry.create(scope, valid_spec()).await.unwrap();

        let update = SubscriptionUpdate {
            secret: Some("whsec_rotated_9876".into()),
            ..Default::default()
        };
        let updated = registry.update(scope, created.id, update).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.secret, "whsec_rotated_9876");
    }

    #[tokio::test]
    async fn update_cannot_disable() {
        let registry = registry();
        let scope = RequestScope::new(TenantId::new());
        let created = registry.create(scope, valid_spec()).await.unwrap();

        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::Disabled),
            ..Default::default()
        };
        assert!(matches!(
            registry.update(scope, created.id, update).await.unwrap_err(),
            Error::InvalidSpec(_)
        ));
    }

    #[tokio::test]
    async fn reactivation_resets_breaker_counter() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry_with_store(store.clone());
        let scope = RequestScope::new(TenantId::new());
        let created = registry.create(scope, valid_spec()).await.unwrap();

        for _ in 0..10 {
            store.increment_consecutive_failures(created.id).await.unwrap();
        }
        store
            .set_subscription_status(created.id, SubscriptionStatus::Paused, Some("breaker".into()))
            .await
            .unwrap();

        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::Active),
            ..Default::default()
        };
        let updated = registry.update(scope, created.id, update).await.unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Active);
        assert_eq!(updated.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn delete_without_open_deliveries_removes_the_row() {
        let registry = registry();
        let scope = RequestScope::new(TenantId::new());
        let created = registry.create(scope, valid_spec()).await.unwrap();

        registry.delete(scope, created.id).await.unwrap();
        assert!(matches!(
            registry.get(scope, created.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_with_open_deliveries_disables_first() {
        use bytes::Bytes;
        use chrono::Utc;

        use crate::models::{Delivery, DeliveryId, DeliveryStatus, EventId};

        let store = Arc::new(MemoryStore::new());
        let registry = registry_with_store(store.clone());
        let scope = RequestScope::new(TenantId::new());
        let created = registry.create(scope, valid_spec()).await.unwrap();

        let event_id = EventId::new();
        let delivery = Delivery {
            id: DeliveryId::for_pair(created.id, event_id),
            subscription_id: created.id,
            tenant_id: created.tenant_id,
            event_id,
            event_type: "invoice.paid".into(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: 3,
            url: created.url.clone(),
            secret: created.secret.clone(),
            headers: HashMap::new(),
            body: Bytes::from_static(b"{}"),
            last_status_code: None,
            last_response_body: None,
            last_error: None,
            last_latency_ms: None,
            next_attempt_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            delivered_at: None,
        };
        store.insert_delivery_if_absent(&delivery).await.unwrap();

        registry.delete(scope, created.id).await.unwrap();

        // Row survives as disabled until the delivery drains.
        let remaining = store
            .get_subscription(created.tenant_id, created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remaining.status, SubscriptionStatus::Disabled);
    }
}
