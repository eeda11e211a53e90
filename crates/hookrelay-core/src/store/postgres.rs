//! Postgres `Store` implementation.
//!
//! Rows map to domain types by hand so the schema stays independent of the
//! structs. Claim and reopen transitions are single conditional UPDATEs;
//! attempt recording runs in a transaction so the ledger and the delivery
//! projection move together.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};

use crate::{
    error::{Error, Result},
    models::{
        AttemptId, Delivery, DeliveryAttempt, DeliveryId, DeliveryStats, DeliveryStatus, EventId,
        RateLimitConfig, RetryPolicy, Subscription, SubscriptionId, SubscriptionStatus, TenantId,
    },
    store::{DeliveryFilter, Store, SubscriptionFilter},
};

pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, tenant_id, name, url, event_types, secret, status, \
     status_reason, consecutive_failures, retry_policy, rate_limit, headers, metadata, \
     created_at, updated_at, last_triggered_at";

const DELIVERY_COLUMNS: &str = "id, subscription_id, tenant_id, event_id, event_type, status, \
     attempt_count, max_attempts, url, secret, headers, body, last_status_code, \
     last_response_body, last_error, last_latency_ms, next_attempt_at, created_at, updated_at, \
     delivered_at";

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let status: String = row.try_get("status")?;
    Ok(Subscription {
        id: SubscriptionId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        event_types: row.try_get::<Json<Vec<String>>, _>("event_types")?.0,
        secret: row.try_get("secret")?,
        status: status.parse().map_err(Error::Storage)?,
        status_reason: row.try_get("status_reason")?,
        consecutive_failures: u32::try_from(row.try_get::<i32, _>("consecutive_failures")?)
            .unwrap_or(0),
        retry_policy: row.try_get::<Json<RetryPolicy>, _>("retry_policy")?.0,
        rate_limit: row.try_get::<Json<RateLimitConfig>, _>("rate_limit")?.0,
        headers: row.try_get::<Json<HashMap<String, String>>, _>("headers")?.0,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_triggered_at: row.try_get("last_triggered_at")?,
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery> {
    let status: String = row.try_get("status")?;
    let body: Vec<u8> = row.try_get("body")?;
    Ok(Delivery {
        id: DeliveryId(row.try_get("id")?),
        subscription_id: SubscriptionId(row.try_get("subscription_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        event_id: EventId(row.try_get("event_id")?),
        event_type: row.try_get("event_type")?,
        status: status.parse().map_err(Error::Storage)?,
        attempt_count: u32::try_from(row.try_get::<i32, _>("attempt_count")?).unwrap_or(0),
        max_attempts: u32::try_from(row.try_get::<i32, _>("max_attempts")?).unwrap_or(1),
        url: row.try_get("url")?,
        secret: row.try_get("secret")?,
        headers: row.try_get::<Json<HashMap<String, String>>, _>("headers")?.0,
        body: Bytes::from(body),
        last_status_code: row
            .try_get::<Option<i32>, _>("last_status_code")?
            .and_then(|c| u16::try_from(c).ok()),
        last_response_body: row.try_get("last_response_body")?,
        last_error: row.try_get("last_error")?,
        last_latency_ms: row
            .try_get::<Option<i64>, _>("last_latency_ms")?
            .and_then(|l| u64::try_from(l).ok()),
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}

fn attempt_from_row(row: &PgRow) -> Result<DeliveryAttempt> {
    Ok(DeliveryAttempt {
        id: AttemptId(row.try_get("id")?),
        delivery_id: DeliveryId(row.try_get("delivery_id")?),
        attempt_number: u32::try_from(row.try_get::<i32, _>("attempt_number")?).unwrap_or(0),
        status_code: row
            .try_get::<Option<i32>, _>("status_code")?
            .and_then(|c| u16::try_from(c).ok()),
        response_body: row.try_get("response_body")?,
        error: row.try_get("error")?,
        duration_ms: u64::try_from(row.try_get::<i64, _>("duration_ms")?).unwrap_or(0),
        started_at: row.try_get("started_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO subscriptions (
                id, tenant_id, name, url, event_types, secret, status, status_reason,
                consecutive_failures, retry_policy, rate_limit, headers, metadata,
                created_at, updated_at, last_triggered_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(subscription.id.0)
        .bind(subscription.tenant_id.0)
        .bind(&subscription.name)
        .bind(&subscription.url)
        .bind(Json(&subscription.event_types))
        .bind(&subscription.secret)
        .bind(subscription.status.to_string())
        .bind(&subscription.status_reason)
        .bind(i32::try_from(subscription.consecutive_failures).unwrap_or(i32::MAX))
        .bind(Json(&subscription.retry_policy))
        .bind(Json(&subscription.rate_limit))
        .bind(Json(&subscription.headers))
        .bind(&subscription.metadata)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .bind(subscription.last_triggered_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        Ok(())
    }

    async fn get_subscription(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn list_subscriptions(
        &self,
        tenant_id: TenantId,
        filter: &SubscriptionFilter,
    ) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR event_types @> to_jsonb(ARRAY[$3::text])
                   OR event_types @> '["*"]'::jsonb)
              AND ($4::text IS NULL OR name ILIKE '%' || $4 || '%' OR url ILIKE '%' || $4 || '%')
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(tenant_id.0)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.event_type.as_deref())
        .bind(filter.search.as_deref())
        .bind(i64::try_from(filter.page.limit()).unwrap_or(50))
        .bind(i64::try_from(filter.page.offset()).unwrap_or(0))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn list_active_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE tenant_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            "
        ))
        .bind(tenant_id.0)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE subscriptions
            SET name = $2, url = $3, event_types = $4, secret = $5, status = $6,
                status_reason = $7, retry_policy = $8, rate_limit = $9, headers = $10,
                metadata = $11, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(subscription.id.0)
        .bind(&subscription.name)
        .bind(&subscription.url)
        .bind(Json(&subscription.event_types))
        .bind(&subscription.secret)
        .bind(subscription.status.to_string())
        .bind(&subscription.status_reason)
        .bind(Json(&subscription.retry_policy))
        .bind(Json(&subscription.rate_limit))
        .bind(Json(&subscription.headers))
        .bind(&subscription.metadata)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("subscription"));
        }
        Ok(())
    }

    async fn remove_subscription(&self, id: SubscriptionId) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.0)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        reason: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE subscriptions
            SET status = $2, status_reason = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(status.to_string())
        .bind(reason)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("subscription"));
        }
        Ok(())
    }

    async fn increment_consecutive_failures(&self, id: SubscriptionId) -> Result<u32> {
        let count: i32 = sqlx::query_scalar(
            r"
            UPDATE subscriptions
            SET consecutive_failures = consecutive_failures + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING consecutive_failures
            ",
        )
        .bind(id.0)
        .fetch_one(&*self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(0))
    }

    async fn reset_consecutive_failures(&self, id: SubscriptionId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE subscriptions
            SET consecutive_failures = 0, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn touch_last_triggered(&self, id: SubscriptionId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET last_triggered_at = $2 WHERE id = $1")
            .bind(id.0)
            .bind(at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn deleted_subscriptions(&self, limit: usize) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE status = 'disabled' AND status_reason = $1
            ORDER BY updated_at ASC
            LIMIT $2
            "
        ))
        .bind(crate::store::DELETED_REASON)
        .bind(i64::try_from(limit).unwrap_or(100))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn insert_delivery_if_absent(&self, delivery: &Delivery) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO deliveries (
                id, subscription_id, tenant_id, event_id, event_type, status,
                attempt_count, max_attempts, url, secret, headers, body,
                last_status_code, last_response_body, last_error, last_latency_ms,
                next_attempt_at, created_at, updated_at, delivered_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(delivery.id.0)
        .bind(delivery.subscription_id.0)
        .bind(delivery.tenant_id.0)
        .bind(delivery.event_id.0)
        .bind(&delivery.event_type)
        .bind(delivery.status.to_string())
        .bind(i32::try_from(delivery.attempt_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(delivery.max_attempts).unwrap_or(i32::MAX))
        .bind(&delivery.url)
        .bind(&delivery.secret)
        .bind(Json(&delivery.headers))
        .bind(delivery.body.as_ref())
        .bind(delivery.last_status_code.map(i32::from))
        .bind(&delivery.last_response_body)
        .bind(&delivery.last_error)
        .bind(delivery.last_latency_ms.and_then(|l| i64::try_from(l).ok()))
        .bind(delivery.next_attempt_at)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .bind(delivery.delivered_at)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        let row = sqlx::query(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn claim_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE deliveries
            SET status = 'delivering', next_attempt_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'retrying')
            RETURNING {DELIVERY_COLUMNS}
            "
        ))
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn mark_delivered(&self, id: DeliveryId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'delivered', delivered_at = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn mark_retrying(
        &self,
        id: DeliveryId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'retrying', next_attempt_at = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: DeliveryId, reason: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'failed', next_attempt_at = NULL, last_error = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(reason)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn mark_exhausted(&self, id: DeliveryId, reason: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'exhausted', next_attempt_at = NULL, last_error = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(reason)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn reopen_delivery(&self, id: DeliveryId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'pending', max_attempts = attempt_count + 1,
                next_attempt_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('failed', 'exhausted')
            ",
        )
        .bind(id.0)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_attempt(&self, attempt: &DeliveryAttempt) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO delivery_attempts (
                id, delivery_id, attempt_number, status_code, response_body,
                error, duration_ms, started_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(attempt.id.0)
        .bind(attempt.delivery_id.0)
        .bind(i32::try_from(attempt.attempt_number).unwrap_or(i32::MAX))
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.response_body)
        .bind(&attempt.error)
        .bind(i64::try_from(attempt.duration_ms).unwrap_or(i64::MAX))
        .bind(attempt.started_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE deliveries
            SET attempt_count = $2, last_status_code = $3, last_response_body = $4,
                last_error = $5, last_latency_ms = $6, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(attempt.delivery_id.0)
        .bind(i32::try_from(attempt.attempt_number).unwrap_or(i32::MAX))
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.response_body)
        .bind(&attempt.error)
        .bind(i64::try_from(attempt.duration_ms).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_deliveries(
        &self,
        tenant_id: TenantId,
        subscription_id: SubscriptionId,
        filter: &DeliveryFilter,
    ) -> Result<Vec<Delivery>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {DELIVERY_COLUMNS} FROM deliveries
            WHERE tenant_id = $1 AND subscription_id = $2
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR event_type = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "
        ))
        .bind(tenant_id.0)
        .bind(subscription_id.0)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.event_type.as_deref())
        .bind(i64::try_from(filter.page.limit()).unwrap_or(50))
        .bind(i64::try_from(filter.page.offset()).unwrap_or(0))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(delivery_from_row).collect()
    }

    async fn list_attempts(&self, delivery_id: DeliveryId) -> Result<Vec<DeliveryAttempt>> {
        let rows = sqlx::query(
            r"
            SELECT id, delivery_id, attempt_number, status_code, response_body,
                   error, duration_ms, started_at
            FROM delivery_attempts
            WHERE delivery_id = $1
            ORDER BY attempt_number ASC
            ",
        )
        .bind(delivery_id.0)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(attempt_from_row).collect()
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DeliveryId>> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r"
            SELECT id FROM deliveries
            WHERE status = 'retrying' AND next_attempt_at <= $1
            ORDER BY next_attempt_at ASC
            LIMIT $2
            ",
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(100))
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids.into_iter().map(DeliveryId).collect())
    }

    async fn recover_stranded(
        &self,
        pending_cutoff: DateTime<Utc>,
        delivering_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryId>> {
        let mut tx = self.pool.begin().await?;

        let reclaimed: Vec<uuid::Uuid> = sqlx::query_scalar(
            r"
            UPDATE deliveries
            SET status = 'pending', updated_at = NOW()
            WHERE id IN (
                SELECT id FROM deliveries
                WHERE status = 'delivering' AND updated_at <= $1
                ORDER BY updated_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
            ",
        )
        .bind(delivering_cutoff)
        .bind(i64::try_from(limit).unwrap_or(100))
        .fetch_all(&mut *tx)
        .await?;

        // Reclaimed rows just got a fresh updated_at, so the pending scan
        // cannot pick them up a second time.
        let pending: Vec<uuid::Uuid> = sqlx::query_scalar(
            r"
            SELECT id FROM deliveries
            WHERE status = 'pending' AND updated_at <= $1
            ORDER BY updated_at ASC
            LIMIT $2
            ",
        )
        .bind(pending_cutoff)
        .bind(i64::try_from(limit.saturating_sub(reclaimed.len())).unwrap_or(0))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(pending.into_iter().chain(reclaimed).map(DeliveryId).collect())
    }

    async fn exhaust_open_deliveries(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE deliveries
            SET status = 'exhausted', next_attempt_at = NULL, last_error = $2,
                updated_at = NOW()
            WHERE subscription_id = $1
              AND status NOT IN ('delivered', 'failed', 'exhausted')
            ",
        )
        .bind(subscription_id.0)
        .bind(reason)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn open_delivery_count(&self, subscription_id: SubscriptionId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM deliveries
            WHERE subscription_id = $1
              AND status NOT IN ('delivered', 'failed', 'exhausted')
            ",
        )
        .bind(subscription_id.0)
        .fetch_one(&*self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn subscription_stats(
        &self,
        tenant_id: TenantId,
        id: SubscriptionId,
    ) -> Result<DeliveryStats> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                   COUNT(*) FILTER (WHERE status IN ('failed', 'exhausted')) AS failed,
                   (AVG(last_latency_ms) FILTER (WHERE status = 'delivered'))::float8
                       AS average_latency_ms,
                   MAX(delivered_at) AS last_delivery_at
            FROM deliveries
            WHERE tenant_id = $1 AND subscription_id = $2
            ",
        )
        .bind(tenant_id.0)
        .bind(id.0)
        .fetch_one(&*self.pool)
        .await?;

        let total = u64::try_from(row.try_get::<i64, _>("total")?).unwrap_or(0);
        let delivered = u64::try_from(row.try_get::<i64, _>("delivered")?).unwrap_or(0);
        let failed = u64::try_from(row.try_get::<i64, _>("failed")?).unwrap_or(0);

        Ok(DeliveryStats {
            total,
            delivered,
            failed,
            pending: total.saturating_sub(delivered).saturating_sub(failed),
            success_rate: if total == 0 { 0.0 } else { delivered as f64 / total as f64 },
            average_latency_ms: row.try_get::<Option<f64>, _>("average_latency_ms")?,
            last_delivery_at: row.try_get("last_delivery_at")?,
        })
    }
}
