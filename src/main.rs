//! hookrelay webhook delivery service.
//!
//! Main entry point. Initializes tracing, configuration, the database
//! pool, the delivery engine, and the HTTP server, and coordinates
//! graceful shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookrelay_api::{AppState, Config};
use hookrelay_core::{store::PgStore, time::RealClock};
use hookrelay_delivery::worker::DeliveryEngine;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting hookrelay webhook delivery service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        workers = config.worker_pool_size,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&db_pool).await?;
    info!("database migrations completed");

    let store = Arc::new(PgStore::new(Arc::new(db_pool.clone())));
    let clock = Arc::new(RealClock);

    let mut engine = DeliveryEngine::new(
        store.clone(),
        clock.clone(),
        Arc::new(hookrelay_core::events::NoOpEventHandler),
        config.to_engine_config(),
    )?;
    let state = AppState::new(
        store,
        clock,
        &engine,
        config.to_client_config(),
        config.default_retry_policy(),
        config.default_rate_limit(),
    )?;
    engine.start();
    info!("delivery engine started");

    let addr = config.parse_server_addr()?;
    let request_timeout = Duration::from_secs(config.request_timeout);
    hookrelay_api::start_server(state, addr, request_timeout)
        .await
        .context("HTTP server failed")?;

    // The server has drained; now drain the delivery pipeline.
    engine.shutdown().await;
    info!("delivery engine stopped");

    db_pool.close().await;
    info!("database connections closed");

    info!("hookrelay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,hookrelay=debug,tower_http=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic, so the service
/// survives a database that becomes reachable after it starts.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Ensures the schema exists.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            event_types JSONB NOT NULL,
            secret TEXT NOT NULL,
            status TEXT NOT NULL,
            status_reason TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            retry_policy JSONB NOT NULL,
            rate_limit JSONB NOT NULL,
            headers JSONB NOT NULL,
            metadata JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            last_triggered_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create subscriptions table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            id UUID PRIMARY KEY,
            subscription_id UUID NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            tenant_id UUID NOT NULL,
            event_id UUID NOT NULL,
            event_type TEXT NOT NULL,
            status TEXT NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            url TEXT NOT NULL,
            secret TEXT NOT NULL,
            headers JSONB NOT NULL,
            body BYTEA NOT NULL,
            last_status_code INTEGER,
            last_response_body TEXT,
            last_error TEXT,
            last_latency_ms BIGINT,
            next_attempt_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            delivered_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create deliveries table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delivery_attempts (
            id UUID PRIMARY KEY,
            delivery_id UUID NOT NULL REFERENCES deliveries(id) ON DELETE CASCADE,
            attempt_number INTEGER NOT NULL,
            status_code INTEGER,
            response_body TEXT,
            error TEXT,
            duration_ms BIGINT NOT NULL,
            started_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create delivery_attempts table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deliveries_due_retries
        ON deliveries(status, next_attempt_at)
        WHERE status = 'retrying'
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create due-retries index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deliveries_subscription
        ON deliveries(subscription_id, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create delivery history index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_subscriptions_tenant
        ON subscriptions(tenant_id, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create subscriptions tenant index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_delivery_attempts_delivery
        ON delivery_attempts(delivery_id, attempt_number)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create delivery_attempts index")?;

    Ok(())
}
