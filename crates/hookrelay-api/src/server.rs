//! HTTP server setup and request routing.
//!
//! Requests flow through request-id injection, tracing, and timeout
//! enforcement before reaching the handlers. The server shuts down
//! gracefully on SIGINT or SIGTERM, finishing in-flight requests before
//! returning control to the caller (which then drains the delivery
//! engine).

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, state::AppState};

/// Creates the router with all routes and middleware.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check));

    let api_routes = Router::new()
        .route("/webhooks", post(handlers::create_webhook).get(handlers::list_webhooks))
        .route(
            "/webhooks/{id}",
            get(handlers::get_webhook)
                .put(handlers::update_webhook)
                .delete(handlers::delete_webhook),
        )
        .route("/webhooks/{id}/test", post(handlers::test_webhook))
        .route("/webhooks/{id}/deliveries", get(handlers::list_deliveries))
        .route("/webhooks/{id}/stats", get(handlers::subscription_stats))
        .route("/deliveries/{id}", get(handlers::get_delivery))
        .route("/deliveries/{id}/attempts", get(handlers::list_attempts))
        .route("/deliveries/{id}/retry", post(handlers::retry_delivery))
        .route("/events", post(handlers::publish_event));

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Injects a request id into extensions and echoes it as `X-Request-Id`.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;
    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }
    response
}

/// Starts the HTTP server and serves until a shutdown signal is received.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    request_timeout: Duration,
) -> Result<(), std::io::Error> {
    let app = create_router(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }
}
