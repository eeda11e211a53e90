//! HTTP mapping for the service error taxonomy.
//!
//! Handlers return `ApiError`, which renders the domain error as a JSON
//! body with a stable machine-readable code. Storage details never reach
//! the client; they are logged and replaced with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hookrelay_core::Error;
use serde::Serialize;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code.
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            Error::InvalidSpec(msg) => (StatusCode::BAD_REQUEST, "invalid_spec", msg.clone()),
            Error::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
            },
            Error::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            Error::DeliveryFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "delivery_failed", msg.clone())
            },
            Error::Signature(msg) => {
                error!(error = %msg, "signature failure in request path");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "signature_error",
                    "signature computation failed".to_string(),
                )
            },
            Error::RateLimitTimeout { ceiling } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "rate_limit_timeout",
                format!("rate limit wait exceeded {}ms", ceiling.as_millis()),
            ),
            Error::Storage(msg) => {
                error!(error = %msg, "storage failure in request path");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal storage error".to_string(),
                )
            },
            Error::Shutdown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "shutting_down",
                "service is shutting down".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: ErrorDetail { code, message } })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::InvalidSpec("bad url".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("subscription"), StatusCode::NOT_FOUND),
            (Error::Conflict("already exists".into()), StatusCode::CONFLICT),
            (Error::Storage("connection reset".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Shutdown, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn storage_detail_is_not_exposed() {
        use http_body_util::BodyExt;

        let response = ApiError(Error::Storage("password=hunter2 host=db".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("internal storage error"));
    }
}
