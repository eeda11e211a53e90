//! Error taxonomy shared across the delivery pipeline.
//!
//! Management-surface errors (`InvalidSpec`, `NotFound`, `Conflict`) are
//! returned synchronously to callers. Delivery-path errors never propagate
//! to the event producer; they drive retry logic and surface only through
//! delivery history and stats.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Subscription configuration rejected at validation time.
    #[error("invalid subscription spec: {0}")]
    InvalidSpec(String),

    /// Unknown id, or an id owned by a different tenant. Cross-tenant
    /// access reports not-found rather than forbidden so that ids do not
    /// leak existence.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Operation conflicts with the target's current state, e.g. manual
    /// retry of a delivery that is not in a retryable terminal state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Subscriber unreachable or rejected the request. Internal to the
    /// delivery path; drives retry classification.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Signing failed for an attempt. Counted as a failed attempt so retry
    /// still applies.
    #[error("signature failure: {0}")]
    Signature(String),

    /// Rate-limiter wait exceeded its ceiling. The attempt is deferred,
    /// not failed.
    #[error("rate limit wait exceeded ceiling of {ceiling:?}")]
    RateLimitTimeout { ceiling: Duration },

    /// Persistence-layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The service is shutting down and no longer accepts work.
    #[error("shutdown in progress")]
    Shutdown,
}

impl Error {
    /// Whether the delivery attempt which produced this error may be
    /// retried by the scheduler.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeliveryFailed(_) | Self::Signature(_) | Self::Storage(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row"),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delivery_failures_are_retryable() {
        assert!(Error::DeliveryFailed("connection refused".into()).is_retryable());
        assert!(Error::Signature("bad key length".into()).is_retryable());
        assert!(!Error::Conflict("already delivered".into()).is_retryable());
        assert!(!Error::NotFound("delivery").is_retryable());
    }
}
