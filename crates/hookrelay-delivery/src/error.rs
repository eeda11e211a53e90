//! Attempt-level failures inside the delivery pipeline.

use thiserror::Error;

use crate::signer::SignatureError;

/// Why a single delivery attempt produced no usable subscriber response.
///
/// Every variant counts as a failed attempt and is eligible for retry;
/// classification of HTTP status codes happens separately once a response
/// exists.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("signature failure: {0}")]
    Signature(#[from] SignatureError),
}
