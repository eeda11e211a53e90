//! Delivery pipeline for hookrelay.
//!
//! `EventDispatcher` fans published events out into delivery records and a
//! bounded execution queue. `DeliveryEngine` drains the queue with a worker
//! pool; each attempt flows through rate limiting, signing, the HTTP client,
//! outcome classification, and the retry scheduler.

#![forbid(unsafe_code)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod signer;
pub mod worker;

pub use client::{ClientConfig, DeliveryClient, ResponseClass};
pub use dispatcher::EventDispatcher;
pub use error::AttemptError;
pub use executor::{DeliveryExecutor, ExecutorConfig};
pub use queue::QueueHandle;
pub use rate_limit::RateLimiter;
pub use retry::RetryDecision;
pub use scheduler::{CircuitBreakerConfig, RetryScheduler};
pub use worker::{DeliveryEngine, EngineConfig};
