//! hookrelay HTTP API.
//!
//! Management surface for webhook subscriptions, delivery inspection and
//! manual retry, the event ingest endpoint, and health probes.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::{create_router, start_server};
pub use state::AppState;
