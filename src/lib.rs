//! Live-sync and KPI core of the sales-offer dashboard.
//!
//! The crate keeps a client consistent with two externally driven processes
//! and reduces analytics series into display-ready KPIs:
//! - `channel`: websocket push subscription with owned reconnection
//! - `poller`: trigger-then-poll driver for the email import job
//! - `notifications`: newest-first log of pushed events with read state
//! - `metrics`: analytics wire types, pure reducers, formatting and the
//!   fail-soft dashboard loader
//!
//! # Architecture
//!
//! - `session`: owns one channel, poller and log per signed-in user
//! - `api`: bearer-authenticated REST client
//! - `bus`: in-process broadcast of state changes for views
//! - `config`: environment-driven settings

pub mod api;
pub mod bus;
pub mod channel;
pub mod config;
pub mod metrics;
pub mod notifications;
pub mod poller;
pub mod session;

pub use config::SyncConfig;
pub use session::{Session, SessionContext};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Api(#[from] api::ApiError),
    #[error("{0}")]
    Poller(#[from] poller::PollerError),
    #[error("{0}")]
    Other(String),
}

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "offerwatch=debug,offerwatch_lib=debug,info";

/// Install the global `tracing` subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
