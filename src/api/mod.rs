//! Bearer-authenticated REST client for the dashboard backend.
//!
//! - `client`: the `reqwest`-backed [`ApiClient`] and its endpoint paths
//! - `error`: [`ApiError`], with `401` kept distinct from other failures
//!
//! The client implements the job-control seam used by the poller and the
//! analytics seam used by the dashboard loader.

mod client;
mod error;


pub use client::{paths, ApiClient};
pub use error::ApiError;
