//! In-process event bus for live dashboard updates.
//!
//! The bus provides:
//! - Publish-subscribe distribution of sync state changes to any number of views
//! - Monotonic sequence numbers so observers can order events from one session
//!
//! # Architecture
//!
//! Events flow from the sync components → EventBus → views:
//! - `EventChannel` publishes connection state changes
//! - `SharedNotificationLog` publishes each delivered notification
//! - `JobStatusPoller` publishes import lifecycle transitions and, on
//!   completion, a metrics refresh request

mod event_bus;
pub mod event_types;

pub use event_bus::{EventBus, SyncEvent};
