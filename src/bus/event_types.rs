//! Event type and category constants.
//!
//! Single source of truth for the names views subscribe to.

use super::event_bus::SyncEvent;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub const CATEGORY_CHANNEL: &str = "channel";
pub const CATEGORY_NOTIFICATION: &str = "notification";
pub const CATEGORY_IMPORT: &str = "import";
pub const CATEGORY_METRICS: &str = "metrics";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

pub const EVENT_CHANNEL_STATE_CHANGED: &str = "channel.state_changed";
pub const EVENT_NOTIFICATION_RECEIVED: &str = "notification.received";
pub const EVENT_NOTIFICATIONS_CLEARED: &str = "notification.cleared";
pub const EVENT_IMPORT_STARTED: &str = "import.started";
pub const EVENT_IMPORT_RESUMED: &str = "import.resumed";
pub const EVENT_IMPORT_COMPLETED: &str = "import.completed";
pub const EVENT_IMPORT_FAILED: &str = "import.failed";
pub const EVENT_METRICS_REFRESH_REQUESTED: &str = "metrics.refresh_requested";

// ---------------------------------------------------------------------------
// Routing helpers
// ---------------------------------------------------------------------------

/// Returns true if this event should make dashboards refetch their analytics.
pub fn triggers_metrics_refresh(event: &SyncEvent) -> bool {
    event.event_type == EVENT_METRICS_REFRESH_REQUESTED
}

/// Returns true if this event changes the busy indicator shown for imports.
pub fn affects_busy_indicator(event: &SyncEvent) -> bool {
    event.category == CATEGORY_IMPORT
}
