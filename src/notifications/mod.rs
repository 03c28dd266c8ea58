//! Notification log fed by the push channel.
//!
//! - `event`: the delivered event type and frame parsing
//! - `log`: the newest-first log with read/unread state
//! - `shared`: the session-owned handle that doubles as the channel's sink

mod event;
mod log;
mod shared;

pub use event::{parse_frame, FrameError, NotificationEvent, OfferUpdate, KIND_OFFER_UPDATE};
pub use log::NotificationLog;
pub use shared::SharedNotificationLog;
