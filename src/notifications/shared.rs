use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;
use uuid::Uuid;

use super::event::NotificationEvent;
use super::log::NotificationLog;
use crate::bus::event_types::{
    CATEGORY_NOTIFICATION, EVENT_NOTIFICATIONS_CLEARED, EVENT_NOTIFICATION_RECEIVED,
};
use crate::bus::EventBus;
use crate::channel::EventSink;

/// Session-owned handle to the notification log.
///
/// The channel task appends through the [`EventSink`] impl while views read
/// and toggle entries through the same handle.
#[derive(Clone)]
pub struct SharedNotificationLog {
    log: Arc<RwLock<NotificationLog>>,
    bus: Option<Arc<EventBus>>,
}

impl SharedNotificationLog {
    pub fn new(bus: Option<Arc<EventBus>>) -> Self {
        Self {
            log: Arc::new(RwLock::new(NotificationLog::new())),
            bus,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, NotificationLog> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NotificationLog> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_read(&self, id: Uuid) -> bool {
        self.write().mark_read(id)
    }

    pub fn mark_all_read(&self) -> usize {
        self.write().mark_all_read()
    }

    pub fn clear_all(&self) {
        self.write().clear_all();
        if let Some(bus) = &self.bus {
            bus.emit(CATEGORY_NOTIFICATION, EVENT_NOTIFICATIONS_CLEARED, json!({}));
        }
    }

    pub fn unread_count(&self) -> usize {
        self.read().unread_count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the current entries, newest first.
    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.read().iter().cloned().collect()
    }
}

impl EventSink for SharedNotificationLog {
    fn deliver(&self, event: NotificationEvent) {
        let announce = self.bus.as_ref().map(|_| {
            json!({
                "id": event.id,
                "message": event.message,
                "kind": event.kind,
            })
        });
        let unread = {
            let mut log = self.write();
            log.append(event);
            log.unread_count()
        };
        if let (Some(bus), Some(mut payload)) = (&self.bus, announce) {
            payload["unread"] = json!(unread);
            bus.emit(CATEGORY_NOTIFICATION, EVENT_NOTIFICATION_RECEIVED, payload);
        }
    }
}
