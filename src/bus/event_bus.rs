use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub seq: i64,
    pub category: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

impl SyncEvent {
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    seq: AtomicI64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    /// Build and publish an event in one call.
    ///
    /// Publishing with no live subscribers is not an error: views come and go
    /// while the session keeps running.
    pub fn emit(
        &self,
        category: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> SyncEvent {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = SyncEvent {
            id: Uuid::new_v4().to_string(),
            seq,
            category: category.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now().to_rfc3339(),
        };
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(event_type = %event.event_type, "sync event published with no subscribers");
        }
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::event_types::{CATEGORY_IMPORT, EVENT_IMPORT_STARTED};

    #[tokio::test]
    async fn emit_assigns_increasing_sequence_numbers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(CATEGORY_IMPORT, EVENT_IMPORT_STARTED, json!({}));
        bus.emit(CATEGORY_IMPORT, EVENT_IMPORT_STARTED, json!({}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert!(first.is(EVENT_IMPORT_STARTED));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn emit_without_subscribers_still_returns_event() {
        let bus = EventBus::new();
        let event = bus.emit(CATEGORY_IMPORT, EVENT_IMPORT_STARTED, json!({ "k": 1 }));
        assert_eq!(event.payload["k"], 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
