use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a push frame could not become a notification.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// One delivered push event.
///
/// `id` and `received_at` are assigned locally on receipt; the server's own
/// fields stay untouched in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub message: String,
    pub kind: Option<String>,
    pub read: bool,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Typed view over an `offer_update` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OfferUpdate {
    pub offer_id: i64,
    #[serde(default)]
    pub offer_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

pub const KIND_OFFER_UPDATE: &str = "offer_update";

impl NotificationEvent {
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, FrameError> {
        let object = match &payload {
            serde_json::Value::Object(object) => object,
            other => return Err(FrameError::NotAnObject(json_kind(other))),
        };
        let message = object
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();
        let kind = object
            .get("type")
            .and_then(|value| value.as_str())
            .map(str::to_string);

        Ok(Self {
            id: Uuid::new_v4(),
            message,
            kind,
            read: false,
            received_at: Utc::now(),
            payload,
        })
    }

    pub fn offer_update(&self) -> Option<OfferUpdate> {
        if self.kind.as_deref() != Some(KIND_OFFER_UPDATE) {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Parse one text frame from the push channel.
pub fn parse_frame(text: &str) -> Result<NotificationEvent, FrameError> {
    let payload: serde_json::Value = serde_json::from_str(text)?;
    NotificationEvent::from_payload(payload)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
