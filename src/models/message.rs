use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw message as received from the source queue. The queue owns the
/// message until it is deleted; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub receipt_token: String,
    pub dedup_key: Option<String>,
    pub group_key: Option<String>,
    pub body: String,
}

/// A prescription status update, parsed from a queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub patient_id: String,
    pub pharmacy_id: String,
    pub request_id: String,
    pub status: String,
    pub event_id: String,
}

/// One notification event, derived from exactly one queue message.
///
/// The `message_reference` is generated at parse time and correlates
/// provider responses back to this event; it is stable for the life of the
/// event and never reused within a drain cycle.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub message_id: String,
    pub receipt_token: String,
    pub dedup_key: String,
    pub message_reference: Uuid,
    pub update: StatusUpdate,
}

impl NotificationEvent {
    pub fn recipient_key(&self) -> RecipientKey {
        RecipientKey {
            patient_id: self.update.patient_id.clone(),
            pharmacy_id: self.update.pharmacy_id.clone(),
        }
    }
}

/// The patient/pharmacy pair: cooldown lookup key and state-store primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipientKey {
    pub patient_id: String,
    pub pharmacy_id: String,
}
