use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::NotificationEvent;

/// Terminal status of one delivery attempt, as recorded against the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Requested,
    Failed,
    SilentRunning,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryStatus::Requested => write!(f, "requested"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::SilentRunning => write!(f, "silent_running"),
        }
    }
}

/// The result of dispatching one notification event. Exactly one outcome
/// exists per event that entered a batch; events dropped before batching
/// (dedup, cooldown) have none.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub message_reference: Uuid,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub batch_reference: Option<Uuid>,
}

/// The persisted record of what was last sent for a patient/pharmacy pair.
///
/// Written exactly once per processed event, after its outcome exists and
/// before its queue message is deleted. `expiry_time` is a unix timestamp
/// the store uses to reclaim stale records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStateRecord {
    pub patient_id: String,
    pub pharmacy_id: String,
    pub request_id: String,
    pub message_id: String,
    pub message_reference: Uuid,
    pub provider_message_id: Option<String>,
    pub batch_reference: Option<Uuid>,
    pub last_status: DeliveryStatus,
    pub last_update_status: String,
    pub last_timestamp: DateTime<Utc>,
    pub expiry_time: i64,
}

impl DeliveryStateRecord {
    pub fn from_outcome(
        event: &NotificationEvent,
        outcome: &DeliveryOutcome,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            patient_id: event.update.patient_id.clone(),
            pharmacy_id: event.update.pharmacy_id.clone(),
            request_id: event.update.request_id.clone(),
            message_id: event.message_id.clone(),
            message_reference: event.message_reference,
            provider_message_id: outcome.provider_message_id.clone(),
            batch_reference: outcome.batch_reference,
            last_status: outcome.status,
            last_update_status: event.update.status.clone(),
            last_timestamp: now,
            expiry_time: now.timestamp() + ttl_seconds,
        }
    }
}
