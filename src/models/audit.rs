use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::DeliveryStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub request_id: String,
    pub patient_id: String,
    pub pharmacy_id: String,
    pub update_status: String,
    pub delivery_status: DeliveryStatus,
    pub message_reference: Uuid,
    pub batch_reference: Option<Uuid>,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAuditLog {
    pub request_id: String,
    pub patient_id: String,
    pub pharmacy_id: String,
    pub update_status: String,
    pub delivery_status: DeliveryStatus,
    pub message_reference: Uuid,
    pub batch_reference: Option<Uuid>,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
}

impl CreateAuditLog {
    pub fn new(
        request_id: String,
        patient_id: String,
        pharmacy_id: String,
        update_status: String,
        delivery_status: DeliveryStatus,
        message_reference: Uuid,
    ) -> Self {
        Self {
            request_id,
            patient_id,
            pharmacy_id,
            update_status,
            delivery_status,
            message_reference,
            batch_reference: None,
            provider_message_id: None,
            error_message: None,
        }
    }

    pub fn with_batch_reference(mut self, batch_reference: Option<Uuid>) -> Self {
        self.batch_reference = batch_reference;
        self
    }

    pub fn with_provider_message_id(mut self, provider_message_id: Option<String>) -> Self {
        self.provider_message_id = provider_message_id;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }
}
