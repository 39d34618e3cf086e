use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One batch request to the delivery provider. The `batch_reference` is a
/// correlation identifier generated fresh per request, including per split.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatchRequest {
    pub routing_plan_id: String,
    pub batch_reference: Uuid,
    pub items: Vec<MessageBatchItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatchItem {
    pub message_reference: Uuid,
    pub recipient_id: String,
    pub originator_id: String,
    pub personalisation: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatchResponse {
    pub batch_reference: Uuid,
    pub items: Vec<MessageResponseItem>,
}

/// Per-item acknowledgement from the provider. The provider may reorder or
/// omit items, so responses are matched back by `message_reference`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponseItem {
    pub message_reference: Uuid,
    pub provider_message_id: String,
}
