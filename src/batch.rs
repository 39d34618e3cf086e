use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{
    batch::{MessageBatchItem, MessageBatchRequest, MessageBatchResponse},
    message::NotificationEvent,
    status::{DeliveryOutcome, DeliveryStatus},
};

/// Build one provider batch request from the given events. Each call
/// generates a fresh batch reference, so every split gets its own.
///
/// An event missing the provider-required correlation attribute is logged
/// and excluded rather than failing the whole batch.
pub fn build_batch(routing_plan_id: &str, events: &[NotificationEvent]) -> MessageBatchRequest {
    let items = events
        .iter()
        .filter_map(|event| {
            if event.dedup_key.is_empty() {
                error!(
                    message_id = %event.message_id,
                    request_id = %event.update.request_id,
                    "Not requesting a notification for this event; missing deduplication key"
                );
                return None;
            }

            Some(MessageBatchItem {
                message_reference: event.message_reference,
                recipient_id: event.update.patient_id.clone(),
                originator_id: event.update.pharmacy_id.clone(),
                personalisation: HashMap::new(),
            })
        })
        .collect();

    MessageBatchRequest {
        routing_plan_id: routing_plan_id.to_string(),
        batch_reference: Uuid::new_v4(),
        items,
    }
}

pub fn estimated_size(request: &MessageBatchRequest) -> Result<usize, Error> {
    let raw = serde_json::to_vec(request)
        .map_err(|e| anyhow!("Failed to serialize batch request: {}", e))?;
    Ok(raw.len())
}

/// Match provider acknowledgements back to the items that were sent.
///
/// Matching is by message reference only - the provider may reorder or omit
/// items. Every sent item gets exactly one outcome; unacknowledged items
/// are marked failed.
pub fn reconcile(
    sent_items: &[MessageBatchItem],
    response: &MessageBatchResponse,
    batch_reference: Uuid,
) -> Vec<DeliveryOutcome> {
    let acknowledged: HashMap<Uuid, &str> = response
        .items
        .iter()
        .map(|item| (item.message_reference, item.provider_message_id.as_str()))
        .collect();

    sent_items
        .iter()
        .map(|item| match acknowledged.get(&item.message_reference) {
            Some(provider_message_id) => DeliveryOutcome {
                message_reference: item.message_reference,
                status: DeliveryStatus::Requested,
                provider_message_id: Some(provider_message_id.to_string()),
                batch_reference: Some(batch_reference),
            },
            None => {
                warn!(
                    message_reference = %item.message_reference,
                    %batch_reference,
                    "Provider response did not acknowledge this item; marking it failed"
                );
                DeliveryOutcome {
                    message_reference: item.message_reference,
                    status: DeliveryStatus::Failed,
                    provider_message_id: None,
                    batch_reference: Some(batch_reference),
                }
            }
        })
        .collect()
}

/// Whole-batch failure: one failed outcome per sent item, no provider ids.
pub fn failed_outcomes(
    sent_items: &[MessageBatchItem],
    batch_reference: Uuid,
) -> Vec<DeliveryOutcome> {
    sent_items
        .iter()
        .map(|item| DeliveryOutcome {
            message_reference: item.message_reference,
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            batch_reference: Some(batch_reference),
        })
        .collect()
}
