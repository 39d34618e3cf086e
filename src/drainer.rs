use std::collections::HashSet;

use anyhow::{Error, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::queue::QueueClient,
    models::message::{NotificationEvent, StatusUpdate},
};

/// The wire protocol's per-call receive ceiling.
pub const RECEIVE_BATCH_LIMIT: usize = 10;

#[derive(Debug)]
pub struct DrainResult {
    pub events: Vec<NotificationEvent>,
    pub is_empty: bool,
}

/// Log the queue's approximate depth counters before a drain pass.
pub async fn report_queue_status<Q: QueueClient>(queue: &Q) -> Result<(), Error> {
    let attributes = queue.queue_attributes().await?;

    info!(
        visible = attributes.visible,
        not_visible = attributes.not_visible,
        delayed = attributes.delayed,
        "Current queue attributes (a value that failed to fetch is reported as -1)"
    );

    Ok(())
}

/// Pulls up to `max_total` messages off the queue in receive batches of up
/// to 10 and parses them into notification events.
///
/// Returns `is_empty = true` when a receive comes back with no messages, or
/// with fewer than `min_batch_threshold`; a near-empty queue is treated as
/// drained rather than polled to exhaustion.
///
/// Draining is read-only: nothing is deleted and no visibility is changed.
/// Unparsable bodies and messages without a deduplication key are logged
/// and dropped from the returned set; within one drain call only the first
/// message per deduplication key survives.
pub async fn drain_queue<Q: QueueClient>(
    queue: &Q,
    max_total: usize,
    min_batch_threshold: usize,
    wait_seconds: u64,
) -> Result<DrainResult, Error> {
    let mut events: Vec<NotificationEvent> = Vec::new();
    let mut seen_dedup_keys: HashSet<String> = HashSet::new();
    let mut received_so_far = 0;
    let mut is_empty = false;
    let mut polling_iteration = 0;

    while received_so_far < max_total {
        polling_iteration += 1;

        let to_fetch = RECEIVE_BATCH_LIMIT.min(max_total - received_so_far);
        let messages = queue.receive(to_fetch, wait_seconds).await?;

        if messages.is_empty() {
            is_empty = true;
            info!(polling_iteration, "No messages received; marking queue as empty");
            break;
        }

        let batch_len = messages.len();
        info!(
            polling_iteration,
            message_ids = ?messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "Received messages from the queue. Parsing them"
        );

        for message in messages {
            let update: StatusUpdate = match serde_json::from_str(&message.body) {
                Ok(update) => update,
                Err(parse_error) => {
                    error!(
                        message_id = %message.id,
                        error = %parse_error,
                        "Failed to parse message body as JSON - omitting from processing"
                    );
                    continue;
                }
            };

            let dedup_key = match message.dedup_key {
                Some(key) if !key.is_empty() => key,
                _ => {
                    error!(
                        message_id = %message.id,
                        "Message missing deduplication key. Skipping this message"
                    );
                    continue;
                }
            };

            if !seen_dedup_keys.insert(dedup_key.clone()) {
                warn!(
                    message_id = %message.id,
                    deduplication_key = %dedup_key,
                    "Duplicate deduplication key encountered; skipping duplicate"
                );
                continue;
            }

            events.push(NotificationEvent {
                message_id: message.id,
                receipt_token: message.receipt_token,
                dedup_key,
                message_reference: Uuid::new_v4(),
                update,
            });
            received_so_far += 1;
        }

        // A small raw batch means the queue has barely enough messages to
        // keep consumers alive; stop instead of thrashing on it.
        if batch_len < min_batch_threshold {
            is_empty = true;
            info!(
                batch_len,
                "Received a small number of messages. Considering the queue drained"
            );
            break;
        }
    }

    info!(
        total = events.len(),
        deduplication_keys = ?events.iter().map(|e| e.dedup_key.as_str()).collect::<Vec<_>>(),
        "Retrieved messages from the queue"
    );

    Ok(DrainResult { events, is_empty })
}
