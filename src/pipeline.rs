use std::collections::HashMap;

use anyhow::{Error, Result};
use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{
        database::DatabaseClient,
        notify::NotifyClient,
        queue::{DeleteEntry, QueueClient},
        state_store::{StateStore, is_eligible},
    },
    config::Config,
    drainer::{DrainResult, drain_queue, report_queue_status},
    models::{
        audit::CreateAuditLog,
        message::NotificationEvent,
        status::DeliveryStateRecord,
    },
};

/// The wire protocol's per-call delete ceiling.
pub const DELETE_BATCH_LIMIT: usize = 10;

/// Run the notification dispatch pipeline until the queue reports empty or
/// the runtime budget is exhausted. This is the unit of work an external
/// scheduler invokes.
pub async fn run<Q, S>(
    config: &Config,
    queue: &Q,
    state_store: &S,
    notify_client: &NotifyClient,
    database_client: Option<&DatabaseClient>,
) -> Result<(), Error>
where
    Q: QueueClient,
    S: StateStore,
{
    let started = Instant::now();
    let budget = std::time::Duration::from_secs(config.max_runtime_seconds);

    if let Err(e) = report_queue_status(queue).await {
        warn!(error = %e, "Failed to report queue status");
    }

    let mut queue_drained = false;

    // Keep pulling until the drainer reports the queue as effectively empty.
    while !queue_drained {
        if started.elapsed() >= budget {
            warn!(
                elapsed_seconds = started.elapsed().as_secs(),
                "Runtime budget exhausted; not starting another drain iteration"
            );
            break;
        }

        let DrainResult { events, is_empty } = drain_queue(
            queue,
            config.max_drain_messages,
            config.min_batch_threshold,
            config.receive_wait_seconds,
        )
        .await?;
        queue_drained = is_empty;

        if events.is_empty() {
            info!("No messages to process");
            continue;
        }

        let total_fetched = events.len();

        // Check cooldowns in parallel, then partition. A read failure
        // aborts the cycle before anything is sent: eligibility is never
        // assumed, and undelivered messages redeliver after their
        // visibility timeout.
        let now = Utc::now();
        let checks = events.iter().map(|event| async move {
            let record = state_store.get(&event.recipient_key()).await?;
            Ok::<bool, Error>(is_eligible(record.as_ref(), now, config.cooldown_seconds))
        });
        let eligibility = join_all(checks).await;

        let mut to_process: Vec<NotificationEvent> = Vec::new();
        let mut suppressed: Vec<NotificationEvent> = Vec::new();
        for (event, allowed) in events.into_iter().zip(eligibility) {
            if allowed? {
                to_process.push(event);
            } else {
                suppressed.push(event);
            }
        }

        let suppressed_count = suppressed.len();
        if to_process.is_empty() {
            info!(
                suppressed_count,
                total_fetched, "All messages suppressed by cooldown; nothing to notify"
            );
        } else if suppressed_count > 0 {
            info!(
                suppressed_count,
                total_fetched, "Suppressed messages due to cooldown"
            );
        }

        if !suppressed.is_empty() {
            // Suppressed messages count as processed and leave the queue.
            let entries = delete_entries(&suppressed);
            clear_completed_messages(queue, &entries).await;
        }

        if to_process.is_empty() {
            continue;
        }

        info!(
            count = to_process.len(),
            request_ids = ?to_process
                .iter()
                .map(|e| e.update.request_id.as_str())
                .collect::<Vec<_>>(),
            "Fetched prescription notification messages requiring delivery"
        );

        let outcomes = match notify_client.dispatch(&to_process).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(
                    error = %e,
                    count = to_process.len(),
                    "Failed to make notification requests for these messages. Will retry"
                );
                continue;
            }
        };

        let by_reference: HashMap<Uuid, &NotificationEvent> = to_process
            .iter()
            .map(|event| (event.message_reference, event))
            .collect();

        // Persist one state record per outcome. A write failure blocks only
        // that message's deletion; its siblings still complete.
        let mut completed: Vec<DeleteEntry> = Vec::new();
        for outcome in &outcomes {
            let Some(event) = by_reference.get(&outcome.message_reference) else {
                warn!(
                    message_reference = %outcome.message_reference,
                    "Outcome does not match any dispatched event; ignoring"
                );
                continue;
            };

            let record =
                DeliveryStateRecord::from_outcome(event, outcome, config.state_ttl_seconds);
            match state_store.put(&record).await {
                Ok(()) => completed.push(DeleteEntry {
                    id: event.message_id.clone(),
                    receipt_token: event.receipt_token.clone(),
                }),
                Err(e) => {
                    error!(
                        error = %e,
                        patient_id = %event.update.patient_id,
                        pharmacy_id = %event.update.pharmacy_id,
                        "Failed to write delivery state record; leaving message for redelivery"
                    );
                }
            }

            if let Some(database_client) = database_client {
                let audit_log = CreateAuditLog::new(
                    event.update.request_id.clone(),
                    event.update.patient_id.clone(),
                    event.update.pharmacy_id.clone(),
                    event.update.status.clone(),
                    outcome.status,
                    outcome.message_reference,
                )
                .with_batch_reference(outcome.batch_reference)
                .with_provider_message_id(outcome.provider_message_id.clone());

                if let Err(log_err) = database_client.log_delivery(audit_log).await {
                    warn!(error = %log_err, "Failed to write audit log");
                }
            }
        }

        // Deleting only after the state write keeps failed messages on the
        // queue, to be retried by a later drain cycle.
        clear_completed_messages(queue, &completed).await;
    }

    Ok(())
}

fn delete_entries(events: &[NotificationEvent]) -> Vec<DeleteEntry> {
    events
        .iter()
        .map(|event| DeleteEntry {
            id: event.message_id.clone(),
            receipt_token: event.receipt_token.clone(),
        })
        .collect()
}

/// Delete processed messages in batches of up to 10. A failed batch or
/// entry is logged and not retried inline - the messages reappear after
/// their visibility timeout, and reprocessing is safe because state-store
/// writes are idempotent upserts.
async fn clear_completed_messages<Q: QueueClient>(queue: &Q, entries: &[DeleteEntry]) {
    let batch_count = entries.len().div_ceil(DELETE_BATCH_LIMIT);

    for (index, chunk) in entries.chunks(DELETE_BATCH_LIMIT).enumerate() {
        info!(
            batch = index + 1,
            batch_count,
            batch_size = chunk.len(),
            message_ids = ?chunk.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "Deleting processed message batch"
        );

        match queue.delete_batch(chunk).await {
            Ok(result) if result.failed.is_empty() => {
                info!(batch = index + 1, "Successfully deleted message batch");
            }
            Ok(result) => {
                error!(
                    failed_ids = ?result.failed.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
                    "Some messages failed to delete in this batch"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to delete message batch");
            }
        }
    }
}
