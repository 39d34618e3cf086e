mod common;

use anyhow::Result;
use notify_service::{clients::queue::InMemoryQueueClient, drainer::drain_queue};

use common::{event_message, queue_message};

/// Test: Drain never accepts more events than requested
#[tokio::test]
async fn test_drain_respects_max_total() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    for i in 0..25 {
        queue
            .push(event_message(
                &format!("m{}", i),
                &format!("dedup-{}", i),
                &format!("patient-{}", i),
                "pharmacy-1",
            ))
            .await;
    }

    let result = drain_queue(&queue, 20, 5, 0).await?;

    assert_eq!(result.events.len(), 20, "Should accept exactly max_total");
    assert!(!result.is_empty, "Queue still has messages");
    assert_eq!(queue.available_len().await, 5);

    Ok(())
}

/// Test: Messages sharing a dedup key collapse to the first occurrence
#[tokio::test]
async fn test_duplicate_dedup_keys_keep_first_occurrence() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    queue
        .push(event_message("m1", "shared", "patient-1", "pharmacy-1"))
        .await;
    queue
        .push(event_message("m2", "shared", "patient-1", "pharmacy-1"))
        .await;
    queue
        .push(event_message("m3", "shared", "patient-1", "pharmacy-1"))
        .await;
    queue
        .push(event_message("m4", "other", "patient-2", "pharmacy-1"))
        .await;

    let result = drain_queue(&queue, 100, 5, 0).await?;

    assert_eq!(result.events.len(), 2, "One survivor per dedup key");
    assert_eq!(
        result.events[0].message_id, "m1",
        "First occurrence should win"
    );
    assert_eq!(result.events[1].message_id, "m4");

    Ok(())
}

/// Test: Messages without a dedup key are dropped
#[tokio::test]
async fn test_missing_dedup_key_is_dropped() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    let body = serde_json::to_string(&common::status_update("patient-1", "pharmacy-1"))?;
    queue.push(queue_message("m1", None, &body)).await;
    queue
        .push(event_message("m2", "dedup-2", "patient-2", "pharmacy-1"))
        .await;

    let result = drain_queue(&queue, 100, 5, 0).await?;

    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].message_id, "m2");

    Ok(())
}

/// Test: Unparsable bodies are dropped without deleting the message
#[tokio::test]
async fn test_malformed_body_is_dropped_not_deleted() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    queue
        .push(queue_message("bad", Some("dedup-bad"), "{ not json }"))
        .await;
    queue
        .push(event_message("good", "dedup-good", "patient-1", "pharmacy-1"))
        .await;

    let result = drain_queue(&queue, 100, 5, 0).await?;

    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].message_id, "good");
    assert!(
        queue.deleted_ids().await.is_empty(),
        "Draining must never delete"
    );

    Ok(())
}

/// Test: Draining an empty queue twice is idempotent
#[tokio::test]
async fn test_empty_queue_drained_twice() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    let first = drain_queue(&queue, 100, 5, 0).await?;
    let second = drain_queue(&queue, 100, 5, 0).await?;

    assert!(first.events.is_empty() && first.is_empty);
    assert!(second.events.is_empty() && second.is_empty);

    Ok(())
}

/// Test: A receive below the minimum batch threshold ends the drain
#[tokio::test]
async fn test_small_batch_treated_as_drained() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    for i in 0..3 {
        queue
            .push(event_message(
                &format!("m{}", i),
                &format!("dedup-{}", i),
                &format!("patient-{}", i),
                "pharmacy-1",
            ))
            .await;
    }

    let result = drain_queue(&queue, 100, 5, 0).await?;

    assert_eq!(result.events.len(), 3);
    assert!(result.is_empty, "A 3-message batch is below the threshold");
    assert_eq!(
        queue.receive_calls().await,
        1,
        "Should not poll again after a small batch"
    );

    Ok(())
}

/// Test: Resetting visibility returns an in-flight message to the queue
#[tokio::test]
async fn test_visibility_reset_requeues_message() -> Result<()> {
    use notify_service::clients::queue::QueueClient;

    let queue = InMemoryQueueClient::new();
    queue
        .push(event_message("m1", "dedup-1", "patient-1", "pharmacy-1"))
        .await;

    let received = queue.receive(10, 0).await?;
    assert_eq!(received.len(), 1);
    assert_eq!(queue.available_len().await, 0);

    queue
        .change_visibility(&received[0].id, &received[0].receipt_token, 0)
        .await?;

    assert_eq!(queue.available_len().await, 1, "Message is visible again");

    let result = drain_queue(&queue, 100, 5, 0).await?;
    assert_eq!(result.events.len(), 1);

    Ok(())
}

/// Test: Every event gets a unique message reference within a drain cycle
#[tokio::test]
async fn test_message_references_are_unique() -> Result<()> {
    let queue = InMemoryQueueClient::new();

    for i in 0..12 {
        queue
            .push(event_message(
                &format!("m{}", i),
                &format!("dedup-{}", i),
                &format!("patient-{}", i),
                "pharmacy-1",
            ))
            .await;
    }

    let result = drain_queue(&queue, 100, 5, 0).await?;

    let mut references: Vec<_> = result
        .events
        .iter()
        .map(|e| e.message_reference)
        .collect();
    references.sort();
    references.dedup();

    assert_eq!(references.len(), result.events.len());

    Ok(())
}
