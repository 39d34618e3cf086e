mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use notify_service::{
    clients::state_store::{InMemoryStateStore, StateStore, is_eligible},
    models::status::{DeliveryOutcome, DeliveryStateRecord, DeliveryStatus},
};
use uuid::Uuid;

use common::notification_event;

fn record_notified_at(seconds_ago: i64) -> DeliveryStateRecord {
    let event = notification_event("patient-1", "pharmacy-1");
    let outcome = DeliveryOutcome {
        message_reference: event.message_reference,
        status: DeliveryStatus::Requested,
        provider_message_id: Some("pm-1".to_string()),
        batch_reference: Some(Uuid::new_v4()),
    };
    let mut record = DeliveryStateRecord::from_outcome(&event, &outcome, 60 * 60);
    record.last_timestamp = Utc::now() - Duration::seconds(seconds_ago);
    record
}

/// Test: A recipient with no prior record is always eligible
#[test]
fn test_no_record_is_eligible() {
    assert!(is_eligible(None, Utc::now(), 900));
}

/// Test: Exactly at the cooldown boundary the notification is suppressed
#[test]
fn test_exact_boundary_is_suppressed() {
    let now = Utc::now();
    let mut record = record_notified_at(0);
    record.last_timestamp = now - Duration::seconds(900);

    assert!(!is_eligible(Some(&record), now, 900));
}

/// Test: One second past the cooldown the notification is allowed
#[test]
fn test_one_second_past_boundary_is_eligible() {
    let now = Utc::now();
    let mut record = record_notified_at(0);
    record.last_timestamp = now - Duration::seconds(901);

    assert!(is_eligible(Some(&record), now, 900));
}

/// Test: A recent notification is suppressed
#[test]
fn test_recent_notification_is_suppressed() {
    let now = Utc::now();
    let mut record = record_notified_at(0);
    record.last_timestamp = now - Duration::seconds(30);

    assert!(!is_eligible(Some(&record), now, 900));
}

/// Test: Records round-trip through the state store by recipient key
#[tokio::test]
async fn test_state_store_round_trip() -> Result<()> {
    let store = InMemoryStateStore::new();
    let record = record_notified_at(10);

    store.put(&record).await?;

    let event = notification_event("patient-1", "pharmacy-1");
    let loaded = store.get(&event.recipient_key()).await?;

    let loaded = loaded.expect("record should exist");
    assert_eq!(loaded.patient_id, "patient-1");
    assert_eq!(loaded.pharmacy_id, "pharmacy-1");
    assert_eq!(loaded.last_status, DeliveryStatus::Requested);
    assert!(
        loaded.expiry_time > Utc::now().timestamp(),
        "Expiry must be in the future"
    );

    Ok(())
}

/// Test: An upsert replaces the previous record for the same pair
#[tokio::test]
async fn test_state_store_upsert_replaces() -> Result<()> {
    let store = InMemoryStateStore::new();

    let first = record_notified_at(1000);
    store.put(&first).await?;

    let mut second = record_notified_at(0);
    second.last_status = DeliveryStatus::Failed;
    store.put(&second).await?;

    let event = notification_event("patient-1", "pharmacy-1");
    let loaded = store.get(&event.recipient_key()).await?.expect("record");

    assert_eq!(loaded.last_status, DeliveryStatus::Failed);
    assert_eq!(store.len().await, 1, "Upsert must not create a second row");

    Ok(())
}
