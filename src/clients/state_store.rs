use std::collections::{HashMap, HashSet};

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    config::Config,
    models::{message::RecipientKey, status::DeliveryStateRecord},
};

/// The recipient-state contract: one `DeliveryStateRecord` per
/// patient/pharmacy pair, read before dispatch and upserted after.
#[allow(async_fn_in_trait)]
pub trait StateStore {
    async fn get(&self, key: &RecipientKey) -> Result<Option<DeliveryStateRecord>, Error>;

    async fn put(&self, record: &DeliveryStateRecord) -> Result<(), Error>;
}

/// Returns true if the recipient may be notified now.
///
/// No record means the pair was never notified, so it is always eligible.
/// Exactly at the cooldown boundary the notification is still suppressed.
pub fn is_eligible(
    record: Option<&DeliveryStateRecord>,
    now: DateTime<Utc>,
    cooldown_seconds: i64,
) -> bool {
    match record {
        None => true,
        Some(record) => (now - record.last_timestamp).num_seconds() > cooldown_seconds,
    }
}

pub struct RedisStateStore {
    connection: MultiplexedConnection,
}

impl RedisStateStore {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis state store");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis client"))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    fn record_key(key: &RecipientKey) -> String {
        format!("notify:state:{}:{}", key.patient_id, key.pharmacy_id)
    }
}

impl StateStore for RedisStateStore {
    async fn get(&self, key: &RecipientKey) -> Result<Option<DeliveryStateRecord>, Error> {
        let mut connection = self.connection.clone();
        let record_key = Self::record_key(key);

        let value: Option<String> = connection
            .get(&record_key)
            .await
            .map_err(|e| anyhow!("Failed to read delivery state: {}", e))?;

        match value {
            None => Ok(None),
            Some(raw) => {
                let record: DeliveryStateRecord = serde_json::from_str(&raw)
                    .map_err(|e| anyhow!("Corrupt delivery state for {}: {}", record_key, e))?;
                Ok(Some(record))
            }
        }
    }

    async fn put(&self, record: &DeliveryStateRecord) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        let record_key = Self::record_key(&RecipientKey {
            patient_id: record.patient_id.clone(),
            pharmacy_id: record.pharmacy_id.clone(),
        });

        // The record's expiry drives the store TTL, so stale state is
        // reclaimed without a sweeper.
        let ttl = (record.expiry_time - Utc::now().timestamp()).max(1) as u64;
        let raw = serde_json::to_string(record)?;

        connection
            .set_ex::<_, _, ()>(&record_key, raw, ttl)
            .await
            .map_err(|e| anyhow!("Failed to write delivery state: {}", e))?;

        debug!(
            patient_id = %record.patient_id,
            pharmacy_id = %record.pharmacy_id,
            status = %record.last_status,
            "Upserted delivery state record"
        );

        Ok(())
    }
}

/// In-memory state store for tests and local silent runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<InMemoryStateStoreState>,
}

#[derive(Default)]
struct InMemoryStateStoreState {
    records: HashMap<RecipientKey, DeliveryStateRecord>,
    failing_puts: HashSet<RecipientKey>,
    fail_reads: bool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, record: DeliveryStateRecord) {
        let key = RecipientKey {
            patient_id: record.patient_id.clone(),
            pharmacy_id: record.pharmacy_id.clone(),
        };
        self.state.lock().await.records.insert(key, record);
    }

    pub async fn fail_puts_for(&self, key: RecipientKey) {
        self.state.lock().await.failing_puts.insert(key);
    }

    pub async fn fail_reads(&self) {
        self.state.lock().await.fail_reads = true;
    }

    pub async fn record(&self, key: &RecipientKey) -> Option<DeliveryStateRecord> {
        self.state.lock().await.records.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &RecipientKey) -> Result<Option<DeliveryStateRecord>, Error> {
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(anyhow!("simulated state store read failure"));
        }
        Ok(state.records.get(key).cloned())
    }

    async fn put(&self, record: &DeliveryStateRecord) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let key = RecipientKey {
            patient_id: record.patient_id.clone(),
            pharmacy_id: record.pharmacy_id.clone(),
        };
        if state.failing_puts.contains(&key) {
            return Err(anyhow!("simulated state store write failure"));
        }
        state.records.insert(key, record.clone());
        Ok(())
    }
}
