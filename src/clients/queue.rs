use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{config::Config, models::message::QueueMessage};

/// The source-queue contract: receive with long polling, batched deletes,
/// and visibility changes. Receiving never mutates the queue; deletion is a
/// separate step gated on successful processing.
#[allow(async_fn_in_trait)]
pub trait QueueClient {
    async fn receive(&self, max_messages: usize, wait_seconds: u64)
    -> Result<Vec<QueueMessage>, Error>;

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<DeleteBatchResult, Error>;

    async fn change_visibility(
        &self,
        id: &str,
        receipt_token: &str,
        timeout_seconds: u64,
    ) -> Result<(), Error>;

    async fn queue_attributes(&self) -> Result<QueueAttributes, Error>;
}

#[derive(Debug, Clone)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteBatchResult {
    pub failed: Vec<FailedDelete>,
}

#[derive(Debug, Clone)]
pub struct FailedDelete {
    pub id: String,
    pub reason: String,
}

/// Approximate queue depth counters. A value of -1 means the attribute was
/// missing or unparsable, so missing data stays identifiable in logs.
#[derive(Debug, Clone, Copy)]
pub struct QueueAttributes {
    pub visible: i64,
    pub not_visible: i64,
    pub delayed: i64,
}

/// Queue client speaking the SQS-compatible JSON wire protocol.
pub struct HttpQueueClient {
    http_client: Client,
    queue_url: String,
}

impl HttpQueueClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        // The long-poll receive holds the connection open for up to
        // `receive_wait_seconds`, so the client timeout must sit above it.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.receive_wait_seconds + 10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(queue_url = %config.queue_url, "Queue client initialized");

        Ok(Self {
            http_client,
            queue_url: config.queue_url.clone(),
        })
    }

    async fn send_command<B, R>(&self, target: &str, body: &B) -> Result<R, Error>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http_client
            .post(&self.queue_url)
            .header("Content-Type", "application/x-amz-json-1.0")
            .header("X-Amz-Target", target)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("Queue request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Queue returned status {}: {}", status, error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| anyhow!("Failed to parse queue response: {}", e))
    }
}

impl QueueClient for HttpQueueClient {
    async fn receive(
        &self,
        max_messages: usize,
        wait_seconds: u64,
    ) -> Result<Vec<QueueMessage>, Error> {
        let request = ReceiveMessageRequest {
            queue_url: &self.queue_url,
            max_number_of_messages: max_messages,
            wait_time_seconds: wait_seconds,
            message_system_attribute_names: &["MessageDeduplicationId", "MessageGroupId"],
        };

        let response: ReceiveMessageResponse = self
            .send_command("AmazonSQS.ReceiveMessage", &request)
            .await?;

        let messages = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage {
                id: m.message_id,
                receipt_token: m.receipt_handle,
                dedup_key: m
                    .attributes
                    .as_ref()
                    .and_then(|a| a.get("MessageDeduplicationId").cloned()),
                group_key: m
                    .attributes
                    .as_ref()
                    .and_then(|a| a.get("MessageGroupId").cloned()),
                body: m.body.unwrap_or_default(),
            })
            .collect();

        Ok(messages)
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<DeleteBatchResult, Error> {
        let request = DeleteMessageBatchRequest {
            queue_url: &self.queue_url,
            entries: entries
                .iter()
                .map(|e| DeleteMessageBatchEntry {
                    id: &e.id,
                    receipt_handle: &e.receipt_token,
                })
                .collect(),
        };

        let response: DeleteMessageBatchResponse = self
            .send_command("AmazonSQS.DeleteMessageBatch", &request)
            .await?;

        let failed = response
            .failed
            .unwrap_or_default()
            .into_iter()
            .map(|f| FailedDelete {
                id: f.id,
                reason: f.message.unwrap_or_else(|| f.code),
            })
            .collect();

        Ok(DeleteBatchResult { failed })
    }

    async fn change_visibility(
        &self,
        _id: &str,
        receipt_token: &str,
        timeout_seconds: u64,
    ) -> Result<(), Error> {
        let request = ChangeMessageVisibilityRequest {
            queue_url: &self.queue_url,
            receipt_handle: receipt_token,
            visibility_timeout: timeout_seconds,
        };

        // The visibility call returns an empty body on success.
        let response = self
            .http_client
            .post(&self.queue_url)
            .header("Content-Type", "application/x-amz-json-1.0")
            .header("X-Amz-Target", "AmazonSQS.ChangeMessageVisibility")
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Queue request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Queue returned status {}: {}", status, error_text));
        }

        debug!(receipt_token, timeout_seconds, "Changed message visibility");

        Ok(())
    }

    async fn queue_attributes(&self) -> Result<QueueAttributes, Error> {
        let request = GetQueueAttributesRequest {
            queue_url: &self.queue_url,
            attribute_names: &[
                "ApproximateNumberOfMessages",
                "ApproximateNumberOfMessagesNotVisible",
                "ApproximateNumberOfMessagesDelayed",
            ],
        };

        let response: GetQueueAttributesResponse = self
            .send_command("AmazonSQS.GetQueueAttributes", &request)
            .await?;

        let attributes = response.attributes.unwrap_or_default();
        let parse = |name: &str| -> i64 {
            attributes
                .get(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or(-1)
        };

        Ok(QueueAttributes {
            visible: parse("ApproximateNumberOfMessages"),
            not_visible: parse("ApproximateNumberOfMessagesNotVisible"),
            delayed: parse("ApproximateNumberOfMessagesDelayed"),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: usize,
    wait_time_seconds: u64,
    message_system_attribute_names: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    messages: Option<Vec<ReceivedMessage>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceivedMessage {
    message_id: String,
    receipt_handle: String,
    body: Option<String>,
    attributes: Option<HashMap<String, String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: Vec<DeleteMessageBatchEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchEntry<'a> {
    id: &'a str,
    receipt_handle: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchResponse {
    failed: Option<Vec<DeleteMessageBatchError>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageBatchError {
    id: String,
    code: String,
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeMessageVisibilityRequest<'a> {
    queue_url: &'a str,
    receipt_handle: &'a str,
    visibility_timeout: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest<'a> {
    queue_url: &'a str,
    attribute_names: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    attributes: Option<HashMap<String, String>>,
}

/// In-memory queue with receive/delete semantics, used by tests and local
/// silent runs. Received messages move to an in-flight set and stay there
/// until deleted or made visible again.
#[derive(Default)]
pub struct InMemoryQueueClient {
    state: Mutex<InMemoryQueueState>,
}

#[derive(Default)]
struct InMemoryQueueState {
    available: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
    receive_calls: usize,
}

impl InMemoryQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, message: QueueMessage) {
        self.state.lock().await.available.push_back(message);
    }

    /// Make future deletes of this message id report as failed.
    pub async fn fail_deletes_for(&self, id: &str) {
        self.state.lock().await.failing_deletes.insert(id.to_string());
    }

    pub async fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn available_len(&self) -> usize {
        self.state.lock().await.available.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn receive_calls(&self) -> usize {
        self.state.lock().await.receive_calls
    }
}

impl QueueClient for InMemoryQueueClient {
    async fn receive(
        &self,
        max_messages: usize,
        _wait_seconds: u64,
    ) -> Result<Vec<QueueMessage>, Error> {
        let mut state = self.state.lock().await;
        state.receive_calls += 1;

        let mut batch = Vec::new();
        while batch.len() < max_messages {
            match state.available.pop_front() {
                Some(message) => {
                    state
                        .in_flight
                        .insert(message.receipt_token.clone(), message.clone());
                    batch.push(message);
                }
                None => break,
            }
        }

        Ok(batch)
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<DeleteBatchResult, Error> {
        let mut state = self.state.lock().await;
        let mut failed = Vec::new();

        for entry in entries {
            if state.failing_deletes.contains(&entry.id) {
                failed.push(FailedDelete {
                    id: entry.id.clone(),
                    reason: "simulated delete failure".to_string(),
                });
                continue;
            }
            state.in_flight.remove(&entry.receipt_token);
            state.deleted.push(entry.id.clone());
        }

        Ok(DeleteBatchResult { failed })
    }

    async fn change_visibility(
        &self,
        _id: &str,
        receipt_token: &str,
        timeout_seconds: u64,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if timeout_seconds == 0 {
            if let Some(message) = state.in_flight.remove(receipt_token) {
                state.available.push_back(message);
            }
        }
        Ok(())
    }

    async fn queue_attributes(&self) -> Result<QueueAttributes, Error> {
        let state = self.state.lock().await;
        Ok(QueueAttributes {
            visible: state.available.len() as i64,
            not_visible: state.in_flight.len() as i64,
            delayed: 0,
        })
    }
}
