use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::{Client, header::RETRY_AFTER};
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    batch::{build_batch, estimated_size, failed_outcomes, reconcile},
    clients::auth::token_exchange,
    config::Config,
    models::{
        batch::{MessageBatchRequest, MessageBatchResponse},
        message::NotificationEvent,
        retry::RetryConfig,
        status::{DeliveryOutcome, DeliveryStatus},
    },
    utils::retry_with_backoff_hinted,
};

/// Fixed artificial delay for fabricated silent-mode responses.
const SILENT_DISPATCH_DELAY_MS: u64 = 150;

/// Defensive cap on batch-splitting recursion. Strict halving makes this
/// unreachable for any realistic batch; at the cap the batch is sent as-is.
const MAX_SPLIT_DEPTH: u32 = 32;

/// How delivery requests are made. Resolved from configuration once, at
/// client construction, so the dispatcher itself carries no hidden global.
pub enum DispatchMode {
    /// Fabricate successful responses without contacting the provider.
    Silent,
    /// Authenticated requests against the real provider.
    Live {
        base_url: String,
        api_key: String,
        private_key: String,
        key_id: String,
    },
}

pub struct NotifyClient {
    http_client: Client,
    mode: DispatchMode,
    routing_plan_id: String,
    max_batch_items: usize,
    max_batch_bytes: usize,
    retry_config: RetryConfig,
}

impl NotifyClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let mode = if config.silent_running {
            info!("Delivery client initialized in silent running mode");
            DispatchMode::Silent
        } else {
            let base_url = config
                .provider_base_url
                .clone()
                .ok_or_else(|| anyhow!("PROVIDER_BASE_URL must be set for live delivery"))?;
            let api_key = config
                .provider_api_key
                .clone()
                .ok_or_else(|| anyhow!("PROVIDER_API_KEY must be set for live delivery"))?;
            let private_key = config
                .provider_private_key
                .clone()
                .ok_or_else(|| anyhow!("PROVIDER_PRIVATE_KEY must be set for live delivery"))?;
            let key_id = config
                .provider_key_id
                .clone()
                .ok_or_else(|| anyhow!("PROVIDER_KEY_ID must be set for live delivery"))?;

            // Secrets may arrive with stray whitespace; trim before use.
            let base_url = base_url.trim().to_string();

            info!(base_url = %base_url, "Delivery client initialized in live mode");
            DispatchMode::Live {
                base_url,
                api_key,
                private_key,
                key_id,
            }
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.dispatch_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        Ok(Self {
            http_client,
            mode,
            routing_plan_id: config.routing_plan_id.clone(),
            max_batch_items: config.max_batch_items,
            max_batch_bytes: config.max_batch_bytes,
            retry_config: config.retry_config(),
        })
    }

    /// Dispatch the given events to the provider, splitting oversized
    /// batches, and return exactly one outcome per batched event in input
    /// order.
    ///
    /// Per-batch delivery failures become `failed` outcomes. An `Err` is
    /// returned only for failures before any send (token exchange), in
    /// which case nothing was delivered and every message may safely be
    /// retried.
    pub async fn dispatch(
        &self,
        events: &[NotificationEvent],
    ) -> Result<Vec<DeliveryOutcome>, Error> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        match &self.mode {
            DispatchMode::Silent => Ok(self.dispatch_silent(events).await),
            DispatchMode::Live {
                base_url,
                api_key,
                private_key,
                key_id,
            } => {
                // One token per dispatch cycle, shared by every split.
                let token =
                    token_exchange(&self.http_client, base_url, api_key, private_key, key_id)
                        .await?;
                self.dispatch_live(events, base_url, &token, 0).await
            }
        }
    }

    async fn dispatch_silent(&self, events: &[NotificationEvent]) -> Vec<DeliveryOutcome> {
        info!("Not making real delivery requests. Waiting briefly and returning success for all messages");

        sleep(Duration::from_millis(SILENT_DISPATCH_DELAY_MS)).await;

        let batch_reference = Uuid::new_v4();
        let outcomes: Vec<DeliveryOutcome> = events
            .iter()
            .map(|event| DeliveryOutcome {
                message_reference: event.message_reference,
                status: DeliveryStatus::SilentRunning,
                provider_message_id: Some(Uuid::new_v4().to_string()),
                batch_reference: Some(batch_reference),
            })
            .collect();

        info!(
            %batch_reference,
            count = outcomes.len(),
            "Requested notifications OK (silent running)"
        );

        outcomes
    }

    fn dispatch_live<'a>(
        &'a self,
        events: &'a [NotificationEvent],
        base_url: &'a str,
        token: &'a str,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeliveryOutcome>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let batch = build_batch(&self.routing_plan_id, events);
            let size = estimated_size(&batch)?;

            let oversized =
                batch.items.len() >= self.max_batch_items || size > self.max_batch_bytes;
            if oversized && events.len() > 1 && depth < MAX_SPLIT_DEPTH {
                info!(
                    item_count = batch.items.len(),
                    estimated_size = size,
                    "Batch exceeds provider limits - splitting in half and trying again"
                );

                let mid = events.len() / 2;
                let (first_half, second_half) = events.split_at(mid);

                // Both halves address disjoint events with independent batch
                // references, so they can run concurrently.
                let (first, second) = tokio::join!(
                    self.dispatch_live(first_half, base_url, token, depth + 1),
                    self.dispatch_live(second_half, base_url, token, depth + 1),
                );

                let mut outcomes = first?;
                outcomes.extend(second?);
                return Ok(outcomes);
            }

            Ok(self.send_batch(base_url, token, batch).await)
        })
    }

    /// Send one size-checked batch. Delivery failure after the retry budget
    /// is a whole-batch failure: every item gets a failed outcome and no
    /// provider id. Partial success only ever comes from prior splitting.
    async fn send_batch(
        &self,
        base_url: &str,
        token: &str,
        batch: MessageBatchRequest,
    ) -> Vec<DeliveryOutcome> {
        let batch_reference = batch.batch_reference;

        info!(
            count = batch.items.len(),
            routing_plan_id = %self.routing_plan_id,
            %batch_reference,
            "Requesting notifications from the delivery provider"
        );

        let result = retry_with_backoff_hinted(
            &self.retry_config,
            |e: &DispatchError| e.retry_after,
            || self.post_batch_once(base_url, token, &batch),
        )
        .await;

        match result {
            Ok(response) => {
                info!(
                    %batch_reference,
                    acknowledged = response.items.len(),
                    "Requested notifications OK"
                );
                reconcile(&batch.items, &response, batch_reference)
            }
            Err(e) => {
                error!(
                    error = %e,
                    %batch_reference,
                    item_count = batch.items.len(),
                    "Batch request failed; marking every item in the batch failed"
                );
                failed_outcomes(&batch.items, batch_reference)
            }
        }
    }

    async fn post_batch_once(
        &self,
        base_url: &str,
        token: &str,
        batch: &MessageBatchRequest,
    ) -> Result<MessageBatchResponse, DispatchError> {
        let response = self
            .http_client
            .post(format!("{}/batches", base_url))
            .bearer_auth(token)
            .json(batch)
            .send()
            .await
            .map_err(|e| DispatchError {
                message: format!("Provider request failed: {}", e),
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);

            return Err(DispatchError {
                message: format!("Provider returned status {}", status),
                retry_after,
            });
        }

        response
            .json::<MessageBatchResponse>()
            .await
            .map_err(|e| DispatchError {
                message: format!("Failed to parse provider response: {}", e),
                retry_after: None,
            })
    }
}

/// A failed delivery attempt, carrying the provider's rate-limit hint when
/// one was supplied.
#[derive(Debug)]
struct DispatchError {
    message: String,
    retry_after: Option<Duration>,
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
