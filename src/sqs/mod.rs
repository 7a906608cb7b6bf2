//! AWS SQS integration.
//!
//! `SqsQueue` implements `QueueClient` over `aws-sdk-sqs`: receive is a
//! long-poll `ReceiveMessage`, delete is `DeleteMessage` with the receipt
//! handle. The queue identifier is the queue URL.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use bytes::Bytes;
use tracing::warn;

use crate::errors::ReceiverError;
use crate::ingest::{QueueClient, QueueMessage};

/// Service limit for `MaxNumberOfMessages`.
pub const MAX_BATCH: usize = 10;
/// Service limit for `WaitTimeSeconds`.
pub const MAX_WAIT_SECONDS: u64 = 20;

/// Build an SQS client from environment (AWS_* vars, optional endpoint override
/// for ElasticMQ / LocalStack).
pub async fn create_sqs_client_from_env(region: &str, endpoint_url: Option<&str>) -> Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let cfg = loader.load().await;
    Client::new(&cfg)
}

#[derive(Clone, Debug)]
pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Clamp pool-level request sizes to what SQS accepts.
pub fn receive_limits(max_messages: usize, wait: Duration) -> (i32, i32) {
    let max = max_messages.clamp(1, MAX_BATCH) as i32;
    let wait = wait.as_secs().min(MAX_WAIT_SECONDS) as i32;
    (max, wait)
}

#[async_trait::async_trait]
impl QueueClient for SqsQueue {
    type Error = ReceiverError;

    #[tracing::instrument(skip(self, wait), fields(wait_secs = wait.as_secs()))]
    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, Self::Error> {
        let (max, wait_secs) = receive_limits(max_messages, wait);
        let out = self
            .client
            .receive_message()
            .queue_url(queue)
            .max_number_of_messages(max)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| {
                ReceiverError::QueueTransport(format!("receive_message: {}", DisplayErrorContext(&e)))
            })?;

        let mut batch = Vec::new();
        for m in out.messages.unwrap_or_default() {
            let Some(receipt) = m.receipt_handle else {
                warn!(message_id = ?m.message_id, "message without receipt handle skipped");
                continue;
            };
            let body = m.body.unwrap_or_default();
            batch.push(QueueMessage::new(Bytes::from(body), receipt));
        }
        Ok(batch)
    }

    #[tracing::instrument(skip(self, receipt))]
    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Self::Error> {
        self.client
            .delete_message()
            .queue_url(queue)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| {
                ReceiverError::QueueTransport(format!("delete_message: {}", DisplayErrorContext(&e)))
            })?;
        Ok(())
    }
}
