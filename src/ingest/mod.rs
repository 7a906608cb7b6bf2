//! Ingest abstraction
//!
//! Overview
//! --------
//! Minimal trait representing a poll-based external queue: receive with a
//! long-poll wait, and delete one delivery by its receipt. Concrete
//! implementations include AWS SQS (`crate::sqs`), Redis Streams
//! (`crate::redis`) and an in-process queue (`memory`).
//!
//! Implementations are shared by the poll loop and every worker, so they must
//! be safe to call concurrently.

use std::time::Duration;

use bytes::Bytes;

pub mod memory;

pub use memory::MemoryQueue;

/// One delivery fetched from the external queue.
///
/// `receipt` identifies this specific delivery and is only meaningful for
/// deleting it; a redelivery of the same body carries a new receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: Bytes,
    pub receipt: String,
}

impl QueueMessage {
    pub fn new(body: impl Into<Bytes>, receipt: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receipt: receipt.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait QueueClient: Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Fetch up to `max_messages`, waiting at most `wait` for the first one.
    /// Best effort: fewer or zero messages is a normal result.
    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, Self::Error>;

    /// Acknowledge a delivery so the backend does not redeliver it.
    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Self::Error>;
}
