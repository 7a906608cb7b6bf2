//! Error types for event-receiver
//!
//! Overview
//! --------
//! Two enumerations cover the crate:
//! - `ReceiverError`: infrastructure failures (configuration, queue transport,
//!   HTTP listener, Lambda runtime). Returned from wiring code and from the
//!   queue client implementations.
//! - `ProcessError`: the outcome a `Processor` reports for one event. Transport
//!   adapters map it onto their own surface (HTTP status, Lambda failure, or
//!   "leave the message in the queue").
//!
//! Usage
//! -----
//! - Convert third-party errors (AWS SDK, Redis, hyper) at the module edge.
//! - Use `tracing` for context at call sites; errors carry only a message.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Missing or invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure to construct a queue client or connection pool.
    #[error("Queue initialization failed: {0}")]
    QueueInit(String),

    /// Receive/delete failures reported by the external queue.
    #[error("Queue transport error: {0}")]
    QueueTransport(String),

    /// Binding or serving the HTTP boundary failed.
    #[error("HTTP server error: {0}")]
    Http(String),

    /// The Lambda runtime exited with an error.
    #[error("Lambda runtime error: {0}")]
    Lambda(String),

    /// A record in a serverless batch failed; the whole batch fails with it.
    #[error("Batch record {index} failed: {source}")]
    BatchRecord {
        index: usize,
        #[source]
        source: ProcessError,
    },

    #[error("Unknown error: {0}")]
    Unknown(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Outcome of a failed `Processor` invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The `Json` adapter could not decode the payload; the inner processor
    /// was never called. The only variant HTTP answers with `400`.
    #[error("JSON decoding failed: {0}")]
    InvalidJson(String),

    /// The processor itself could not decode the payload.
    #[error("Payload decoding failed: {0}")]
    Decode(String),

    /// Business logic rejected the event. The message is shown verbatim to
    /// HTTP callers.
    #[error("{0}")]
    Failed(String),
}

impl ProcessError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ProcessError::Failed(msg.into())
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ProcessError::Decode(_) | ProcessError::InvalidJson(_))
    }

    /// True only for payloads rejected before reaching the processor.
    pub fn is_invalid_json(&self) -> bool {
        matches!(self, ProcessError::InvalidJson(_))
    }
}

impl From<serde_json::Error> for ProcessError {
    fn from(e: serde_json::Error) -> Self {
        ProcessError::Decode(e.to_string())
    }
}

impl From<anyhow::Error> for ProcessError {
    fn from(e: anyhow::Error) -> Self {
        ProcessError::Failed(format!("{e:#}"))
    }
}
