//! Processor contract
//!
//! Overview
//! --------
//! The single extension point for business logic. Every transport (HTTP,
//! queue pool, Lambda) hands each event to a `Processor` as opaque bytes and
//! reacts to the returned `Result`.
//!
//! Two payload variants are supported:
//! - raw: implement `Processor` (or wrap a closure with `processor_fn`); the
//!   bytes arrive exactly as delivered.
//! - json: implement `JsonProcessor` and wrap it in `Json`; the payload is
//!   decoded into `JsonProcessor::Event` first and malformed payloads are
//!   rejected with `ProcessError::InvalidJson` without invoking the inner processor.
//!
//! Concurrency
//! -----------
//! The worker pool calls `process` from up to `parallelism` tasks at once, so
//! implementations must be `Send + Sync` and should be idempotent: delivery is
//! at-least-once.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::errors::{ProcessError, ReceiverError};

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, event: Bytes) -> Result<(), ProcessError>;
}

/// Processor backed by an async closure.
pub struct ProcessorFn<F>(F);

pub fn processor_fn<F, Fut>(f: F) -> ProcessorFn<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    ProcessorFn(f)
}

#[async_trait]
impl<F, Fut> Processor for ProcessorFn<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    async fn process(&self, event: Bytes) -> Result<(), ProcessError> {
        (self.0)(event).await
    }
}

/// Processor for JSON payloads. Use `serde_json::Value` as `Event` to receive
/// the document untyped.
#[async_trait]
pub trait JsonProcessor: Send + Sync {
    type Event: DeserializeOwned + Send + 'static;

    async fn process_json(&self, event: Self::Event) -> Result<(), ProcessError>;
}

/// Adapts a `JsonProcessor` to the byte-level `Processor` contract.
pub struct Json<P>(pub P);

#[async_trait]
impl<P: JsonProcessor> Processor for Json<P> {
    async fn process(&self, event: Bytes) -> Result<(), ProcessError> {
        let decoded: P::Event = serde_json::from_slice(&event)
            .map_err(|e| ProcessError::InvalidJson(e.to_string()))?;
        self.0.process_json(decoded).await
    }
}

/// How payloads are presented to the configured processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    Raw,
    #[default]
    Json,
}

impl FromStr for PayloadMode {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "bytes" => Ok(PayloadMode::Raw),
            "json" => Ok(PayloadMode::Json),
            other => Err(ReceiverError::Config(format!(
                "PAYLOAD_MODE must be raw or json, got {other:?}"
            ))),
        }
    }
}
