//! event-receiver: process entrypoint
//!
//! Overview
//! --------
//! Loads configuration, installs logging, and runs the configured transports
//! (queue worker pool, HTTP endpoint, or Lambda handler) against a processor
//! that logs every event. Embedding applications supply their own processor
//! through `event_receiver::app::run`.
//!
//! Error Model
//! -----------
//! - Initialization failures are fatal.
//! - Per-event failures are logged and never terminate the process.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_receiver::app;
use event_receiver::config::load_config;
use event_receiver::errors::ProcessError;
use event_receiver::processor::{Json, JsonProcessor, PayloadMode, Processor};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().compact())
        .with(ErrorLayer::default())
        .init();
}

struct LogRaw;

#[async_trait]
impl Processor for LogRaw {
    async fn process(&self, event: Bytes) -> Result<(), ProcessError> {
        #[cfg(debug_assertions)]
        info!(
            payload_len = event.len(),
            payload_hex = hex::encode(&event[..event.len().min(64)]),
            "event received"
        );
        #[cfg(not(debug_assertions))]
        info!(payload_len = event.len(), "event received");
        Ok(())
    }
}

struct LogJson;

#[async_trait]
impl JsonProcessor for LogJson {
    type Event = serde_json::Value;

    async fn process_json(&self, event: serde_json::Value) -> Result<(), ProcessError> {
        info!(%event, "event received");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    info!("receiver starting");

    let config = Arc::new(load_config()?);
    let processor: Arc<dyn Processor> = match config.payload_mode {
        PayloadMode::Raw => Arc::new(LogRaw),
        PayloadMode::Json => Arc::new(Json(LogJson)),
    };

    app::run(config, processor).await?;
    info!("receiver stopped");
    Ok(())
}
