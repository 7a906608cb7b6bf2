//! Process configuration (environment + optional `.env`) and the immutable
//! per-run `PoolConfig`.

use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ReceiverError;
use crate::processor::PayloadMode;

/// Which external queue feeds the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Sqs,
    Redis,
    /// No queue; only the HTTP boundary runs.
    None,
}

impl FromStr for QueueBackend {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqs" => Ok(QueueBackend::Sqs),
            "redis" => Ok(QueueBackend::Redis),
            "none" => Ok(QueueBackend::None),
            other => Err(ReceiverError::Config(format!(
                "QUEUE_BACKEND must be one of sqs|redis|none, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: QueueBackend,
    /// Queue URL (SQS) or stream name (Redis).
    pub queue_id: Option<String>,
    pub parallelism: usize,
    pub wait_seconds: u32,
    pub channel_capacity: Option<usize>,
    pub payload_mode: PayloadMode,
    pub http_bind_addr: Option<SocketAddr>,
    pub http_body_limit: usize,
    pub redis_url: Option<String>,
    pub redis_group: String,
    pub redis_consumer: String,
    /// How long a Redis entry may stay pending before another receive
    /// reclaims it. Plays the role of a visibility timeout.
    pub redis_claim_idle: Duration,
    pub aws_region: String,
    pub aws_endpoint_url: Option<String>,
    pub lambda_mode: bool,
}

pub const DEFAULT_HTTP_BODY_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_REDIS_CLAIM_IDLE_MS: u64 = 30_000;

pub fn load_config() -> Result<Config, ReceiverError> {
    dotenv().ok();
    Config::from_lookup(|key| env::var(key).ok())
}

impl Config {
    /// Build a config from any key lookup. `load_config` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(get: F) -> Result<Self, ReceiverError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let backend = match get("QUEUE_BACKEND") {
            Some(v) => v.parse()?,
            None => QueueBackend::Sqs,
        };
        let lambda_mode = match get("LAMBDA_MODE") {
            Some(v) => parse_var("LAMBDA_MODE", &v)?,
            None => false,
        };
        // Lambda mode never starts the pool, so queue settings are not required.
        let needs_queue = backend != QueueBackend::None && !lambda_mode;

        let queue_id = get("QUEUE_ID");
        if needs_queue && queue_id.is_none() {
            return Err(ReceiverError::Config(
                "QUEUE_ID is required unless QUEUE_BACKEND=none".into(),
            ));
        }

        let parallelism = match get("WORKER_PARALLELISM") {
            Some(v) => parse_var("WORKER_PARALLELISM", &v)?,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        };
        let wait_seconds = match get("QUEUE_WAIT_SECONDS") {
            Some(v) => parse_var("QUEUE_WAIT_SECONDS", &v)?,
            None => PoolConfig::DEFAULT_WAIT_SECONDS,
        };
        let channel_capacity = get("WORK_CHANNEL_CAPACITY")
            .map(|v| parse_var("WORK_CHANNEL_CAPACITY", &v))
            .transpose()?;
        let payload_mode = match get("PAYLOAD_MODE") {
            Some(v) => v.parse()?,
            None => PayloadMode::Json,
        };
        let http_bind_addr = get("HTTP_BIND_ADDR")
            .map(|v| parse_var("HTTP_BIND_ADDR", &v))
            .transpose()?;
        let http_body_limit = match get("HTTP_BODY_LIMIT_BYTES") {
            Some(v) => parse_var("HTTP_BODY_LIMIT_BYTES", &v)?,
            None => DEFAULT_HTTP_BODY_LIMIT,
        };
        let redis_url = get("REDIS_URL");
        if needs_queue && backend == QueueBackend::Redis && redis_url.is_none() {
            return Err(ReceiverError::Config(
                "REDIS_URL is required when QUEUE_BACKEND=redis".into(),
            ));
        }
        let claim_idle_ms: u64 = match get("REDIS_CLAIM_IDLE_MS") {
            Some(v) => parse_var("REDIS_CLAIM_IDLE_MS", &v)?,
            None => DEFAULT_REDIS_CLAIM_IDLE_MS,
        };
        if claim_idle_ms == 0 {
            return Err(ReceiverError::Config(
                "REDIS_CLAIM_IDLE_MS must be at least 1".into(),
            ));
        }

        let cfg = Config {
            backend,
            queue_id,
            parallelism,
            wait_seconds,
            channel_capacity,
            payload_mode,
            http_bind_addr,
            http_body_limit,
            redis_url,
            redis_group: get("REDIS_GROUP").unwrap_or_else(|| "receivers".into()),
            redis_consumer: get("REDIS_CONSUMER").unwrap_or_else(|| "r1".into()),
            redis_claim_idle: Duration::from_millis(claim_idle_ms),
            aws_region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
            aws_endpoint_url: get("AWS_ENDPOINT_URL"),
            lambda_mode,
        };

        // Surface pool validation errors at load time rather than at startup.
        if needs_queue {
            cfg.pool_config()?;
        }
        Ok(cfg)
    }

    pub fn pool_config(&self) -> Result<PoolConfig, ReceiverError> {
        let queue_id = self
            .queue_id
            .clone()
            .ok_or_else(|| ReceiverError::Config("QUEUE_ID is not set".into()))?;
        let pool = PoolConfig::new(queue_id, self.parallelism)?.with_wait_seconds(self.wait_seconds);
        match self.channel_capacity {
            Some(capacity) => pool.with_channel_capacity(capacity),
            None => Ok(pool),
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ReceiverError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ReceiverError::Config(format!("{key}={raw:?}: {e}")))
}

/// Immutable settings for one worker pool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    parallelism: usize,
    queue_identifier: String,
    wait_seconds: u32,
    channel_capacity: usize,
}

impl PoolConfig {
    /// Long-poll wait used when none is configured.
    pub const DEFAULT_WAIT_SECONDS: u32 = 20;

    /// `parallelism` must be positive; the work channel capacity defaults to it.
    pub fn new(
        queue_identifier: impl Into<String>,
        parallelism: usize,
    ) -> Result<Self, ReceiverError> {
        if parallelism == 0 {
            return Err(ReceiverError::Config(
                "pool parallelism must be at least 1".into(),
            ));
        }
        Ok(Self {
            parallelism,
            queue_identifier: queue_identifier.into(),
            wait_seconds: Self::DEFAULT_WAIT_SECONDS,
            channel_capacity: parallelism,
        })
    }

    /// 0 degrades to short polling.
    pub fn with_wait_seconds(mut self, wait_seconds: u32) -> Self {
        self.wait_seconds = wait_seconds;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Result<Self, ReceiverError> {
        if capacity == 0 {
            return Err(ReceiverError::Config(
                "work channel capacity must be at least 1".into(),
            ));
        }
        self.channel_capacity = capacity;
        Ok(self)
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn queue_identifier(&self) -> &str {
        &self.queue_identifier
    }

    pub fn wait_seconds(&self) -> u32 {
        self.wait_seconds
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(u64::from(self.wait_seconds))
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}
