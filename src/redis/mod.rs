//! Redis Streams integration (single version of `redis` via deadpool-redis)
//!
//! A stream with a consumer group behaves like a hosted queue: `XREADGROUP`
//! delivers entries to one consumer and the entry id acts as the receipt.
//! Entries that are never acknowledged stay in the group's pending list; each
//! receive first reclaims entries idle for longer than `claim_idle` with
//! `XAUTOCLAIM` (Redis 6.2+), which gives the stream a visibility timeout.
//! The queue identifier is the stream name.

use crate::errors::ReceiverError;
use crate::ingest::{QueueClient, QueueMessage};
use bytes::Bytes;
use deadpool_redis::redis::{self};
use deadpool_redis::{Config, Pool, Runtime};
use std::time::Duration;
use tracing::debug;

/// Entry field holding the event payload.
pub const PAYLOAD_FIELD: &str = "payload";

/// Pending time after which an unacknowledged entry is delivered again.
pub const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(30);

pub fn create_redis_pool(redis_url: &str) -> Result<Pool, ReceiverError> {
    Config::from_url(redis_url)
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| ReceiverError::QueueInit(e.to_string()))
}

#[derive(Clone)]
pub struct RedisStreamQueue {
    pool: Pool,
    group: String,
    consumer: String,
    claim_idle: Duration,
}

impl RedisStreamQueue {
    pub fn new(pool: Pool, group: &str, consumer: &str) -> Self {
        Self {
            pool,
            group: group.to_string(),
            consumer: consumer.to_string(),
            claim_idle: DEFAULT_CLAIM_IDLE,
        }
    }

    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    /// Take over up to `count` entries pending longer than `claim_idle`.
    async fn reclaim(
        &self,
        conn: &mut deadpool_redis::Connection,
        stream: &str,
        count: usize,
    ) -> Result<Vec<QueueMessage>, ReceiverError> {
        let val: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut **conn)
            .await
            .map_err(|e| ReceiverError::QueueTransport(e.to_string()))?;
        Ok(parse_xautoclaim_value(val))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, ReceiverError> {
        self.pool
            .get()
            .await
            .map_err(|e| ReceiverError::QueueTransport(e.to_string()))
    }

    /// Create the consumer group (and the stream) if it does not exist yet.
    pub async fn ensure_stream_group(&self, stream: &str) -> Result<(), ReceiverError> {
        let mut conn = self.conn().await?;
        let r: Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;

        match r {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(ReceiverError::QueueInit(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl QueueClient for RedisStreamQueue {
    type Error = ReceiverError;

    #[tracing::instrument(skip(self, wait), fields(wait_ms = wait.as_millis() as u64))]
    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, Self::Error> {
        let mut conn = self.conn().await?;
        let count = max_messages.max(1);

        let reclaimed = self.reclaim(&mut conn, queue, count).await?;
        if !reclaimed.is_empty() {
            debug!(count = reclaimed.len(), "reclaimed idle pending entries");
            return Ok(reclaimed);
        }

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count);
        // BLOCK 0 would wait forever; a zero wait means a non-blocking read.
        if !wait.is_zero() {
            cmd.arg("BLOCK").arg(wait.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(queue).arg(">");

        // Ask for a typed Value to avoid cross-crate type mismatch
        let val: redis::Value = cmd
            .query_async(&mut *conn)
            .await
            .map_err(|e| ReceiverError::QueueTransport(e.to_string()))?;

        Ok(parse_xread_value(val))
    }

    /// Acknowledge the entry for the group, then remove it from the stream.
    #[tracing::instrument(skip(self))]
    async fn delete(&self, queue: &str, receipt: &str) -> Result<(), Self::Error> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("XACK")
            .arg(queue)
            .arg(&self.group)
            .arg(receipt)
            .query_async(&mut *conn)
            .await
            .map_err(|e| ReceiverError::QueueTransport(e.to_string()))?;
        let _: i64 = redis::cmd("XDEL")
            .arg(queue)
            .arg(receipt)
            .query_async(&mut *conn)
            .await
            .map_err(|e| ReceiverError::QueueTransport(e.to_string()))?;
        Ok(())
    }
}

/// Parse the `XREADGROUP` redis::Value reply into QueueMessage list.
pub fn parse_xread_value(val: redis::Value) -> Vec<QueueMessage> {
    use deadpool_redis::redis::Value;
    let mut out = Vec::new();

    // Expected shape:
    // Array[
    //   Array[ stream_name, Array[ Array[ id, Array[ k1, v1, ... ] ], ... ] ],
    //   ...
    // ]
    let Value::Bulk(streams) = val else { return out };

    for s in streams {
        let Value::Bulk(stream_pair) = s else { continue };
        if stream_pair.len() != 2 {
            continue;
        }
        if let Value::Bulk(msgs) = &stream_pair[1] {
            parse_entries(msgs, &mut out);
        }
    }

    out
}

/// Parse the `XAUTOCLAIM` reply: `[next_cursor, [entries...], [deleted_ids...]]`.
/// Entries trimmed from the stream while pending come back as nil and are
/// skipped.
pub fn parse_xautoclaim_value(val: redis::Value) -> Vec<QueueMessage> {
    use deadpool_redis::redis::Value;
    let mut out = Vec::new();

    let Value::Bulk(parts) = val else { return out };
    if let Some(Value::Bulk(msgs)) = parts.get(1) {
        parse_entries(msgs, &mut out);
    }
    out
}

/// Entries without a `payload` field are delivered with an empty body so the
/// processor decides what to do with them.
fn parse_entries(msgs: &[redis::Value], out: &mut Vec<QueueMessage>) {
    use deadpool_redis::redis::Value;

    for m in msgs {
        let Value::Bulk(pair) = m else { continue };
        if pair.len() != 2 {
            continue;
        }
        let id = match &pair[0] {
            Value::Data(b) => String::from_utf8_lossy(b).to_string(),
            _ => continue,
        };
        let payload = match &pair[1] {
            Value::Bulk(kv) => kv
                .chunks_exact(2)
                .find_map(|field| match (&field[0], &field[1]) {
                    (Value::Data(k), Value::Data(v)) if k == PAYLOAD_FIELD.as_bytes() => {
                        Some(Bytes::from(v.clone()))
                    }
                    _ => None,
                })
                .unwrap_or_default(),
            Value::Nil => continue,
            _ => Bytes::new(),
        };

        out.push(QueueMessage::new(payload, id));
    }
}
