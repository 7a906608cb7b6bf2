// tests/it_redis.rs
//! Redis Streams backend end to end against a real Redis.
//! Run with: cargo test --test it_redis -- --ignored

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use deadpool_redis::redis;
use testcontainers::core::WaitFor;
use testcontainers::{clients, GenericImage};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use event_receiver::config::PoolConfig;
use event_receiver::errors::ProcessError;
use event_receiver::ingest::QueueClient;
use event_receiver::pool::WorkerPool;
use event_receiver::processor::processor_fn;
use event_receiver::redis::{create_redis_pool, RedisStreamQueue};

async fn xadd(pool: &deadpool_redis::Pool, stream: &str, payload: &[u8]) -> String {
    let mut conn = pool.get().await.unwrap();
    redis::cmd("XADD")
        .arg(stream)
        .arg("*")
        .arg("payload")
        .arg(payload)
        .query_async(&mut *conn)
        .await
        .unwrap()
}

async fn pending_count(pool: &deadpool_redis::Pool, stream: &str, group: &str) -> usize {
    let mut conn = pool.get().await.unwrap();
    let val: redis::Value = redis::cmd("XPENDING")
        .arg(stream)
        .arg(group)
        .arg("-")
        .arg("+")
        .arg(10)
        .query_async(&mut *conn)
        .await
        .unwrap();
    match val {
        redis::Value::Bulk(v) => v.len(),
        redis::Value::Int(i) => i as usize,
        other => panic!("unexpected XPENDING shape: {:?}", other),
    }
}

async fn stream_len(pool: &deadpool_redis::Pool, stream: &str) -> i64 {
    let mut conn = pool.get().await.unwrap();
    redis::cmd("XLEN")
        .arg(stream)
        .query_async(&mut *conn)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn redis_streams_end_to_end() {
    // Start Redis 7 in Docker once
    let docker = clients::Cli::default();
    let img = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    let node = docker.run(img);
    let port = node.get_host_port_ipv4(6379);
    let pool = create_redis_pool(&format!("redis://127.0.0.1:{port}")).unwrap();

    // --- Scenario 1: receive and delete directly ---
    let q = RedisStreamQueue::new(pool.clone(), "receivers", "r1");
    q.ensure_stream_group("events").await.unwrap();
    // Creating the group twice is fine.
    q.ensure_stream_group("events").await.unwrap();

    let id = xadd(&pool, "events", b"hello").await;
    let got = q.receive("events", 10, Duration::from_millis(500)).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].receipt, id);
    assert_eq!(got[0].body, Bytes::from_static(b"hello"));
    assert_eq!(pending_count(&pool, "events", "receivers").await, 1);

    q.delete("events", &got[0].receipt).await.unwrap();
    assert_eq!(pending_count(&pool, "events", "receivers").await, 0);
    assert_eq!(stream_len(&pool, "events").await, 0);

    // Zero wait is a non-blocking read.
    let start = Instant::now();
    assert!(q.receive("events", 10, Duration::ZERO).await.unwrap().is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));

    // --- Scenario 2: the pool deletes successes and leaves failures pending ---
    xadd(&pool, "events", br#"{"id":"ok"}"#).await;
    xadd(&pool, "events", br#"{"id":"fail"}"#).await;

    let processor = Arc::new(processor_fn(|event: Bytes| async move {
        if event.as_ref() == br#"{"id":"fail"}"# {
            Err(ProcessError::failed("rejected"))
        } else {
            Ok(())
        }
    }));
    let cfg = PoolConfig::new("events", 2).unwrap().with_wait_seconds(1);
    let pool_run = WorkerPool::new(Arc::new(q.clone()), processor, cfg);
    let monitor = pool_run.monitor();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(pool_run.run(shutdown.clone()));

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let s = monitor.stats();
        if s.deleted == 1 && s.failed == 1 {
            break;
        }
        assert!(Instant::now() < deadline, "pool did not process both entries");
        sleep(Duration::from_millis(50)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(stream_len(&pool, "events").await, 1);
    assert_eq!(pending_count(&pool, "events", "receivers").await, 1);
}

#[tokio::test]
#[ignore]
async fn failed_entry_is_reclaimed_after_idle_timeout_and_deleted() {
    let docker = clients::Cli::default();
    let img = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    let node = docker.run(img);
    let port = node.get_host_port_ipv4(6379);
    let pool = create_redis_pool(&format!("redis://127.0.0.1:{port}")).unwrap();

    let q = RedisStreamQueue::new(pool.clone(), "receivers", "r1")
        .with_claim_idle(Duration::from_millis(200));
    q.ensure_stream_group("retries").await.unwrap();
    let id = xadd(&pool, "retries", br#"{"id":"flaky"}"#).await;

    // Fails the first attempt, succeeds afterwards.
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let processor = Arc::new(processor_fn(move |_: Bytes| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(ProcessError::failed("transient"))
            } else {
                Ok(())
            }
        }
    }));

    let cfg = PoolConfig::new("retries", 1).unwrap().with_wait_seconds(1);
    let pool_run = WorkerPool::new(Arc::new(q), processor, cfg);
    let monitor = pool_run.monitor();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(pool_run.run(shutdown.clone()));

    let deadline = Instant::now() + Duration::from_secs(10);
    while monitor.stats().deleted < 1 {
        assert!(Instant::now() < deadline, "failed entry was never redelivered");
        sleep(Duration::from_millis(50)).await;
    }
    shutdown.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stream_len(&pool, "retries").await, 0);
    assert_eq!(pending_count(&pool, "retries", "receivers").await, 0);
    assert!(!id.is_empty());
}
