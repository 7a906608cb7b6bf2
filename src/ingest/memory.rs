//! In-process `QueueClient`.
//!
//! Mimics the receive/delete contract of a hosted queue closely enough to
//! drive the worker pool in tests, benches and local demos:
//! - received messages move to an in-flight set until deleted;
//! - `requeue_unacked` plays the role of a visibility timeout expiring;
//! - receive and delete failures can be injected.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::errors::ReceiverError;
use crate::ingest::{QueueClient, QueueMessage};

#[derive(Default)]
struct Inner {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: Vec<String>,
    queues_seen: HashSet<String>,
    fail_receives: usize,
    fail_deletes: bool,
    redeliveries: usize,
}

#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    receive_calls: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain collections behind; keep going.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, message: QueueMessage) {
        self.lock().ready.push_back(message);
        self.notify.notify_one();
    }

    /// The next `n` receive calls fail with a transport error.
    pub fn fail_next_receives(&self, n: usize) {
        self.lock().fail_receives = n;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    /// Receipts deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Messages received but never deleted.
    pub fn unacked(&self) -> Vec<QueueMessage> {
        self.lock().in_flight.values().cloned().collect()
    }

    /// Messages not yet received.
    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn queues_seen(&self) -> HashSet<String> {
        self.lock().queues_seen.clone()
    }

    /// Make every undeleted delivery visible again under a fresh receipt.
    pub fn requeue_unacked(&self) -> usize {
        let mut inner = self.lock();
        let stale: Vec<QueueMessage> = inner.in_flight.drain().map(|(_, m)| m).collect();
        let n = stale.len();
        for msg in stale {
            inner.redeliveries += 1;
            let receipt = format!("{}#{}", msg.receipt, inner.redeliveries);
            inner.ready.push_back(QueueMessage::new(msg.body, receipt));
        }
        drop(inner);
        if n > 0 {
            self.notify.notify_one();
        }
        n
    }

    fn take(&self, queue: &str, max_messages: usize) -> Result<Vec<QueueMessage>, ReceiverError> {
        let mut inner = self.lock();
        if inner.fail_receives > 0 {
            inner.fail_receives -= 1;
            return Err(ReceiverError::QueueTransport(
                "injected receive failure".into(),
            ));
        }
        if !inner.queues_seen.contains(queue) {
            inner.queues_seen.insert(queue.to_string());
        }
        let n = max_messages.min(inner.ready.len());
        let batch: Vec<QueueMessage> = inner.ready.drain(..n).collect();
        for msg in &batch {
            inner.in_flight.insert(msg.receipt.clone(), msg.clone());
        }
        Ok(batch)
    }
}

#[async_trait::async_trait]
impl QueueClient for MemoryQueue {
    type Error = ReceiverError;

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, Self::Error> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        // Long poll: look, then sleep until a push or the deadline.
        let deadline = Instant::now() + wait;
        loop {
            let batch = self.take(queue, max_messages)?;
            if !batch.is_empty() || wait.is_zero() {
                return Ok(batch);
            }
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete(&self, _queue: &str, receipt: &str) -> Result<(), Self::Error> {
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(ReceiverError::QueueTransport(
                "injected delete failure".into(),
            ));
        }
        if inner.in_flight.remove(receipt).is_none() {
            return Err(ReceiverError::QueueTransport(format!(
                "receipt {receipt} is not in flight"
            )));
        }
        inner.deleted.push(receipt.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_moves_messages_in_flight_until_deleted() {
        let q = MemoryQueue::new();
        q.push(QueueMessage::new("a", "r1"));
        q.push(QueueMessage::new("b", "r2"));

        let got = q.receive("q", 1, Duration::ZERO).await.unwrap();
        assert_eq!(got, vec![QueueMessage::new("a", "r1")]);
        assert_eq!(q.ready_len(), 1);
        assert_eq!(q.unacked().len(), 1);

        q.delete("q", "r1").await.unwrap();
        assert!(q.unacked().is_empty());
        assert_eq!(q.deleted(), vec!["r1".to_string()]);

        // Deleting the same delivery twice is an error.
        assert!(q.delete("q", "r1").await.is_err());
    }

    #[tokio::test]
    async fn long_poll_wakes_on_push() {
        let q = std::sync::Arc::new(MemoryQueue::new());
        let producer = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(QueueMessage::new("late", "r9"));
        });

        let start = Instant::now();
        let got = q.receive("q", 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let q = MemoryQueue::new();
        q.fail_next_receives(1);
        assert!(q.receive("q", 1, Duration::ZERO).await.is_err());
        assert!(q.receive("q", 1, Duration::ZERO).await.unwrap().is_empty());
        assert_eq!(q.receive_calls(), 2);
    }

    #[tokio::test]
    async fn requeue_issues_fresh_receipts() {
        let q = MemoryQueue::new();
        q.push(QueueMessage::new("x", "r1"));
        let first = q.receive("q", 1, Duration::ZERO).await.unwrap();
        assert_eq!(q.requeue_unacked(), 1);

        let again = q.receive("q", 1, Duration::ZERO).await.unwrap();
        assert_eq!(again[0].body, first[0].body);
        assert_ne!(again[0].receipt, first[0].receipt);
    }
}
