//! Poll loop: receive from the external queue, push into the work channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::ingest::{QueueClient, QueueMessage};
use crate::pool::stats::PoolStats;

/// Fixed pause after a failed receive, so a queue that fails fast does not
/// turn the loop into a busy spin.
pub const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(200);

/// Runs until `shutdown` is cancelled. Dropping `tx` on return closes the
/// channel, which lets workers drain what is left and exit.
pub(crate) async fn run_poll_loop<Q: QueueClient>(
    queue: &Q,
    config: &PoolConfig,
    tx: mpsc::Sender<QueueMessage>,
    shutdown: &CancellationToken,
    stats: &PoolStats,
) {
    let queue_id = config.queue_identifier();

    while !shutdown.is_cancelled() {
        stats.receive_calls.inc();
        let batch = match queue
            .receive(queue_id, config.parallelism(), config.wait())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                // Same as an empty poll; the queue's redelivery covers the rest.
                stats.receive_errors.inc();
                warn!(queue = %queue_id, error = %e, "receive failed");
                tokio::select! {
                    _ = tokio::time::sleep(RECEIVE_ERROR_PAUSE) => {}
                    _ = shutdown.cancelled() => {}
                }
                continue;
            }
        };

        if batch.is_empty() {
            tokio::task::yield_now().await;
            continue;
        }

        debug!(queue = %queue_id, count = batch.len(), "received batch");

        stats.received.add(batch.len() as u64);
        if !dispatch(batch, &tx, shutdown, stats).await {
            break;
        }
    }
}

/// Hand a batch to the workers, blocking while the channel is full. Returns
/// false when the loop must stop (shutdown during a blocked push, or no
/// workers left to receive).
async fn dispatch(
    batch: Vec<QueueMessage>,
    tx: &mpsc::Sender<QueueMessage>,
    shutdown: &CancellationToken,
    stats: &PoolStats,
) -> bool {
    let mut pending = batch.into_iter();

    while let Some(msg) = pending.next() {
        let permit = tokio::select! {
            biased;
            permit = tx.reserve() => permit.ok(),
            _ = shutdown.cancelled() => None,
        };

        match permit {
            Some(permit) => {
                stats.depth.inc();
                permit.send(msg);
            }
            None => {
                let abandoned = 1 + pending.len();
                stats.abandoned.add(abandoned as u64);
                warn!(
                    count = abandoned,
                    receipt = %msg.receipt,
                    "work channel unavailable; leaving messages for redelivery"
                );
                return false;
            }
        }
    }
    true
}
