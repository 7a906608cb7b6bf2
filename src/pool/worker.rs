//! Worker: take one message, process it, delete it only on success.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::ingest::{QueueClient, QueueMessage};
use crate::pool::stats::PoolStats;
use crate::processor::Processor;

pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueueMessage>>>;

pub(crate) async fn run_worker<Q, P>(
    worker: usize,
    queue: Arc<Q>,
    processor: Arc<P>,
    queue_id: Arc<str>,
    rx: SharedReceiver,
    stats: Arc<PoolStats>,
) where
    Q: QueueClient,
    P: Processor + ?Sized,
{
    loop {
        // Lock only for the handoff; processing happens outside it.
        let next = { rx.lock().await.recv().await };
        let Some(msg) = next else { break };
        stats.depth.dec();

        handle_message(worker, &*queue, &*processor, &queue_id, msg, &stats).await;
    }

    debug!(worker, "work channel closed; worker exiting");
}

async fn handle_message<Q, P>(
    worker: usize,
    queue: &Q,
    processor: &P,
    queue_id: &str,
    msg: QueueMessage,
    stats: &PoolStats,
) where
    Q: QueueClient,
    P: Processor + ?Sized,
{
    let QueueMessage { body, receipt } = msg;

    #[cfg(debug_assertions)]
    debug!(worker, receipt = %receipt, payload_len = body.len(), "processing message");

    stats.in_flight.inc();
    let outcome = AssertUnwindSafe(processor.process(body)).catch_unwind().await;
    stats.in_flight.dec();

    match outcome {
        Ok(Ok(())) => {
            stats.processed.inc();
            match queue.delete(queue_id, &receipt).await {
                Ok(()) => {
                    stats.deleted.inc();
                    #[cfg(debug_assertions)]
                    debug!(worker, receipt = %receipt, "message deleted");
                }
                Err(e) => {
                    // Processed but still visible: the queue may redeliver it.
                    stats.delete_errors.inc();
                    warn!(worker, receipt = %receipt, error = %e, "delete failed");
                }
            }
        }
        Ok(Err(e)) => {
            stats.failed.inc();
            warn!(worker, receipt = %receipt, error = %e, "processing failed; message left for redelivery");
        }
        Err(_) => {
            stats.failed.inc();
            error!(worker, receipt = %receipt, "processor panicked; message left for redelivery");
        }
    }
}
