//! Queue-polling worker pool
//!
//! Overview
//! --------
//! One poll loop receives batches from a `QueueClient` and pushes each message
//! into a bounded work channel; `parallelism` workers take messages off the
//! channel, invoke the `Processor`, and delete a message only when processing
//! succeeded. Failed messages stay in the external queue and come back through
//! its own redelivery (visibility timeout / redrive policy).
//!
//! Lifecycle
//! ---------
//! `Idle -> Running -> Draining -> Stopped`, driven by a `CancellationToken`.
//! Cancelling stops new receives; messages already handed to the channel and
//! processor calls in progress finish before `run` returns. `run` consumes the
//! pool, so a stopped pool cannot be restarted.
//!
//! Error Model
//! -----------
//! Nothing here is fatal. Receive failures count as empty polls followed by a
//! short fixed pause (`RECEIVE_ERROR_PAUSE`), delete
//! failures are logged, processing failures (and panics) leave the message
//! undeleted.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::PoolConfig;
use crate::ingest::{QueueClient, QueueMessage};
use crate::processor::Processor;

mod poll;
pub mod state;
pub mod stats;
mod worker;

pub use poll::RECEIVE_ERROR_PAUSE;
pub use state::{PoolMonitor, PoolState};
pub use stats::{PoolStats, StatsSnapshot};

pub struct WorkerPool<Q, P: ?Sized> {
    queue: Arc<Q>,
    processor: Arc<P>,
    config: PoolConfig,
    state: watch::Sender<PoolState>,
    stats: Arc<PoolStats>,
}

impl<Q, P> WorkerPool<Q, P>
where
    Q: QueueClient,
    P: Processor + ?Sized + 'static,
{
    pub fn new(queue: Arc<Q>, processor: Arc<P>, config: PoolConfig) -> Self {
        let (state, _) = watch::channel(PoolState::Idle);
        Self {
            queue,
            processor,
            config,
            state,
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            state: self.state.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Run until `shutdown` is cancelled, then drain and return final counters.
    pub async fn run(self, shutdown: CancellationToken) -> StatsSnapshot {
        let Self {
            queue,
            processor,
            config,
            state,
            stats,
        } = self;

        let (tx, rx) = mpsc::channel::<QueueMessage>(config.channel_capacity());
        let rx = Arc::new(Mutex::new(rx));
        let queue_id: Arc<str> = Arc::from(config.queue_identifier());

        let mut workers = JoinSet::new();
        for id in 0..config.parallelism() {
            workers.spawn(worker::run_worker(
                id,
                queue.clone(),
                processor.clone(),
                queue_id.clone(),
                rx.clone(),
                stats.clone(),
            ));
        }
        drop(rx);

        state.send_replace(PoolState::Running);
        info!(
            queue = %queue_id,
            parallelism = config.parallelism(),
            capacity = config.channel_capacity(),
            wait_seconds = config.wait_seconds(),
            "worker pool running"
        );

        poll::run_poll_loop(&*queue, &config, tx, &shutdown, &stats).await;

        state.send_replace(PoolState::Draining);
        info!(
            queue = %queue_id,
            queued = stats.depth.get(),
            in_flight = stats.in_flight.get(),
            "shutdown requested; draining"
        );

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!(error = ?e, "worker join error during drain");
            }
        }

        state.send_replace(PoolState::Stopped);
        let summary = stats.snapshot();
        info!(queue = %queue_id, ?summary, "worker pool stopped");
        summary
    }
}

/// Build a pool and run it in one call.
pub async fn start_worker_pool<Q, P>(
    queue: Arc<Q>,
    processor: Arc<P>,
    config: PoolConfig,
    shutdown: CancellationToken,
) -> StatsSnapshot
where
    Q: QueueClient,
    P: Processor + ?Sized + 'static,
{
    WorkerPool::new(queue, processor, config).run(shutdown).await
}
