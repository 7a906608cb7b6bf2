use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::pool::stats::{PoolStats, StatsSnapshot};

/// `Idle -> Running -> Draining -> Stopped`. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolState::Idle => "idle",
            PoolState::Running => "running",
            PoolState::Draining => "draining",
            PoolState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Read-only view of a pool, usable while `WorkerPool::run` owns the pool.
#[derive(Clone)]
pub struct PoolMonitor {
    pub(crate) state: watch::Receiver<PoolState>,
    pub(crate) stats: Arc<PoolStats>,
}

impl PoolMonitor {
    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Current number of messages waiting in the work channel.
    pub fn depth(&self) -> u64 {
        self.stats.depth.get()
    }

    pub fn in_flight(&self) -> u64 {
        self.stats.in_flight.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve once the pool has reached `target` (or any later state).
    pub async fn reached(&mut self, target: PoolState) -> PoolState {
        match self.state.wait_for(|s| *s >= target).await {
            Ok(s) => *s,
            // Sender gone means the pool was dropped; it never runs again.
            Err(_) => PoolState::Stopped,
        }
    }
}
