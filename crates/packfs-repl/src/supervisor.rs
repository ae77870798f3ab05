//! Bounded-concurrency supervision of replication tasks.
//!
//! A fixed-size permit pool is the sole admission control on concurrent
//! transfers: each submitted task holds one permit for its whole lifetime,
//! including the blocking download, so at most `worker_count` transfers are
//! ever in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::replicator::DownloadAndImportReplicator;
use crate::task::{ReplicationTask, TaskStatus};

/// Counters for task outcomes seen by one supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStats {
    /// Tasks submitted.
    pub requested: u64,
    /// Tasks skipped because the container was already present.
    pub skipped: u64,
    /// Tasks finished successfully.
    pub done: u64,
    /// Tasks that failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    requested: AtomicU64,
    skipped: AtomicU64,
    done: AtomicU64,
    failed: AtomicU64,
}

/// Runs replication tasks under a fixed concurrency bound.
#[derive(Clone)]
pub struct ReplicationSupervisor {
    replicator: Arc<DownloadAndImportReplicator>,
    permits: Arc<Semaphore>,
    stats: Arc<StatsInner>,
}

impl ReplicationSupervisor {
    /// Creates a supervisor around `replicator` with the configured pool size.
    ///
    /// A zero worker count is clamped to one so submission can always make
    /// progress.
    pub fn new(replicator: Arc<DownloadAndImportReplicator>) -> Self {
        let workers = replicator.config().worker_count.max(1);
        debug!(workers, "replication supervisor created");
        Self {
            replicator,
            permits: Arc::new(Semaphore::new(workers)),
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Runs one task to completion, waiting for a worker permit first.
    ///
    /// Returns the task with its terminal status; inspect the status rather
    /// than expecting an error.
    pub async fn submit(&self, mut task: ReplicationTask) -> ReplicationTask {
        self.stats.requested.fetch_add(1, Ordering::Relaxed);

        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            // The semaphore is never closed; this is unreachable in practice.
            task.set_status(TaskStatus::Failed);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return task;
        };

        self.replicator.replicate(&mut task).await;

        match task.status() {
            TaskStatus::Skipped => self.stats.skipped.fetch_add(1, Ordering::Relaxed),
            TaskStatus::Done => self.stats.done.fetch_add(1, Ordering::Relaxed),
            _ => self.stats.failed.fetch_add(1, Ordering::Relaxed),
        };
        task
    }

    /// Runs a batch of tasks concurrently under the worker bound.
    ///
    /// Completion order is not defined; each returned task carries its
    /// terminal status.
    pub async fn replicate_all(&self, tasks: Vec<ReplicationTask>) -> Vec<ReplicationTask> {
        let mut set = JoinSet::new();
        for task in tasks {
            let supervisor = self.clone();
            set.spawn(async move { supervisor.submit(task).await });
        }

        let mut finished = Vec::new();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(task) => finished.push(task),
                Err(err) => error!(error = %err, "replication worker panicked"),
            }
        }
        finished
    }

    /// Snapshot of the outcome counters.
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            requested: self.stats.requested.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            done: self.stats.done.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Permits currently available in the worker pool.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_is_zeroed() {
        let stats = SupervisorStats::default();
        assert_eq!(stats.requested, 0);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.done, 0);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_stats_serde_roundtrip() {
        let stats = SupervisorStats {
            requested: 10,
            skipped: 2,
            done: 7,
            failed: 1,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: SupervisorStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
