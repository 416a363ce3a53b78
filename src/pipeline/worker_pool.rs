//! Bounded worker pools for the two pipeline stages.
//!
//! A pool runs submitted futures as tokio tasks, at most `width` at a time.
//! Completions come back in completion order through
//! [`WorkerPool::next_completed`], tagged with the work item they belong
//! to. A panicking work item is caught and reported as
//! [`PoolError::WorkerPanicked`] instead of tearing down the pool.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::metrics::MetricsCollector;

/// Errors reported for a single work item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    /// The work item panicked.
    #[error("Work item panicked: {0}")]
    WorkerPanicked(String),

    /// The pool was shut down before the item got a slot.
    #[error("Pool '{0}' is closed")]
    Closed(String),
}

/// Statistics about one pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    /// Maximum number of concurrently running items.
    pub width: usize,
    /// Items holding a slot right now.
    pub active: usize,
    /// Items submitted and not yet collected.
    pub pending: usize,
    /// Items that finished normally.
    pub completed: u64,
    /// Items that panicked or never got a slot.
    pub failed: u64,
    /// Average time an item held its slot.
    pub average_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of items processed.
    pub fn total_processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
#[derive(Default)]
struct SharedPoolStats {
    completed: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active: AtomicU64,
}

impl SharedPoolStats {
    fn record(&self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, width: usize, pending: usize) -> PoolStats {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let total = completed + failed;

        PoolStats {
            width,
            active: self.active.load(Ordering::SeqCst) as usize,
            pending,
            completed,
            failed,
            average_duration: if total > 0 {
                Duration::from_millis(total_duration_ms / total)
            } else {
                Duration::ZERO
            },
        }
    }
}

/// One finished work item.
#[derive(Debug)]
pub struct Completed<K, T> {
    /// Tag given at submission.
    pub key: K,
    pub result: Result<T, PoolError>,
}

/// Bounded pool of concurrently running work items.
pub struct WorkerPool<K, T> {
    name: String,
    width: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Completed<K, T>>,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

impl<K, T> WorkerPool<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    /// Creates a pool running at most `width` items at once.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPoolWidth`] when `width` is zero.
    pub fn new(name: impl Into<String>, width: usize) -> Result<Self, ConfigError> {
        let name = name.into();
        if width == 0 {
            return Err(ConfigError::InvalidPoolWidth { pool: name });
        }
        Ok(Self {
            name,
            width,
            semaphore: Arc::new(Semaphore::new(width)),
            tasks: JoinSet::new(),
            stats: Arc::new(SharedPoolStats::default()),
            metrics: MetricsCollector::new(),
        })
    }

    /// Pool name, used in logs and metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submits a work item. It waits for a free slot inside its own task,
    /// so submission never blocks.
    pub fn submit<F>(&mut self, key: K, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let stats = Arc::clone(&self.stats);
        let metrics = self.metrics;
        let name = self.name.clone();

        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                stats.record(false, Duration::ZERO);
                return Completed {
                    key,
                    result: Err(PoolError::Closed(name)),
                };
            };

            stats.active.fetch_add(1, Ordering::SeqCst);
            metrics.inc_in_flight(&name);
            let start = Instant::now();

            let result = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .map_err(|payload| PoolError::WorkerPanicked(panic_message(payload.as_ref())));

            stats.active.fetch_sub(1, Ordering::SeqCst);
            metrics.dec_in_flight(&name);
            stats.record(result.is_ok(), start.elapsed());

            Completed { key, result }
        });
    }

    /// Waits for the next item to finish, in completion order.
    ///
    /// Returns `None` once nothing is pending.
    pub async fn next_completed(&mut self) -> Option<Completed<K, T>> {
        loop {
            match self.tasks.join_next().await? {
                Ok(completed) => return Some(completed),
                Err(e) => {
                    // Only reachable for aborted tasks; their items are gone.
                    debug!(pool = %self.name, error = %e, "Discarding aborted work item");
                }
            }
        }
    }

    /// Items submitted and not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Current statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.width, self.pending())
    }

    /// Stops accepting slots and aborts every pending item.
    pub async fn shutdown(&mut self) {
        self.semaphore.close();
        let pending = self.tasks.len();
        self.tasks.shutdown().await;
        if pending > 0 {
            warn!(pool = %self.name, aborted = pending, "Worker pool shut down with pending items");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
