//! Background progress monitor for evaluation runs.
//!
//! Periodically logs how many work items have been generated and graded so
//! operators can follow long runs without reading per-item log lines.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Snapshot of run progress at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Generations finished, failed ones included.
    pub generated: usize,
    /// Generations that failed.
    pub generation_failed: usize,
    /// Gradings merged into their category.
    pub graded: usize,
    /// Gradings that scored above zero.
    pub passed: usize,
    /// Wall-clock elapsed time since the monitor started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Graded share of `total`, in percent.
    pub fn percent_of(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (self.graded as f64 / total as f64 * 100.0).min(100.0)
    }
}

/// Shared counters updated by the orchestrator and read by the monitor.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounters {
    pub generated: Arc<AtomicUsize>,
    pub generation_failed: Arc<AtomicUsize>,
    pub graded: Arc<AtomicUsize>,
    pub passed: Arc<AtomicUsize>,
}

impl ProgressCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one finished generation.
    pub fn record_generation(&self, failed: bool) {
        self.generated.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.generation_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts one merged grading.
    pub fn record_grading(&self, score: f64) {
        self.graded.fetch_add(1, Ordering::Relaxed);
        if score > 0.0 {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            generation_failed: self.generation_failed.load(Ordering::Relaxed),
            graded: self.graded.load(Ordering::Relaxed),
            passed: self.passed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs run progress.
///
/// Call [`ProgressMonitor::stop`] to cancel it; dropping it also stops the
/// loop at its next tick.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a monitor that logs every `interval`.
    ///
    /// # Arguments
    ///
    /// * `counters` - Counters updated by the orchestrator
    /// * `total` - Number of work items in the run
    /// * `interval` - How often to emit progress logs
    pub fn start(counters: ProgressCounters, total: usize, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                tracing::info!(
                    generated = snap.generated,
                    generation_failed = snap.generation_failed,
                    graded = snap.graded,
                    passed = snap.passed,
                    total = total,
                    progress_pct = format!("{:.1}%", snap.percent_of(total)),
                    elapsed_secs = snap.elapsed.as_secs(),
                    "Evaluation progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
