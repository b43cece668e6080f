use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Execution events emitted by the batch runner.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { batches: usize },
    ThrottleWaited { duration: Duration },
    BatchStarted { source: PathBuf },
    BatchFinished { source: PathBuf, rows_loaded: usize, rows_rejected: usize },
    BatchFailed { source: PathBuf, error: String },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { batches } => tracing::info!(batches, "run started"),
            ExecutionEvent::ThrottleWaited { duration } => {
                tracing::debug!(waited_ms = duration.as_millis() as u64, "waited for batch slot")
            }
            ExecutionEvent::BatchStarted { source } => {
                tracing::debug!(source = %source.display(), "batch started")
            }
            ExecutionEvent::BatchFinished {
                source,
                rows_loaded,
                rows_rejected,
            } => tracing::info!(
                source = %source.display(),
                rows_loaded,
                rows_rejected,
                "batch finished"
            ),
            ExecutionEvent::BatchFailed { source, error } => {
                tracing::error!(source = %source.display(), error = %error, "batch failed")
            }
            ExecutionEvent::RunFinished { metrics, .. } => tracing::info!(%metrics, "run finished"),
        }
    }
}

/// Real-time metrics for a run.
///
/// The runner updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    batches_started: AtomicU64,
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
    rows_loaded: AtomicU64,
    rows_rejected: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_batches: AtomicUsize,
    max_active_batches: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            batches_started: AtomicU64::new(0),
            batches_succeeded: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            rows_loaded: AtomicU64::new(0),
            rows_rejected: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_batches: AtomicUsize::new(0),
            max_active_batches: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.batches_started.store(0, Ordering::SeqCst);
        self.batches_succeeded.store(0, Ordering::SeqCst);
        self.batches_failed.store(0, Ordering::SeqCst);
        self.rows_loaded.store(0, Ordering::SeqCst);
        self.rows_rejected.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_batches.store(0, Ordering::SeqCst);
        self.max_active_batches.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_batch_start(&self) {
        let _ = self.batches_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_batches.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_batches, now);
    }

    pub fn on_batch_success(&self, rows_loaded: usize, rows_rejected: usize) {
        let _ = self.batches_succeeded.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_loaded.fetch_add(rows_loaded as u64, Ordering::SeqCst);
        let _ = self.rows_rejected.fetch_add(rows_rejected as u64, Ordering::SeqCst);
        let _ = self.active_batches.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_batch_failure(&self) {
        let _ = self.batches_failed.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_batches.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            batches_started: self.batches_started.load(Ordering::SeqCst),
            batches_succeeded: self.batches_succeeded.load(Ordering::SeqCst),
            batches_failed: self.batches_failed.load(Ordering::SeqCst),
            rows_loaded: self.rows_loaded.load(Ordering::SeqCst),
            rows_rejected: self.rows_rejected.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_batches: self.max_active_batches.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub batches_started: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub throttle_wait: Duration,
    pub max_active_batches: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, batches={}/{} (failed {}), rows_loaded={}, rows_rejected={}, max_active_batches={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.batches_succeeded,
            self.batches_started,
            self.batches_failed,
            self.rows_loaded,
            self.rows_rejected,
            self.max_active_batches,
            self.throttle_wait,
            self.elapsed
        )
    }
}
