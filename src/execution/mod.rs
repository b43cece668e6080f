//! Concurrent execution of independent batches.
//!
//! Batches share no mutable state, so the runner simply fans them out over a rayon pool:
//!
//! - bounded parallelism (worker threads plus an in-flight batch limit)
//! - real-time metrics and observer hooks for monitoring
//!
//! There is no ordering between batches; results come back in input order.

mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::error::PipelineError;
use crate::ingestion::BatchSource;
use crate::load::Sink;
use crate::pipeline::{BatchReport, Pipeline};

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`BatchRunner`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently running batches.
    pub max_in_flight_batches: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_batches: n.max(1),
        }
    }
}

/// Outcome of one batch within a run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub source: BatchSource,
    pub result: Result<BatchReport, PipelineError>,
}

/// Runs batches through a [`Pipeline`] on a dedicated worker pool.
pub struct BatchRunner {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl BatchRunner {
    /// Create a runner with the given options.
    pub fn new(opts: ExecutionOptions) -> Result<Self, ThreadPoolBuildError> {
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("batch-worker-{i}"))
            .build()?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run every source through `pipeline`. A failed batch does not stop the others.
    pub fn run<S: Sink>(&self, pipeline: &Pipeline<S>, sources: &[BatchSource]) -> Vec<BatchOutcome> {
        self.pool.install(|| self.run_impl(pipeline, sources))
    }

    fn run_impl<S: Sink>(&self, pipeline: &Pipeline<S>, sources: &[BatchSource]) -> Vec<BatchOutcome> {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted {
            batches: sources.len(),
        });

        let sem = Semaphore::new(self.opts.max_in_flight_batches);

        let outcomes: Vec<BatchOutcome> = sources
            .par_iter()
            .map(|source| {
                let permit = sem.acquire();
                if permit.waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(permit.waited);
                    self.emit(ExecutionEvent::ThrottleWaited {
                        duration: permit.waited,
                    });
                }

                self.metrics.on_batch_start();
                self.emit(ExecutionEvent::BatchStarted {
                    source: source.path.clone(),
                });

                let result = pipeline.run_batch(source);
                match &result {
                    Ok(report) => {
                        self.metrics
                            .on_batch_success(report.rows_loaded(), report.rejected.total());
                        self.emit(ExecutionEvent::BatchFinished {
                            source: source.path.clone(),
                            rows_loaded: report.rows_loaded(),
                            rows_rejected: report.rejected.total(),
                        });
                    }
                    Err(e) => {
                        self.metrics.on_batch_failure();
                        self.emit(ExecutionEvent::BatchFailed {
                            source: source.path.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                drop(permit);

                BatchOutcome {
                    source: source.clone(),
                    result,
                }
            })
            .collect();

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });

        outcomes
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}
