//! Bounded-batch dispatcher
//!
//! Fans jobs out to workers in batches of at most `max_concurrency`:
//!
//! ```text
//! jobs ─▶ [batch 1: JoinSet × M] ─cooldown─▶ [batch 2] ─cooldown─▶ … [batch ⌈K/M⌉]
//!                    │
//!                    └─ task panicked ─▶ sequential: job, pause, job, pause, …
//! ```
//!
//! Each call runs under its own timeout; a timeout or error only affects
//! that job's outcome. Outcomes come back in job order. The dispatcher
//! touches no shared state: callers fold outcomes into health, staging and
//! latency bookkeeping after the batch completes.

pub mod planner;
pub mod timeouts;

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, GenerationRequest, SharedBackend};
use crate::config::DispatchConfig;
use crate::router::call_with_timeout;

pub use planner::JobPlanner;
pub use timeouts::{timeout_for, LatencyMetrics, LatencyTracker, DEFAULT_LATENCY_MS};

/// Number of batches needed for `jobs` jobs at `max_concurrency`
pub fn batch_count(jobs: usize, max_concurrency: usize) -> usize {
    jobs.div_ceil(max_concurrency.max(1))
}

/// One call to make
#[derive(Debug, Clone)]
pub struct Job {
    pub worker: String,
    pub request: GenerationRequest,
    pub timeout: Duration,
    /// Whether the worker was staged when the job was built
    pub staged: bool,
}

/// Result of one call
#[derive(Debug)]
pub struct CallOutcome {
    pub worker: String,
    pub staged: bool,
    pub latency_ms: u64,
    pub result: Result<String, BackendError>,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.result, Err(BackendError::Timeout(_)))
    }
}

async fn execute(backend: SharedBackend, job: Job) -> CallOutcome {
    let start = Instant::now();
    let result = call_with_timeout(backend.as_ref(), &job.request, job.timeout)
        .await
        .map(|response| response.text);
    let latency_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(worker = %job.worker, latency_ms, "call succeeded"),
        Err(e) => warn!(worker = %job.worker, latency_ms, error = %e, "call failed"),
    }
    CallOutcome {
        worker: job.worker,
        staged: job.staged,
        latency_ms,
        result,
    }
}

pub struct Dispatcher {
    backend: SharedBackend,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(backend: SharedBackend, config: DispatchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// One call, no batching
    pub async fn call_one(&self, job: Job) -> CallOutcome {
        execute(self.backend.clone(), job).await
    }

    /// Run all jobs in bounded batches with a cooldown between batches.
    ///
    /// The returned outcomes are in the same order as `jobs`.
    pub async fn run_jobs(&self, jobs: Vec<Job>) -> Vec<CallOutcome> {
        let max = self.config.max_concurrency.max(1);
        let total_batches = batch_count(jobs.len(), max);
        let mut outcomes: Vec<Option<CallOutcome>> = Vec::with_capacity(jobs.len());
        outcomes.resize_with(jobs.len(), || None);

        let mut sequential = false;
        for (batch_idx, chunk) in jobs.chunks(max).enumerate() {
            let offset = batch_idx * max;
            if sequential {
                self.run_sequential(chunk, offset, &mut outcomes).await;
                continue;
            }

            debug!(batch = batch_idx + 1, total_batches, size = chunk.len(), "dispatching batch");
            let mut join_set: JoinSet<(usize, CallOutcome)> = JoinSet::new();
            for (i, job) in chunk.iter().enumerate() {
                let backend = self.backend.clone();
                let job = job.clone();
                join_set.spawn(async move { (offset + i, execute(backend, job).await) });
            }

            let mut panicked = false;
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                    Err(e) => {
                        warn!(error = %e, batch = batch_idx + 1, "batch task panicked");
                        panicked = true;
                    }
                }
            }

            if panicked {
                if self.config.sequential_fallback {
                    info!("parallel dispatch failed; continuing sequentially");
                    sequential = true;
                    let missing: Vec<(usize, &Job)> = chunk
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| outcomes[offset + i].is_none())
                        .collect();
                    for (n, (i, job)) in missing.into_iter().enumerate() {
                        if n > 0 {
                            tokio::time::sleep(self.config.sequential_pause()).await;
                        }
                        outcomes[offset + i] = Some(self.call_guarded(job.clone()).await);
                    }
                } else {
                    for (i, job) in chunk.iter().enumerate() {
                        if outcomes[offset + i].is_none() {
                            outcomes[offset + i] = Some(panicked_outcome(job));
                        }
                    }
                }
            }

            if batch_idx + 1 < total_batches {
                let pause = if sequential {
                    self.config.sequential_pause()
                } else {
                    self.config.cooldown()
                };
                debug!(pause_ms = pause.as_millis() as u64, "batch cooldown");
                tokio::time::sleep(pause).await;
            }
        }

        outcomes
            .into_iter()
            .zip(jobs.iter())
            .map(|(outcome, job)| outcome.unwrap_or_else(|| panicked_outcome(job)))
            .collect()
    }

    async fn run_sequential(
        &self,
        chunk: &[Job],
        offset: usize,
        outcomes: &mut [Option<CallOutcome>],
    ) {
        for (i, job) in chunk.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.sequential_pause()).await;
            }
            outcomes[offset + i] = Some(self.call_guarded(job.clone()).await);
        }
    }

    /// A sequential call, still isolated so a panicking backend cannot take
    /// the orchestrator down with it.
    async fn call_guarded(&self, job: Job) -> CallOutcome {
        let fallback = panicked_outcome(&job);
        match tokio::spawn(execute(self.backend.clone(), job)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker = %fallback.worker, error = %e, "sequential call panicked");
                fallback
            }
        }
    }
}

fn panicked_outcome(job: &Job) -> CallOutcome {
    CallOutcome {
        worker: job.worker.clone(),
        staged: job.staged,
        latency_ms: 0,
        result: Err(BackendError::Request("worker task panicked".to_string())),
    }
}
