//! Turns (worker, prompt) pairs into fully specified jobs.
//!
//! A planner is a snapshot of everything a job needs from shared state:
//! class timeouts, latency averages, warm-tier membership and endpoint
//! overrides. Building it once per phase lets batches run without holding
//! any lock on orchestrator state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::timeouts::{timeout_for, LatencyTracker};
use super::Job;
use crate::backend::{GenerationRequest, RequestOptions};
use crate::config::{DispatchConfig, GenerationOptions};
use crate::registry::WorkerCatalog;
use crate::staging::{WarmTier, DEFAULT_KEEP_ALIVE, STAGED_KEEP_ALIVE};

#[derive(Debug, Clone)]
pub struct JobPlanner {
    catalog: Arc<WorkerCatalog>,
    dispatch: DispatchConfig,
    options: RequestOptions,
    staged: HashSet<String>,
    averages: HashMap<String, u64>,
}

impl JobPlanner {
    pub fn new(
        catalog: Arc<WorkerCatalog>,
        dispatch: DispatchConfig,
        generation: &GenerationOptions,
    ) -> Self {
        Self {
            catalog,
            dispatch,
            options: RequestOptions::from(generation),
            staged: HashSet::new(),
            averages: HashMap::new(),
        }
    }

    /// Capture warm-tier membership and latency averages
    pub fn with_state(mut self, tier: &WarmTier, latency: &LatencyTracker) -> Self {
        self.staged = tier.staged_ids().into_iter().collect();
        self.averages = self
            .catalog
            .workers()
            .iter()
            .map(|w| (w.id.clone(), latency.average_ms(&w.id)))
            .collect();
        self
    }

    pub fn is_staged(&self, worker: &str) -> bool {
        self.staged.contains(worker)
    }

    pub fn plan(
        &self,
        worker: &str,
        prompt: String,
        context: Option<String>,
        team_mode: bool,
    ) -> Job {
        let entry = self.catalog.get(worker);
        let average = self
            .averages
            .get(worker)
            .copied()
            .unwrap_or(super::DEFAULT_LATENCY_MS);
        let staged = self.is_staged(worker);
        let keep_alive = if staged {
            STAGED_KEEP_ALIVE
        } else {
            DEFAULT_KEEP_ALIVE
        };
        let request = GenerationRequest::new(worker, prompt, self.options)
            .with_context(context)
            .with_keep_alive(keep_alive)
            .with_endpoint(entry.and_then(|w| w.endpoint.clone()));
        Job {
            worker: worker.to_string(),
            request,
            timeout: timeout_for(&self.dispatch, entry, team_mode, average),
            staged,
        }
    }
}
