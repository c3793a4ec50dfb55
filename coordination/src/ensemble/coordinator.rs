//! Team orchestrator - runs one prompt across a team of workers
//!
//! Owns every piece of process-wide state (health, warm tier, latency
//! history, warm set, team intelligence) in an [`OrchestratorState`] behind
//! one lock. The lock is never held across a worker call: each phase takes
//! a [`JobPlanner`] snapshot, runs its calls, then folds the outcomes back
//! in one write.
//!
//! ```text
//! run_team_request
//!   ├─ validate subset, sweep quarantines, pick usable workers
//!   ├─ preflight: backend reachable?
//!   ├─ classify ─▶ select team
//!   ├─ dispatch (batched) ─▶ fold outcomes
//!   ├─ evaluate ─▶ peer review / refine ─▶ fold outcomes
//!   ├─ finalize + rank
//!   ├─ synthesize consensus ─▶ fold outcome
//!   └─ stats, team intelligence, events
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analytics::{
    collaboration_effectiveness, consensus_strength, diversity_index, TeamInsights,
    TeamIntelligence, TeamMetrics,
};
use crate::backend::{BackendError, SharedBackend};
use crate::config::{DispatchConfig, EngineConfig};
use crate::debate::PeerReviewLoop;
use crate::dispatch::{CallOutcome, Dispatcher, JobPlanner, LatencyMetrics, LatencyTracker};
use crate::events::{preview, EventBus, SharedEventBus, TeamEvent};
use crate::registry::{Worker, WorkerCatalog};
use crate::router::prompts::{DIAGNOSIS_PROMPT, WARMUP_PROMPT};
use crate::router::{
    call_with_timeout, probe_request, FailureVerdict, HealthMonitor, HealthSummary, ProbeGate,
    SelectionStrategy, TaskClassifier, WorkerSelection,
};
use crate::staging::{StagingUsage, WarmTier};
use crate::state::{
    BackendHealth, Candidate, CollaborationMetrics, PerformanceDiagnosis, PerformanceGrade,
    RunResult, RunStats,
};

use super::consensus::{ConsensusError, ConsensusSynthesizer};
use super::context::{ContextProvider, ResponseSink};
use super::evaluator::ResponseEvaluator;

/// Error type for team requests
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Empty worker subset requested")]
    EmptyWorkerSubset,

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("No healthy workers ({excluded} blacklisted or quarantined); reset health to make them available again")]
    NoHealthyWorkers { excluded: usize },

    #[error("Inference backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Inference backend unavailable: all {attempted} workers failed (last error: {last_error})")]
    AllWorkersFailed { attempted: usize, last_error: String },

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Shared reference to TeamOrchestrator
pub type SharedTeamOrchestrator = Arc<TeamOrchestrator>;

/// Characters of the prompt carried in events
const PROMPT_PREVIEW_CHARS: usize = 80;

/// Mutable process-wide state, written only by the orchestrator
#[derive(Debug)]
pub struct OrchestratorState {
    pub config: EngineConfig,
    pub health: HealthMonitor,
    pub tier: WarmTier,
    pub latency: LatencyTracker,
    /// Workers that answered a warm-up prompt
    pub warm: BTreeSet<String>,
    pub intelligence: TeamIntelligence,
}

impl OrchestratorState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            health: HealthMonitor::new(config.health.clone()),
            tier: WarmTier::new(config.staging.clone()),
            latency: LatencyTracker::new(),
            warm: BTreeSet::new(),
            intelligence: TeamIntelligence::new(),
            config,
        }
    }

    fn usable<'a>(&self, workers: impl IntoIterator<Item = &'a Worker>) -> Vec<&'a Worker> {
        workers
            .into_iter()
            .filter(|w| self.health.is_usable(&w.id))
            .collect()
    }

    /// Record a failure against `worker` and publish what it caused
    fn record_failure(&mut self, events: &EventBus, worker: &str, error: &str) {
        let verdict = self.health.record_failure(worker, error);
        let timestamp = Utc::now();
        let _ = events.publish(TeamEvent::WorkerFailed {
            worker: worker.to_string(),
            error: error.to_string(),
            timestamp,
        });
        let event = match verdict {
            FailureVerdict::Quarantined { until, failures } => TeamEvent::WorkerQuarantined {
                worker: worker.to_string(),
                failures,
                until,
                timestamp,
            },
            FailureVerdict::Blacklisted { failures } => TeamEvent::WorkerBlacklisted {
                worker: worker.to_string(),
                failures,
                timestamp,
            },
        };
        let _ = events.publish(event);
    }

    /// Fold one call outcome into health, latency and the warm tier
    fn apply_outcome(&mut self, catalog: &WorkerCatalog, events: &EventBus, outcome: &CallOutcome) {
        let worker = outcome.worker.as_str();
        if outcome.staged {
            self.tier.touch(worker);
        }
        match &outcome.result {
            Ok(_) => {
                self.health.record_success(worker);
                self.latency.record(worker, outcome.latency_ms, outcome.staged);
                let _ = events.publish(TeamEvent::WorkerSucceeded {
                    worker: worker.to_string(),
                    latency_ms: outcome.latency_ms,
                    staged: outcome.staged,
                    timestamp: Utc::now(),
                });
                let entry = catalog.get(worker).filter(|_| !outcome.staged);
                if let Some(entry) = entry {
                    if self
                        .tier
                        .should_stage_opportunistically(entry, outcome.latency_ms, false)
                        && self.tier.stage_if_fits(entry)
                    {
                        debug!(worker, latency_ms = outcome.latency_ms, "opportunistically staged");
                        self.publish_staged(events, entry);
                    }
                }
            }
            Err(e) => self.record_failure(events, worker, &e.to_string()),
        }
    }

    fn apply_outcomes(&mut self, catalog: &WorkerCatalog, events: &EventBus, outcomes: &[CallOutcome]) {
        for outcome in outcomes {
            self.apply_outcome(catalog, events, outcome);
        }
    }

    fn publish_staged(&self, events: &EventBus, worker: &Worker) {
        let footprint_bytes = self
            .tier
            .entry(&worker.id)
            .map_or(0, |e| e.footprint_bytes);
        let _ = events.publish(TeamEvent::WorkerStaged {
            worker: worker.id.clone(),
            footprint_bytes,
            timestamp: Utc::now(),
        });
    }
}

/// Operator-facing snapshot of the team
#[derive(Debug, Clone, Serialize)]
pub struct TeamStats {
    pub workers: usize,
    pub usable_workers: usize,
    pub dispatch: DispatchConfig,
    pub staging: StagingUsage,
    pub warm: Vec<String>,
    pub latency: LatencyMetrics,
    pub health: HealthSummary,
    pub intelligence: TeamMetrics,
}

/// What [`TeamOrchestrator::initialize`] did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitReport {
    pub staged: Vec<String>,
    pub warmed: Option<String>,
}

/// Runs team requests and owns all cross-request state
pub struct TeamOrchestrator {
    catalog: Arc<WorkerCatalog>,
    backend: SharedBackend,
    classifier: TaskClassifier,
    evaluator: ResponseEvaluator,
    events: SharedEventBus,
    probes: ProbeGate,
    state: Arc<RwLock<OrchestratorState>>,
}

impl TeamOrchestrator {
    pub fn new(catalog: WorkerCatalog, backend: SharedBackend, config: EngineConfig) -> Self {
        let evaluator = ResponseEvaluator::new(
            Default::default(),
            config.collaboration.diversity_bonus,
        );
        Self {
            catalog: Arc::new(catalog),
            backend,
            classifier: TaskClassifier::new(config.classifier.clone()),
            evaluator,
            events: EventBus::new().shared(),
            probes: ProbeGate::new(),
            state: Arc::new(RwLock::new(OrchestratorState::new(config))),
        }
    }

    /// Publish to an existing bus instead of a private one
    pub fn with_event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = events;
        self
    }

    /// Create a shared reference to this orchestrator
    pub fn shared(self) -> SharedTeamOrchestrator {
        Arc::new(self)
    }

    pub fn catalog(&self) -> &WorkerCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Read access to the process-wide state
    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, OrchestratorState> {
        self.state.read().await
    }

    async fn planner(&self) -> JobPlanner {
        let state = self.state.read().await;
        JobPlanner::new(
            self.catalog.clone(),
            state.config.dispatch.clone(),
            &state.config.generation,
        )
        .with_state(&state.tier, &state.latency)
    }

    async fn fold(&self, outcomes: &[CallOutcome]) {
        if outcomes.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        state.apply_outcomes(&self.catalog, &self.events, outcomes);
    }

    // =========================================================================
    // Team requests
    // =========================================================================

    /// Run `prompt` across a team and return the ranked candidates plus a
    /// consensus answer.
    ///
    /// `subset` restricts the team to the named workers. Per-worker failures
    /// only become health signals; the call fails only when no worker can be
    /// used or none produced an answer.
    pub async fn run_team_request(
        &self,
        prompt: &str,
        context: Option<&str>,
        subset: Option<&[String]>,
    ) -> OrchestratorResult<RunResult> {
        let run_id = TeamEvent::new_run_id();
        let _ = self.events.publish(TeamEvent::RunStarted {
            run_id: run_id.clone(),
            prompt_preview: preview(prompt, PROMPT_PREVIEW_CHARS),
            timestamp: Utc::now(),
        });

        let result = self.execute_run(&run_id, prompt, context, subset).await;
        if let Err(e) = &result {
            warn!(run_id = %run_id, error = %e, "team request failed");
            let _ = self.events.publish(TeamEvent::RunFailed {
                run_id,
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn execute_run(
        &self,
        run_id: &str,
        prompt: &str,
        context: Option<&str>,
        subset: Option<&[String]>,
    ) -> OrchestratorResult<RunResult> {
        let start = Instant::now();

        let pool: Vec<&Worker> = match subset {
            Some([]) => return Err(OrchestratorError::EmptyWorkerSubset),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    self.catalog
                        .get(id)
                        .ok_or_else(|| OrchestratorError::UnknownWorker(id.clone()))
                })
                .collect::<OrchestratorResult<_>>()?,
            None => self.catalog.workers().iter().collect(),
        };

        let (usable_ids, config) = {
            let mut state = self.state.write().await;
            state.health.sweep_at(Utc::now());
            let usable: Vec<String> = state
                .usable(pool.iter().copied())
                .into_iter()
                .map(|w| w.id.clone())
                .collect();
            (usable, state.config.clone())
        };
        if usable_ids.is_empty() {
            return Err(OrchestratorError::NoHealthyWorkers {
                excluded: pool.len(),
            });
        }

        if config.collaboration.preflight_diagnosis {
            let health = self.backend.health().await;
            if !health.healthy {
                return Err(OrchestratorError::BackendUnavailable(
                    health.error.unwrap_or_else(|| "backend unreachable".to_string()),
                ));
            }
        }

        let classification = self.classifier.classify(prompt, &self.catalog);
        let usable: Vec<&Worker> = usable_ids
            .iter()
            .filter_map(|id| self.catalog.get(id))
            .collect();
        let selection = match subset {
            Some(_) => WorkerSelection {
                workers: usable_ids.clone(),
                strategy: SelectionStrategy::Requested,
            },
            None => self
                .classifier
                .select_workers(&classification, &usable, &config.dispatch),
        };
        info!(
            run_id,
            domain = %classification.domain,
            confidence = classification.confidence,
            strategy = %selection.strategy,
            workers = ?selection.workers,
            "team selected"
        );
        let _ = self.events.publish(TeamEvent::WorkersSelected {
            run_id: run_id.to_string(),
            workers: selection.workers.clone(),
            strategy: selection.strategy,
            domain: classification.domain.clone(),
            timestamp: Utc::now(),
        });

        // First drafts
        let dispatcher = Dispatcher::new(self.backend.clone(), config.dispatch.clone());
        let planner = self.planner().await;
        let context_owned = context.map(str::to_string);
        let jobs = selection
            .workers
            .iter()
            .map(|w| planner.plan(w, prompt.to_string(), context_owned.clone(), true))
            .collect();
        let outcomes = dispatcher.run_jobs(jobs).await;
        self.fold(&outcomes).await;

        let attempted = outcomes.len();
        let last_error = outcomes
            .iter()
            .rev()
            .find_map(|o| o.result.as_ref().err().map(BackendError::to_string));
        let mut candidates: Vec<Candidate> = outcomes
            .into_iter()
            .filter_map(|o| match o.result {
                Ok(text) if !text.trim().is_empty() => {
                    Some(Candidate::success(o.worker, text, o.latency_ms).with_staged(o.staged))
                }
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            return Err(OrchestratorError::AllWorkersFailed {
                attempted,
                last_error: last_error.unwrap_or_else(|| "empty responses".to_string()),
            });
        }

        self.evaluator
            .evaluate_all(&mut candidates, prompt, &classification, &self.catalog);

        // Peer review and refinement
        let planner = self.planner().await;
        let mut review_loop = PeerReviewLoop::new(
            &dispatcher,
            &planner,
            &self.evaluator,
            &self.catalog,
            &config.collaboration,
        );
        let summary = review_loop
            .run(&mut candidates, prompt, &classification)
            .await;
        self.fold(&review_loop.into_calls()).await;

        for candidate in candidates.iter_mut() {
            self.evaluator.finalize(candidate);
        }
        ResponseEvaluator::rank(&mut candidates, &self.catalog);

        // Consensus
        let planner = self.planner().await;
        let synthesis = ConsensusSynthesizer::new(&config.collaboration)
            .synthesize(&dispatcher, &planner, &candidates, prompt, context)
            .await?;
        if let Some(call) = &synthesis.call {
            self.fold(std::slice::from_ref(call)).await;
        }
        let consensus = synthesis.consensus;

        let scores: Vec<f64> = candidates.iter().map(|c| c.final_score).collect();
        let stats = RunStats {
            workers_selected: selection.workers.len(),
            workers_succeeded: candidates.len(),
            mean_score: scores.iter().sum::<f64>() / scores.len() as f64,
            best_score: scores.first().copied().unwrap_or(0.0),
            collaboration: CollaborationMetrics {
                diversity_index: diversity_index(&candidates),
                consensus_strength: consensus_strength(&candidates),
                collaboration_effectiveness: collaboration_effectiveness(&candidates),
                expertise_match: classification.confidence
                    > self.classifier.config().confidence_threshold,
                peer_reviews: summary.reviews,
                refinement_rounds: summary.rounds,
            },
            classification,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        let result = RunResult {
            candidates,
            consensus,
            stats,
        };

        self.state
            .write()
            .await
            .intelligence
            .record_run(&result, config.collaboration.enable_peer_review);

        info!(
            run_id,
            method = %result.consensus.method,
            worker = %result.consensus.candidate.worker,
            candidates = result.candidates.len(),
            elapsed_ms = result.stats.elapsed_ms,
            "team request complete"
        );
        let _ = self.events.publish(TeamEvent::ConsensusReached {
            run_id: run_id.to_string(),
            worker: result.consensus.candidate.worker.clone(),
            method: result.consensus.method,
            final_score: result.consensus.candidate.final_score,
            timestamp: Utc::now(),
        });
        Ok(result)
    }

    /// Fetch context for `message`, run it across the team and hand the
    /// result to `sink`.
    pub async fn respond(
        &self,
        message: &str,
        provider: &dyn ContextProvider,
        sink: &dyn ResponseSink,
    ) -> OrchestratorResult<RunResult> {
        let context = provider.get_context(message).await;
        let result = self.run_team_request(message, Some(&context), None).await?;
        sink.deliver(&result);
        Ok(result)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Probe one worker with a minimal request.
    ///
    /// Concurrent probes of one worker share a single in-flight future, and
    /// every caller gets that probe's verdict. Inside it, known-bad workers
    /// are blacklisted without a call and a rate-limited probe reports
    /// current usability.
    pub async fn probe_health(&self, worker: &str) -> bool {
        let backend = self.backend.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let id = worker.to_string();
        self.probes
            .probe(worker, move || {
                async move {
                    let (request, timeout) = {
                        let mut state = state.write().await;
                        if state.health.is_known_bad(&id) {
                            state.health.fast_fail(&id);
                            let _ = events.publish(TeamEvent::WorkerBlacklisted {
                                worker: id.clone(),
                                failures: state.health.failure_count(&id),
                                timestamp: Utc::now(),
                            });
                            return false;
                        }
                        let now = Utc::now();
                        if !state.health.should_probe_at(&id, now) {
                            debug!(worker = %id, "probe rate-limited");
                            return state.health.is_usable_at(&id, now);
                        }
                        state.health.mark_probed_at(&id, now);
                        (
                            probe_request(&id, &state.config.generation),
                            state.config.health.probe_timeout(),
                        )
                    };

                    let result = call_with_timeout(backend.as_ref(), &request, timeout).await;
                    let mut state = state.write().await;
                    match result {
                        Ok(_) => {
                            state.health.record_success(&id);
                            debug!(worker = %id, "probe succeeded");
                            true
                        }
                        Err(e) => {
                            warn!(worker = %id, error = %e, "probe failed");
                            state.record_failure(&events, &id, &format!("probe: {}", e));
                            false
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    /// Operator recovery: clear all failures, quarantines and blacklists
    pub async fn reset_health(&self) {
        self.state.write().await.health.reset();
        let _ = self.events.publish(TeamEvent::HealthReset {
            worker: None,
            timestamp: Utc::now(),
        });
    }

    /// Clear one worker's health record. Returns true if it was excluded.
    pub async fn rehabilitate_worker(&self, worker: &str) -> OrchestratorResult<bool> {
        if !self.catalog.contains(worker) {
            return Err(OrchestratorError::UnknownWorker(worker.to_string()));
        }
        let was_excluded = self.state.write().await.health.rehabilitate(worker);
        let _ = self.events.publish(TeamEvent::HealthReset {
            worker: Some(worker.to_string()),
            timestamp: Utc::now(),
        });
        Ok(was_excluded)
    }

    pub async fn is_usable(&self, worker: &str) -> bool {
        self.state.read().await.health.is_usable(worker)
    }

    // =========================================================================
    // Warm-up and diagnosis
    // =========================================================================

    /// Preload the warm tier and warm one healthy worker
    pub async fn initialize(&self) -> InitReport {
        let (staged, first) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let health = &state.health;
            let staged = state
                .tier
                .preload_catalog(&self.catalog, |w| !health.is_usable(&w.id));
            for id in &staged {
                if let Some(worker) = self.catalog.get(id) {
                    state.publish_staged(&self.events, worker);
                }
            }
            let usable = state.usable(self.catalog.workers());
            let first = usable
                .iter()
                .find(|w| w.is_light())
                .or_else(|| usable.first())
                .map(|w| w.id.clone());
            (staged, first)
        };
        info!(staged = staged.len(), "warm tier preloaded");

        let warmed = match first {
            Some(id) if self.warm_up(&id).await => Some(id),
            _ => None,
        };
        InitReport { staged, warmed }
    }

    /// Probe a worker and send it a one-word prompt so the backend loads it
    pub async fn warm_up(&self, worker: &str) -> bool {
        {
            let state = self.state.read().await;
            if state.health.is_blacklisted(worker) {
                debug!(worker, "skipping warm-up of blacklisted worker");
                return false;
            }
            if state.warm.contains(worker) {
                return true;
            }
        }
        if !self.probe_health(worker).await {
            return false;
        }

        let planner = self.planner().await;
        let dispatch = self.state.read().await.config.dispatch.clone();
        let dispatcher = Dispatcher::new(self.backend.clone(), dispatch);
        let outcome = dispatcher
            .call_one(planner.plan(worker, WARMUP_PROMPT.to_string(), None, false))
            .await;
        self.fold(std::slice::from_ref(&outcome)).await;

        if outcome.is_success() {
            self.state.write().await.warm.insert(worker.to_string());
            info!(worker, latency_ms = outcome.latency_ms, "worker warmed up");
            true
        } else {
            false
        }
    }

    pub async fn diagnose_backend_health(&self) -> BackendHealth {
        self.backend.health().await
    }

    /// Time one short prompt against a light worker and grade the latency
    pub async fn diagnose_performance(&self) -> PerformanceDiagnosis {
        let workers = self.catalog.workers();
        let Some(worker) = workers.iter().find(|w| w.is_light()).or(workers.first()) else {
            return PerformanceDiagnosis {
                grade: PerformanceGrade::NoWorkers,
                worker: None,
                latency_ms: None,
                error: None,
                recommendations: vec!["Add workers to the catalog".to_string()],
            };
        };

        let planner = self.planner().await;
        let dispatch = self.state.read().await.config.dispatch.clone();
        let outcome = Dispatcher::new(self.backend.clone(), dispatch)
            .call_one(planner.plan(&worker.id, DIAGNOSIS_PROMPT.to_string(), None, false))
            .await;
        self.fold(std::slice::from_ref(&outcome)).await;

        let (grade, error) = match &outcome.result {
            Ok(_) => (PerformanceGrade::from_latency_ms(outcome.latency_ms), None),
            Err(e) => (PerformanceGrade::Error, Some(e.to_string())),
        };
        let recommendations = match grade {
            PerformanceGrade::Excellent => vec![],
            PerformanceGrade::Good => vec!["Consider reducing max concurrency".to_string()],
            PerformanceGrade::Slow => vec![
                "Enable speed mode".to_string(),
                "Reduce max concurrency to 2".to_string(),
            ],
            PerformanceGrade::Error | PerformanceGrade::NoWorkers => vec![
                "Check that the inference backend is running".to_string(),
                "Check that the worker is installed on the backend".to_string(),
            ],
        };
        info!(worker = %worker.id, grade = %grade, latency_ms = outcome.latency_ms, "performance diagnosed");
        PerformanceDiagnosis {
            grade,
            worker: Some(worker.id.clone()),
            latency_ms: Some(outcome.latency_ms),
            error,
            recommendations,
        }
    }

    // =========================================================================
    // Operational controls
    // =========================================================================

    pub async fn configure_concurrency(&self, max_concurrency: usize, cooldown_ms: u64, prioritize_speed: bool) {
        let mut state = self.state.write().await;
        let dispatch = &mut state.config.dispatch;
        dispatch.max_concurrency = max_concurrency.max(1);
        dispatch.cooldown_ms = cooldown_ms;
        dispatch.prioritize_speed = prioritize_speed;
        info!(max_concurrency = dispatch.max_concurrency, cooldown_ms, prioritize_speed, "concurrency configured");
    }

    /// Flip speed mode; returns the new setting
    pub async fn toggle_speed_mode(&self) -> bool {
        let mut state = self.state.write().await;
        let dispatch = &mut state.config.dispatch;
        dispatch.prioritize_speed = !dispatch.prioritize_speed;
        info!(prioritize_speed = dispatch.prioritize_speed, "speed mode toggled");
        dispatch.prioritize_speed
    }

    /// Enable/disable the warm tier and set its capacity; returns evicted workers
    pub async fn configure_staging_tier(&self, enabled: bool, capacity_bytes: u64) -> Vec<String> {
        let mut state = self.state.write().await;
        let evicted = state.tier.configure(enabled, capacity_bytes);
        state.config.staging.enabled = enabled;
        state.config.staging.capacity_bytes = capacity_bytes;
        for worker in &evicted {
            let _ = self.events.publish(TeamEvent::WorkerEvicted {
                worker: worker.clone(),
                timestamp: Utc::now(),
            });
        }
        evicted
    }

    pub async fn clear_staging_tier(&self) {
        let mut state = self.state.write().await;
        for worker in state.tier.staged_ids() {
            let _ = self.events.publish(TeamEvent::WorkerEvicted {
                worker,
                timestamp: Utc::now(),
            });
        }
        state.tier.clear();
    }

    pub async fn team_stats(&self) -> TeamStats {
        let state = self.state.read().await;
        TeamStats {
            workers: self.catalog.len(),
            usable_workers: state.usable(self.catalog.workers()).len(),
            dispatch: state.config.dispatch.clone(),
            staging: state.tier.usage(),
            warm: state.warm.iter().cloned().collect(),
            latency: state.latency.metrics(),
            health: state.health.summary(),
            intelligence: state.intelligence.metrics(),
        }
    }

    pub async fn insights(&self) -> TeamInsights {
        self.state.read().await.intelligence.insights()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, GenerationRequest, GenerationResponse, InferenceBackend};
    use crate::config::HealthPolicy;
    use crate::registry::ResourceClass;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every prompt; "broken" always fails
    struct Echo {
        calls: AtomicUsize,
        latency: std::time::Duration,
    }

    #[async_trait]
    impl InferenceBackend for Echo {
        async fn generate(&self, request: &GenerationRequest) -> BackendResult<GenerationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if request.worker == "broken" {
                return Err(BackendError::Status {
                    status: 500,
                    body: "model failed to load".into(),
                });
            }
            Ok(GenerationResponse {
                text: format!("{} says hello", request.worker),
                raw_latency_ms: 1,
            })
        }

        async fn health(&self) -> BackendHealth {
            BackendHealth {
                healthy: true,
                worker_count: 3,
                error: None,
            }
        }
    }

    fn orchestrator(latency_ms: u64, config: EngineConfig) -> (Arc<Echo>, TeamOrchestrator) {
        let backend = Arc::new(Echo {
            calls: AtomicUsize::new(0),
            latency: std::time::Duration::from_millis(latency_ms),
        });
        let catalog = WorkerCatalog::new(vec![
            Worker::new("small", ResourceClass::Light, 1),
            Worker::new("mid", ResourceClass::Medium, 2),
            Worker::new("broken", ResourceClass::Light, 3),
        ])
        .unwrap();
        (backend.clone(), TeamOrchestrator::new(catalog, backend, config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_bad_fast_fails_without_call() {
        let config = EngineConfig {
            health: HealthPolicy {
                known_bad: vec!["broken".into()],
                ..HealthPolicy::default()
            },
            ..EngineConfig::default()
        };
        let (backend, orch) = orchestrator(10, config);
        assert!(!orch.probe_health("broken").await);
        assert!(!orch.is_usable("broken").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_is_rate_limited() {
        let (backend, orch) = orchestrator(10, EngineConfig::default());
        assert!(orch.probe_health("small").await);
        assert!(orch.probe_health("small").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        assert!(!orch.probe_health("broken").await);
        assert_eq!(orch.state().await.health.failure_count("broken"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_probes_share_one_call() {
        let (backend, orch) = orchestrator(500, EngineConfig::default());
        let (first, second) = tokio::join!(orch.probe_health("broken"), orch.probe_health("broken"));
        assert!(!first);
        assert!(!second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.state().await.health.failure_count("broken"), 1);
        assert!(!orch.is_usable("broken").await);

        let (a, b, c) = tokio::join!(
            orch.probe_health("small"),
            orch.probe_health("small"),
            orch.probe_health("small")
        );
        assert!(a && b && c);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.probes.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_stages_and_warms() {
        let (_, orch) = orchestrator(10, EngineConfig::default());
        let report = orch.initialize().await;
        assert_eq!(report.staged, vec!["small", "broken", "mid"]);
        assert_eq!(report.warmed.as_deref(), Some("small"));
        assert!(orch.warm_up("small").await);
        let stats = orch.team_stats().await;
        assert_eq!(stats.warm, vec!["small"]);
        assert_eq!(stats.staging.staged.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_still_touches_staged_worker() {
        let (_, orch) = orchestrator(10, EngineConfig::default());
        orch.initialize().await;
        let before = orch.state().await.tier.entry("broken").unwrap().access_seq;

        let subset = vec!["broken".to_string()];
        let err = orch.run_team_request("hi", None, Some(&subset)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AllWorkersFailed { .. }));

        let state = orch.state().await;
        assert!(state.tier.entry("broken").unwrap().access_seq > before);
        assert_eq!(state.health.failure_count("broken"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_unstaged_worker_is_staged_opportunistically() {
        let config = EngineConfig {
            collaboration: crate::config::CollaborationConfig {
                enable_peer_review: false,
                synthesis_enabled: false,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let (_, orch) = orchestrator(6_000, config);
        let subset = vec!["mid".to_string()];
        let result = orch.run_team_request("hi", None, Some(&subset)).await.unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert!(orch.state().await.tier.is_staged("mid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subset_validation() {
        let (backend, orch) = orchestrator(10, EngineConfig::default());
        let empty: Vec<String> = vec![];
        assert!(matches!(
            orch.run_team_request("q", None, Some(&empty)).await,
            Err(OrchestratorError::EmptyWorkerSubset)
        ));
        let unknown = vec!["ghost".to_string()];
        assert!(matches!(
            orch.run_team_request("q", None, Some(&unknown)).await,
            Err(OrchestratorError::UnknownWorker(id)) if id == "ghost"
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operational_controls() {
        let (_, orch) = orchestrator(10, EngineConfig::default());
        orch.configure_concurrency(0, 500, false).await;
        assert!(orch.toggle_speed_mode().await);
        let stats = orch.team_stats().await;
        assert_eq!(stats.dispatch.max_concurrency, 1);
        assert_eq!(stats.dispatch.cooldown_ms, 500);
        assert!(stats.dispatch.prioritize_speed);

        orch.initialize().await;
        let evicted = orch.configure_staging_tier(false, 0).await;
        assert_eq!(evicted.len(), 3);
        assert!(!orch.team_stats().await.staging.enabled);

        assert!(matches!(
            orch.rehabilitate_worker("ghost").await,
            Err(OrchestratorError::UnknownWorker(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_performance_diagnosis_grades() {
        let (_, orch) = orchestrator(6_000, EngineConfig::default());
        let diagnosis = orch.diagnose_performance().await;
        assert_eq!(diagnosis.grade, PerformanceGrade::Good);
        assert_eq!(diagnosis.worker.as_deref(), Some("small"));
        assert_eq!(diagnosis.recommendations.len(), 1);

        let empty = TeamOrchestrator::new(
            WorkerCatalog::new(vec![]).unwrap(),
            Arc::new(Echo {
                calls: AtomicUsize::new(0),
                latency: std::time::Duration::ZERO,
            }),
            EngineConfig::default(),
        );
        assert_eq!(empty.diagnose_performance().await.grade, PerformanceGrade::NoWorkers);
    }
}
