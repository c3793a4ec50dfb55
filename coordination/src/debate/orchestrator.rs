//! Peer review and refinement loop.
//!
//! Drives the collaboration passes between the first evaluation and the
//! final ranking:
//!
//! ```text
//! review:  every worker critiques every other candidate   n × (n − 1) calls
//! refine:  each critiqued worker rewrites its answer       ≤ n calls per round
//!          re-scored against the previous round's set     ≤ max_rounds rounds
//! ```
//!
//! All calls go through the batching dispatcher. A failed review is
//! dropped; a failed refinement keeps the previous candidate. Every call
//! outcome is retained so the caller can fold it into worker health.

use tracing::{debug, info};

use super::critique::{collaboration_score, PeerCritique};
use crate::config::CollaborationConfig;
use crate::dispatch::{CallOutcome, Dispatcher, JobPlanner};
use crate::ensemble::evaluator::ResponseEvaluator;
use crate::registry::WorkerCatalog;
use crate::router::PromptTemplate;
use crate::state::{Candidate, PeerReview, TaskClassification};

/// Result of the collaboration passes
#[derive(Debug, Default)]
pub struct LoopSummary {
    pub reviews: usize,
    pub rounds: u32,
}

pub struct PeerReviewLoop<'a> {
    dispatcher: &'a Dispatcher,
    planner: &'a JobPlanner,
    evaluator: &'a ResponseEvaluator,
    catalog: &'a WorkerCatalog,
    config: &'a CollaborationConfig,
    calls: Vec<CallOutcome>,
}

impl<'a> PeerReviewLoop<'a> {
    pub fn new(
        dispatcher: &'a Dispatcher,
        planner: &'a JobPlanner,
        evaluator: &'a ResponseEvaluator,
        catalog: &'a WorkerCatalog,
        config: &'a CollaborationConfig,
    ) -> Self {
        Self {
            dispatcher,
            planner,
            evaluator,
            catalog,
            config,
            calls: Vec::new(),
        }
    }

    /// Every call made so far, for health bookkeeping
    pub fn into_calls(self) -> Vec<CallOutcome> {
        self.calls
    }

    /// Ask `reviewer` to critique `candidate`. `None` if the call failed.
    pub async fn review(
        &mut self,
        reviewer: &str,
        candidate: &Candidate,
        prompt: &str,
    ) -> Option<String> {
        let text = PromptTemplate::review(reviewer, prompt, candidate).render();
        let job = self.planner.plan(reviewer, text, None, true);
        let outcome = self.dispatcher.call_one(job).await;
        let critique = outcome.result.as_ref().ok().cloned();
        self.calls.push(outcome);
        critique
    }

    /// Ask the candidate's own worker to improve it using `critiques`.
    ///
    /// Returns the rescored candidate, or the original unchanged when the
    /// call fails or there is nothing to act on.
    pub async fn refine(
        &mut self,
        candidate: &Candidate,
        critiques: &[PeerCritique],
        prompt: &str,
        siblings: &[Candidate],
        classification: &TaskClassification,
        iteration: u32,
    ) -> Candidate {
        if critiques.is_empty() {
            return candidate.clone();
        }
        let job = self.refine_job(candidate, critiques, prompt);
        let outcome = self.dispatcher.call_one(job).await;
        let refined = self.apply_refinement(candidate, &outcome, prompt, siblings, classification, iteration);
        self.calls.push(outcome);
        refined
    }

    fn refine_job(
        &self,
        candidate: &Candidate,
        critiques: &[PeerCritique],
        prompt: &str,
    ) -> crate::dispatch::Job {
        let feedback = critiques.iter().map(PeerCritique::to_feedback).collect();
        let text = PromptTemplate::refine(prompt, candidate, feedback).render();
        self.planner.plan(&candidate.worker, text, None, true)
    }

    fn apply_refinement(
        &self,
        previous: &Candidate,
        outcome: &CallOutcome,
        prompt: &str,
        siblings: &[Candidate],
        classification: &TaskClassification,
        iteration: u32,
    ) -> Candidate {
        let text = match &outcome.result {
            Ok(text) if !text.trim().is_empty() => text,
            _ => return previous.clone(),
        };
        let mut refined = Candidate::success(&previous.worker, text.clone(), outcome.latency_ms)
            .with_staged(outcome.staged);
        refined.peer_reviews = previous.peer_reviews.clone();
        refined.collaboration_score = previous.collaboration_score;
        refined.refined = true;
        refined.iteration = iteration;
        refined.original_score = Some(previous.evaluation_score);
        self.evaluator
            .evaluate(&mut refined, prompt, siblings, classification, self.catalog);
        debug!(
            worker = %refined.worker,
            before = previous.evaluation_score,
            after = refined.evaluation_score,
            iteration,
            "candidate refined"
        );
        refined
    }

    /// Run peer review and up to `max_rounds` refinement rounds.
    ///
    /// `candidates` must already be evaluated. Does nothing with fewer than
    /// two candidates or when peer review is disabled.
    pub async fn run(
        &mut self,
        candidates: &mut Vec<Candidate>,
        prompt: &str,
        classification: &TaskClassification,
    ) -> LoopSummary {
        let mut summary = LoopSummary::default();
        if !self.config.enable_peer_review || candidates.len() < 2 {
            return summary;
        }

        // (reviewed index, reviewer) for every ordered pair
        let pairs: Vec<(usize, String)> = (0..candidates.len())
            .flat_map(|i| {
                candidates
                    .iter()
                    .enumerate()
                    .filter(move |(j, _)| *j != i)
                    .map(move |(_, reviewer)| (i, reviewer.worker.clone()))
            })
            .collect();
        info!(candidates = candidates.len(), reviews = pairs.len(), "starting peer review");

        let jobs = pairs
            .iter()
            .map(|(i, reviewer)| {
                let text = PromptTemplate::review(reviewer, prompt, &candidates[*i]).render();
                self.planner.plan(reviewer, text, None, true)
            })
            .collect();
        let outcomes = self.dispatcher.run_jobs(jobs).await;

        for ((i, reviewer), outcome) in pairs.into_iter().zip(outcomes) {
            if let Ok(text) = &outcome.result {
                if !text.trim().is_empty() {
                    candidates[i].peer_reviews.push(PeerReview {
                        reviewer,
                        text: text.clone(),
                    });
                    summary.reviews += 1;
                }
            }
            self.calls.push(outcome);
        }

        let critiques: Vec<Vec<PeerCritique>> = candidates
            .iter()
            .map(|c| c.peer_reviews.iter().map(PeerCritique::parse).collect())
            .collect();
        for (candidate, parsed) in candidates.iter_mut().zip(&critiques) {
            candidate.collaboration_score = Some(collaboration_score(parsed));
        }

        if !self.config.enable_refinement {
            return summary;
        }

        for round in 1..=self.config.max_rounds {
            let targets: Vec<usize> = (0..candidates.len())
                .filter(|&i| !critiques[i].is_empty())
                .collect();
            if targets.is_empty() {
                break;
            }
            info!(round, max_rounds = self.config.max_rounds, workers = targets.len(), "refinement round");

            let jobs = targets
                .iter()
                .map(|&i| self.refine_job(&candidates[i], &critiques[i], prompt))
                .collect();
            let outcomes = self.dispatcher.run_jobs(jobs).await;

            let previous = candidates.clone();
            for (&i, outcome) in targets.iter().zip(outcomes) {
                candidates[i] = self.apply_refinement(
                    &previous[i],
                    &outcome,
                    prompt,
                    &previous,
                    classification,
                    round,
                );
                self.calls.push(outcome);
            }
            summary.rounds = round;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendError, BackendResult, GenerationRequest, GenerationResponse, InferenceBackend,
    };
    use crate::config::{DispatchConfig, GenerationOptions};
    use crate::registry::{ResourceClass, Worker};
    use crate::state::BackendHealth;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Reviews are positive; refinements fail for "stubborn"
    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> BackendResult<GenerationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = if request.prompt.contains("critically review") {
                "STRENGTHS: clear and correct\nWEAKNESSES: none\nSUGGESTIONS: add an example"
                    .to_string()
            } else if request.prompt.contains("improve your original answer") {
                if request.worker == "stubborn" {
                    return Err(BackendError::Status {
                        status: 500,
                        body: "oops".into(),
                    });
                }
                "Specifically, call sort() on the list. For example, v.sort() orders a vector \
                 in place. Therefore it is the method to apply. The steps are simple."
                    .to_string()
            } else {
                "draft".to_string()
            };
            Ok(GenerationResponse {
                text,
                raw_latency_ms: 1,
            })
        }

        async fn health(&self) -> BackendHealth {
            BackendHealth {
                healthy: true,
                worker_count: 2,
                error: None,
            }
        }
    }

    fn setup() -> (Arc<Scripted>, Arc<WorkerCatalog>) {
        let catalog = WorkerCatalog::new(vec![
            Worker::new("eager", ResourceClass::Light, 1),
            Worker::new("stubborn", ResourceClass::Light, 2),
        ])
        .unwrap();
        (
            Arc::new(Scripted {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(catalog),
        )
    }

    fn drafts() -> Vec<Candidate> {
        let mut a = Candidate::success("eager", "Use sort.", 1);
        a.evaluation_score = 40.0;
        let mut b = Candidate::success("stubborn", "Sort it.", 1);
        b.evaluation_score = 38.0;
        vec![a, b]
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_and_refine_rounds() {
        let (backend, catalog) = setup();
        let dispatcher = Dispatcher::new(backend.clone(), DispatchConfig::default());
        let planner = JobPlanner::new(catalog.clone(), DispatchConfig::default(), &GenerationOptions::default());
        let evaluator = ResponseEvaluator::default();
        let config = CollaborationConfig::default();
        let mut review_loop = PeerReviewLoop::new(&dispatcher, &planner, &evaluator, &catalog, &config);

        let mut candidates = drafts();
        let summary = review_loop
            .run(&mut candidates, "how do I sort a list", &TaskClassification::general())
            .await;

        assert_eq!(summary.reviews, 2);
        assert_eq!(summary.rounds, 2);
        // 2 reviews + 2 rounds × 2 refinements
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
        assert_eq!(review_loop.into_calls().len(), 6);

        let eager = &candidates[0];
        assert!(eager.refined);
        assert_eq!(eager.iteration, 2);
        assert!(eager.original_score.is_some());
        // "clear" + "correct" → 2 × 0.5
        assert_eq!(eager.collaboration_score, Some(1.0));

        let stubborn = &candidates[1];
        assert!(!stubborn.refined);
        assert_eq!(stubborn.text, "Sort it.");
        assert_eq!(stubborn.peer_reviews.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_or_single_candidate_is_noop() {
        let (backend, catalog) = setup();
        let dispatcher = Dispatcher::new(backend.clone(), DispatchConfig::default());
        let planner = JobPlanner::new(catalog.clone(), DispatchConfig::default(), &GenerationOptions::default());
        let evaluator = ResponseEvaluator::default();
        let config = CollaborationConfig {
            enable_peer_review: false,
            ..CollaborationConfig::default()
        };
        let mut review_loop = PeerReviewLoop::new(&dispatcher, &planner, &evaluator, &catalog, &config);
        let mut candidates = drafts();
        review_loop
            .run(&mut candidates, "q", &TaskClassification::general())
            .await;

        let enabled = CollaborationConfig::default();
        let mut single_loop = PeerReviewLoop::new(&dispatcher, &planner, &evaluator, &catalog, &enabled);
        let mut single = vec![drafts().remove(0)];
        single_loop
            .run(&mut single, "q", &TaskClassification::general())
            .await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(candidates.iter().all(|c| c.collaboration_score.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_review_and_refine_calls() {
        let (backend, catalog) = setup();
        let dispatcher = Dispatcher::new(backend.clone(), DispatchConfig::default());
        let planner = JobPlanner::new(catalog.clone(), DispatchConfig::default(), &GenerationOptions::default());
        let evaluator = ResponseEvaluator::default();
        let config = CollaborationConfig::default();
        let mut review_loop = PeerReviewLoop::new(&dispatcher, &planner, &evaluator, &catalog, &config);

        let drafts = drafts();
        let critique = review_loop.review("eager", &drafts[1], "q").await;
        assert!(critique.unwrap().starts_with("STRENGTHS"));

        let parsed = vec![PeerCritique::parse(&PeerReview {
            reviewer: "eager".into(),
            text: "STRENGTHS: short".into(),
        })];
        let kept = review_loop
            .refine(&drafts[1], &parsed, "q", &drafts, &TaskClassification::general(), 1)
            .await;
        assert_eq!(kept, drafts[1]);
        let improved = review_loop
            .refine(&drafts[0], &parsed, "q", &drafts, &TaskClassification::general(), 1)
            .await;
        assert!(improved.refined);
        assert_eq!(improved.original_score, Some(40.0));
    }
}
