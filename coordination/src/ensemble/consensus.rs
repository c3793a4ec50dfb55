//! Consensus synthesis
//!
//! Turns the ranked candidates of a run into one final answer:
//!
//! ```text
//! 0 candidates           → error
//! 1 candidate            → that candidate            (single_best)
//! ≥ 2, synthesis enabled → top-ranked worker merges the top k
//!     call succeeds      → consensus_{worker}         (ai_synthesis)
//!     call fails         → top-ranked candidate       (best_fallback)
//! ≥ 2, synthesis off     → top-ranked candidate       (best_fallback)
//! ```

use tracing::{info, warn};

use crate::config::CollaborationConfig;
use crate::dispatch::{CallOutcome, Dispatcher, JobPlanner};
use crate::router::PromptTemplate;
use crate::state::{Candidate, Consensus, ConsensusMethod};

/// Error type for consensus operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("No candidates to build a consensus from")]
    NoCandidates,
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Worker id given to a synthesized answer
pub fn consensus_worker_id(worker: &str) -> String {
    format!("consensus_{}", worker)
}

/// Consensus plus the synthesis call, if one was made
#[derive(Debug)]
pub struct SynthesisOutcome {
    pub consensus: Consensus,
    pub call: Option<CallOutcome>,
}

#[derive(Debug, Clone)]
pub struct ConsensusSynthesizer {
    enabled: bool,
    top_k: usize,
}

impl ConsensusSynthesizer {
    pub fn new(config: &CollaborationConfig) -> Self {
        Self {
            enabled: config.synthesis_enabled,
            top_k: config.synthesis_top_k.max(1),
        }
    }

    /// Build the final answer from candidates ranked best first.
    ///
    /// Only an empty input is an error; a failed synthesis call falls back
    /// to the best candidate.
    pub async fn synthesize(
        &self,
        dispatcher: &Dispatcher,
        planner: &JobPlanner,
        ranked: &[Candidate],
        prompt: &str,
        context: Option<&str>,
    ) -> ConsensusResult<SynthesisOutcome> {
        let best = ranked.first().ok_or(ConsensusError::NoCandidates)?;
        let sources: Vec<&Candidate> = ranked.iter().take(self.top_k).collect();
        let source_ids: Vec<String> = sources.iter().map(|c| c.worker.clone()).collect();

        if ranked.len() == 1 {
            return Ok(SynthesisOutcome {
                consensus: Consensus {
                    candidate: best.clone(),
                    method: ConsensusMethod::SingleBest,
                    sources: source_ids,
                },
                call: None,
            });
        }

        if !self.enabled {
            return Ok(Self::fallback(best, source_ids, None));
        }

        let top: Vec<Candidate> = sources.into_iter().cloned().collect();
        let text = PromptTemplate::synthesize(prompt, &top).render();
        let job = planner.plan(&best.worker, text, context.map(str::to_string), false);
        let outcome = dispatcher.call_one(job).await;

        match &outcome.result {
            Ok(text) if !text.trim().is_empty() => {
                info!(worker = %best.worker, sources = source_ids.len(), "consensus synthesized");
                let mut candidate = Candidate::success(
                    consensus_worker_id(&best.worker),
                    text.clone(),
                    outcome.latency_ms,
                )
                .with_staged(outcome.staged);
                candidate.evaluation_score = best.evaluation_score;
                candidate.final_score = best.final_score;
                Ok(SynthesisOutcome {
                    consensus: Consensus {
                        candidate,
                        method: ConsensusMethod::AiSynthesis,
                        sources: source_ids,
                    },
                    call: Some(outcome),
                })
            }
            Ok(_) => {
                warn!(worker = %best.worker, "synthesis returned empty text; using best candidate");
                Ok(Self::fallback(best, source_ids, Some(outcome)))
            }
            Err(e) => {
                warn!(worker = %best.worker, error = %e, "synthesis failed; using best candidate");
                Ok(Self::fallback(best, source_ids, Some(outcome)))
            }
        }
    }

    fn fallback(best: &Candidate, sources: Vec<String>, call: Option<CallOutcome>) -> SynthesisOutcome {
        SynthesisOutcome {
            consensus: Consensus {
                candidate: best.clone(),
                method: ConsensusMethod::BestFallback,
                sources,
            },
            call,
        }
    }
}
