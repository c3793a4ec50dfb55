//! Per-run result types
//!
//! Candidates and run results are created fresh for every team request and
//! handed back to the caller; nothing here is persisted.

use serde::{Deserialize, Serialize};

/// Upper bound on the summed evaluator criteria
pub const MAX_EVALUATION_SCORE: f64 = 110.0;

/// Individual evaluator criteria for one candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub completeness: f64,
    pub coherence: f64,
    pub specificity: f64,
    pub utility: f64,
    pub originality: f64,
    pub complementarity: f64,
}

impl ScoreBreakdown {
    /// Sum of all criteria, capped at [`MAX_EVALUATION_SCORE`]
    pub fn total(&self) -> f64 {
        let sum = self.relevance
            + self.completeness
            + self.coherence
            + self.specificity
            + self.utility
            + self.originality
            + self.complementarity;
        sum.min(MAX_EVALUATION_SCORE)
    }
}

/// A critique one worker wrote about another worker's draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReview {
    pub reviewer: String,
    pub text: String,
}

/// One worker's answer plus everything the engine learned about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub worker: String,
    pub text: String,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// Whether the worker was in the warm tier when called
    pub staged: bool,
    pub scores: ScoreBreakdown,
    /// Capped sum of `scores`
    pub evaluation_score: f64,
    pub peer_reviews: Vec<PeerReview>,
    pub collaboration_score: Option<f64>,
    pub refined: bool,
    /// Refinement round that produced this text (0 = first draft)
    pub iteration: u32,
    /// Evaluation score of the draft this candidate replaced
    pub original_score: Option<f64>,
    pub final_score: f64,
}

impl Candidate {
    /// A successful, not-yet-scored answer
    pub fn success(worker: impl Into<String>, text: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            worker: worker.into(),
            text: text.into(),
            latency_ms,
            success: true,
            error: None,
            staged: false,
            scores: ScoreBreakdown::default(),
            evaluation_score: 0.0,
            peer_reviews: Vec::new(),
            collaboration_score: None,
            refined: false,
            iteration: 0,
            original_score: None,
            final_score: 0.0,
        }
    }

    pub fn with_staged(mut self, staged: bool) -> Self {
        self.staged = staged;
        self
    }
}

/// How the final answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Only one candidate existed
    SingleBest,
    /// A worker merged the top candidates
    AiSynthesis,
    /// Synthesis failed or was disabled; best raw candidate returned
    BestFallback,
}

impl std::fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusMethod::SingleBest => write!(f, "single_best"),
            ConsensusMethod::AiSynthesis => write!(f, "ai_synthesis"),
            ConsensusMethod::BestFallback => write!(f, "best_fallback"),
        }
    }
}

/// The run's final answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub candidate: Candidate,
    pub method: ConsensusMethod,
    /// Workers whose answers fed the consensus
    pub sources: Vec<String>,
}

/// Classifier verdict for one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClassification {
    pub domain: String,
    /// Normalized winning score in [0, 1]
    pub confidence: f64,
    /// Workers scoring above zero for `domain`, best first
    pub ranked_workers: Vec<String>,
}

impl TaskClassification {
    pub fn general() -> Self {
        Self {
            domain: "general".to_string(),
            confidence: 0.0,
            ranked_workers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationMetrics {
    /// Mean pairwise lexical distance between answers
    pub diversity_index: f64,
    /// How tightly the final scores agree (1 = identical)
    pub consensus_strength: f64,
    /// Mean relative improvement of refined candidates
    pub collaboration_effectiveness: f64,
    /// Classifier was confident enough to pick specialists
    pub expertise_match: bool,
    pub peer_reviews: usize,
    pub refinement_rounds: u32,
}

/// Aggregate statistics for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub workers_selected: usize,
    pub workers_succeeded: usize,
    pub mean_score: f64,
    pub best_score: f64,
    pub classification: TaskClassification,
    pub collaboration: CollaborationMetrics,
    pub elapsed_ms: u64,
}

/// Complete answer to a team request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Successful candidates, descending final score
    pub candidates: Vec<Candidate>,
    pub consensus: Consensus,
    pub stats: RunStats,
}

/// Reachability of the inference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub worker_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Slow,
    Error,
    NoWorkers,
}

impl PerformanceGrade {
    pub fn from_latency_ms(latency_ms: u64) -> Self {
        match latency_ms {
            0..=4_999 => PerformanceGrade::Excellent,
            5_000..=14_999 => PerformanceGrade::Good,
            _ => PerformanceGrade::Slow,
        }
    }
}

impl std::fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceGrade::Excellent => write!(f, "excellent"),
            PerformanceGrade::Good => write!(f, "good"),
            PerformanceGrade::Slow => write!(f, "slow"),
            PerformanceGrade::Error => write!(f, "error"),
            PerformanceGrade::NoWorkers => write!(f, "no_workers"),
        }
    }
}

/// Result of timing a single test prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDiagnosis {
    pub grade: PerformanceGrade,
    pub worker: Option<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub recommendations: Vec<String>,
}
