//! Result types shared across the engine
//!
//! Candidates, consensus and run statistics produced for each team request,
//! plus the diagnosis records the operational controls return.

pub mod types;

pub use types::{
    BackendHealth, Candidate, CollaborationMetrics, Consensus, ConsensusMethod,
    PerformanceDiagnosis, PerformanceGrade, PeerReview, RunResult, RunStats, ScoreBreakdown,
    TaskClassification, MAX_EVALUATION_SCORE,
};
