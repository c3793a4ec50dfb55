//! Team ensemble
//!
//! Runs one prompt across several workers and turns their answers into a
//! single response.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      TeamOrchestrator                      │
//! │  • Selects the team and dispatches in bounded batches      │
//! │  • Folds outcomes into health, latency and the warm tier   │
//! │  • Publishes TeamEvents                                    │
//! └─────────────────────────┬─────────────────────────────────┘
//!                           │
//!           ┌───────────────┼───────────────┐
//!           ▼               ▼               ▼
//!     ┌───────────┐   ┌───────────┐   ┌───────────┐
//!     │ Response  │   │ PeerReview│   │ Consensus │
//!     │ Evaluator │   │   Loop    │   │Synthesizer│
//!     └───────────┘   └───────────┘   └───────────┘
//! ```
//!
//! # Components
//!
//! - **TeamOrchestrator**: owns process-wide state and runs team requests
//! - **ResponseEvaluator**: heuristic 0-100 scoring and ranking
//! - **ConsensusSynthesizer**: merges the top answers into one
//! - **ContextProvider / ResponseSink**: contracts with the surrounding app
//!
//! # Usage
//!
//! ```ignore
//! use chorus_coordination::backend::OllamaBackend;
//! use chorus_coordination::config::EngineConfig;
//! use chorus_coordination::ensemble::TeamOrchestrator;
//! use chorus_coordination::registry::WorkerCatalog;
//!
//! let backend = Arc::new(OllamaBackend::new("http://localhost:11434")?);
//! let orchestrator = TeamOrchestrator::new(
//!     WorkerCatalog::default_catalog(),
//!     backend,
//!     EngineConfig::from_env(),
//! );
//! orchestrator.initialize().await;
//!
//! let result = orchestrator
//!     .run_team_request("How do I sort a list in Python?", None, None)
//!     .await?;
//! println!("{}", result.consensus.candidate.text);
//! ```

pub mod consensus;
pub mod context;
pub mod coordinator;
pub mod evaluator;

pub use consensus::{
    consensus_worker_id, ConsensusError, ConsensusResult, ConsensusSynthesizer, SynthesisOutcome,
};
pub use context::{ContextProvider, DiscardSink, NoContext, ResponseSink, StaticContext};
pub use coordinator::{
    InitReport, OrchestratorError, OrchestratorResult, OrchestratorState,
    SharedTeamOrchestrator, TeamOrchestrator, TeamStats,
};
pub use evaluator::{jaccard, word_set, Lexicon, ResponseEvaluator};
