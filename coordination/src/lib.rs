//! Chorus Coordination Library
//!
//! Runs one prompt across a team of language-model workers served by a
//! local inference backend and returns a single answer:
//! - Expertise routing: classify the prompt against declared worker expertise
//! - Health tracking: quarantine and blacklist failing workers, rate-limited probes
//! - Warm tier: keep recently useful workers resident within a byte budget
//! - Bounded dispatch: batches of at most N concurrent calls with a cooldown
//! - Ranking: heuristic scoring, peer review, refinement and consensus synthesis
//! - Team intelligence: what worked across past runs
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorus_coordination::{EngineConfig, OllamaBackend, TeamOrchestrator, WorkerCatalog};
//!
//! let backend = Arc::new(OllamaBackend::new("http://localhost:11434")?);
//! let orchestrator = TeamOrchestrator::new(
//!     WorkerCatalog::default_catalog(),
//!     backend,
//!     EngineConfig::from_env(),
//! );
//! let result = orchestrator.run_team_request("Explain ownership", None, None).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analytics;
pub mod backend;
pub mod config;
pub mod debate;
pub mod dispatch;
pub mod ensemble;
pub mod events;
pub mod registry;
pub mod router;
pub mod staging;
pub mod state;

// Re-export key engine types
pub use ensemble::{
    ContextProvider, InitReport, OrchestratorError, OrchestratorResult, ResponseSink,
    SharedTeamOrchestrator, TeamOrchestrator, TeamStats,
};

// Re-export configuration
pub use config::{
    ClassifierConfig, CollaborationConfig, DispatchConfig, EngineConfig, GenerationOptions,
    HealthPolicy, StagingConfig,
};

// Re-export backend types
pub use backend::{
    BackendError, BackendResult, GenerationRequest, GenerationResponse, InferenceBackend,
    OllamaBackend, SharedBackend,
};

// Re-export catalog types
pub use registry::{ResourceClass, Worker, WorkerCatalog};

// Re-export result types
pub use state::{
    BackendHealth, Candidate, Consensus, ConsensusMethod, PerformanceDiagnosis, PerformanceGrade,
    RunResult, RunStats, TaskClassification,
};

// Re-export key event types
pub use events::{EventBus, EventFilter, SharedEventBus, TeamEvent};

// Re-export analytics types
pub use analytics::{TeamInsights, TeamMetrics};
