//! Run analytics
//!
//! - **metrics**: diversity, consensus strength and refinement
//!   effectiveness for a single run
//! - **intelligence**: session history and per-worker performance across
//!   runs, plus the insights derived from them

pub mod intelligence;
pub mod metrics;

pub use intelligence::{
    DomainLeader, DomainPerformance, SessionRecord, TeamInsights, TeamIntelligence, TeamMetrics,
    WorkerPerformance, MAX_SESSION_HISTORY, MIN_SESSIONS_FOR_INSIGHTS,
};
pub use metrics::{collaboration_effectiveness, consensus_strength, diversity_index};
