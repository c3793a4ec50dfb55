//! Event types for team runs
//!
//! Published by the orchestrator as it selects, calls and rates workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::SelectionStrategy;
use crate::state::ConsensusMethod;

/// Identifier for one team request
pub type RunId = String;

/// All orchestrator events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamEvent {
    /// A team request was accepted
    RunStarted {
        run_id: RunId,
        prompt_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The team for a run was chosen
    WorkersSelected {
        run_id: RunId,
        workers: Vec<String>,
        strategy: SelectionStrategy,
        domain: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker call returned text
    WorkerSucceeded {
        worker: String,
        latency_ms: u64,
        staged: bool,
        timestamp: DateTime<Utc>,
    },

    /// A worker call failed or timed out
    WorkerFailed {
        worker: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker was excluded until `until`
    WorkerQuarantined {
        worker: String,
        failures: u32,
        until: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A worker was excluded until an operator resets it
    WorkerBlacklisted {
        worker: String,
        failures: u32,
        timestamp: DateTime<Utc>,
    },

    /// A worker entered the warm tier
    WorkerStaged {
        worker: String,
        footprint_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A worker left the warm tier
    WorkerEvicted {
        worker: String,
        timestamp: DateTime<Utc>,
    },

    /// A run produced its final answer
    ConsensusReached {
        run_id: RunId,
        worker: String,
        method: ConsensusMethod,
        final_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// A run ended without an answer
    RunFailed {
        run_id: RunId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Health state was cleared by an operator
    HealthReset {
        /// `None` when every worker was reset
        worker: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl TeamEvent {
    /// Generate a new run ID
    pub fn new_run_id() -> RunId {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TeamEvent::RunStarted { timestamp, .. } => *timestamp,
            TeamEvent::WorkersSelected { timestamp, .. } => *timestamp,
            TeamEvent::WorkerSucceeded { timestamp, .. } => *timestamp,
            TeamEvent::WorkerFailed { timestamp, .. } => *timestamp,
            TeamEvent::WorkerQuarantined { timestamp, .. } => *timestamp,
            TeamEvent::WorkerBlacklisted { timestamp, .. } => *timestamp,
            TeamEvent::WorkerStaged { timestamp, .. } => *timestamp,
            TeamEvent::WorkerEvicted { timestamp, .. } => *timestamp,
            TeamEvent::ConsensusReached { timestamp, .. } => *timestamp,
            TeamEvent::RunFailed { timestamp, .. } => *timestamp,
            TeamEvent::HealthReset { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TeamEvent::RunStarted { .. } => "run_started",
            TeamEvent::WorkersSelected { .. } => "workers_selected",
            TeamEvent::WorkerSucceeded { .. } => "worker_succeeded",
            TeamEvent::WorkerFailed { .. } => "worker_failed",
            TeamEvent::WorkerQuarantined { .. } => "worker_quarantined",
            TeamEvent::WorkerBlacklisted { .. } => "worker_blacklisted",
            TeamEvent::WorkerStaged { .. } => "worker_staged",
            TeamEvent::WorkerEvicted { .. } => "worker_evicted",
            TeamEvent::ConsensusReached { .. } => "consensus_reached",
            TeamEvent::RunFailed { .. } => "run_failed",
            TeamEvent::HealthReset { .. } => "health_reset",
        }
    }

    /// Get the run ID if this event is run-scoped
    pub fn run_id(&self) -> Option<&str> {
        match self {
            TeamEvent::RunStarted { run_id, .. } => Some(run_id),
            TeamEvent::WorkersSelected { run_id, .. } => Some(run_id),
            TeamEvent::ConsensusReached { run_id, .. } => Some(run_id),
            TeamEvent::RunFailed { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Get the worker if this event concerns one worker
    pub fn worker(&self) -> Option<&str> {
        match self {
            TeamEvent::WorkerSucceeded { worker, .. }
            | TeamEvent::WorkerFailed { worker, .. }
            | TeamEvent::WorkerQuarantined { worker, .. }
            | TeamEvent::WorkerBlacklisted { worker, .. }
            | TeamEvent::WorkerStaged { worker, .. }
            | TeamEvent::WorkerEvicted { worker, .. }
            | TeamEvent::ConsensusReached { worker, .. } => Some(worker),
            TeamEvent::HealthReset { worker, .. } => worker.as_deref(),
            _ => None,
        }
    }
}

/// First `max_chars` characters of a prompt, for event payloads
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
