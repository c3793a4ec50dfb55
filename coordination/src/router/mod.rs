//! Worker Router Module
//!
//! Decides which workers a prompt goes to and whether they may be called:
//! - Task classification against declared worker expertise
//! - Per-worker health (quarantine, blacklist) with rate-limited probes
//! - Prompt templates for the review, refinement and synthesis passes
//!
//! # Exclusion rules
//!
//! ```text
//! State        | Usable | Cleared by
//! -------------|--------|---------------------------------
//! healthy      | yes    | -
//! quarantined  | no     | window elapsed, success, reset
//! blacklisted  | no     | reset, rehabilitate
//! ```

pub mod circuit_breaker;
pub mod probe;
pub mod prompts;
pub mod task_classifier;

pub use circuit_breaker::{FailureVerdict, HealthMonitor, HealthPolicy, HealthRecord, HealthSummary};
pub use probe::{call_with_timeout, probe_request, ProbeGate};
pub use prompts::PromptTemplate;
pub use task_classifier::{SelectionStrategy, TaskClassifier, WorkerSelection};
