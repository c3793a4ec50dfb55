//! Engine configuration
//!
//! Every knob of the orchestration engine with the defaults the engine was
//! tuned for. All groups deserialize with `#[serde(default)]`, so a TOML
//! `[engine]` table only needs the values it changes. Durations are kept as
//! millisecond integers and exposed as [`Duration`] through accessors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::ResourceClass;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
}

/// Batching, timeout and fallback settings for the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum workers called concurrently in one batch
    pub max_concurrency: usize,
    /// Pause between consecutive batches
    pub cooldown_ms: u64,
    /// Fall back to one-at-a-time calls when the batch path breaks
    pub sequential_fallback: bool,
    /// Pause between calls on the sequential path
    pub sequential_pause_ms: u64,
    /// Prefer light workers and small teams
    pub prioritize_speed: bool,
    pub light_timeout_ms: u64,
    pub medium_timeout_ms: u64,
    pub large_timeout_ms: u64,
    /// Timeout for workers outside the catalog
    pub default_timeout_ms: u64,
    /// Team-mode calls get this multiple of the class timeout...
    pub team_timeout_multiplier: f64,
    /// ...capped by this ceiling
    pub team_timeout_ceiling_ms: u64,
    /// Stretch timeouts for historically slow workers
    pub adaptive_timeout: bool,
    pub adaptive_threshold_ms: u64,
    pub adaptive_multiplier: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            cooldown_ms: 2_000,
            sequential_fallback: true,
            sequential_pause_ms: 1_000,
            prioritize_speed: false,
            light_timeout_ms: 30_000,
            medium_timeout_ms: 60_000,
            large_timeout_ms: 90_000,
            default_timeout_ms: 30_000,
            team_timeout_multiplier: 1.5,
            team_timeout_ceiling_ms: 120_000,
            adaptive_timeout: true,
            adaptive_threshold_ms: 20_000,
            adaptive_multiplier: 1.5,
        }
    }
}

impl DispatchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn sequential_pause(&self) -> Duration {
        Duration::from_millis(self.sequential_pause_ms)
    }

    /// Base timeout for a resource class, before team/adaptive adjustment
    pub fn class_timeout_ms(&self, class: ResourceClass) -> u64 {
        match class {
            ResourceClass::Light => self.light_timeout_ms,
            ResourceClass::Medium => self.medium_timeout_ms,
            ResourceClass::Large => self.large_timeout_ms,
        }
    }
}

/// Circuit-breaker policy for worker health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Failures that move a worker to the permanent blacklist
    pub failure_threshold: u32,
    /// Quarantine window after a sub-threshold failure
    pub quarantine_ms: u64,
    /// Minimum spacing between probes of one worker
    pub probe_interval_ms: u64,
    /// Timeout for a single health probe
    pub probe_timeout_ms: u64,
    /// Workers known to be broken; blacklisted on first probe without a call
    pub known_bad: Vec<String>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            quarantine_ms: 5 * 60 * 1_000,
            probe_interval_ms: 5 * 60 * 1_000,
            probe_timeout_ms: 15_000,
            known_bad: Vec::new(),
        }
    }
}

impl HealthPolicy {
    pub fn quarantine_window(&self) -> Duration {
        Duration::from_millis(self.quarantine_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Warm tier capacity and footprint estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub enabled: bool,
    pub capacity_bytes: u64,
    pub light_footprint_bytes: u64,
    pub medium_footprint_bytes: u64,
    pub large_footprint_bytes: u64,
    /// Unstaged calls slower than this make the worker a staging candidate
    pub opportunistic_threshold_ms: u64,
    /// Only workers at or below this priority are staged opportunistically
    pub opportunistic_max_priority: u32,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_bytes: 4 * GIB,
            light_footprint_bytes: 500 * MIB,
            medium_footprint_bytes: GIB,
            large_footprint_bytes: 2 * GIB,
            opportunistic_threshold_ms: 5_000,
            opportunistic_max_priority: 4,
        }
    }
}

impl StagingConfig {
    /// Estimated footprint of a worker of the given class
    pub fn footprint_for(&self, class: ResourceClass) -> u64 {
        match class {
            ResourceClass::Light => self.light_footprint_bytes,
            ResourceClass::Medium => self.medium_footprint_bytes,
            ResourceClass::Large => self.large_footprint_bytes,
        }
    }
}

/// Task classifier and worker-selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Confidence above which specialists are preferred
    pub confidence_threshold: f64,
    /// Weight multiplier when a domain name appears verbatim in the prompt
    pub domain_match_weight: f64,
    /// Winning score is divided by this to produce confidence
    pub normalization: f64,
    pub max_specialists: usize,
    pub max_generalists: usize,
    /// Upper bound on the specialist + generalist team
    pub max_team_size: usize,
    /// Domains that mark a worker as a generalist
    pub generalist_domains: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            domain_match_weight: 2.0,
            normalization: 2.0,
            max_specialists: 3,
            max_generalists: 2,
            max_team_size: 5,
            generalist_domains: vec!["general".to_string(), "conversation".to_string()],
        }
    }
}

/// Peer review, refinement and synthesis switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    pub enable_peer_review: bool,
    pub enable_refinement: bool,
    pub max_rounds: u32,
    /// Added (×10) to the final score of highly original candidates
    pub diversity_bonus: f64,
    pub synthesis_enabled: bool,
    /// How many top candidates feed the synthesis prompt
    pub synthesis_top_k: usize,
    /// Check backend reachability before dispatching a run
    pub preflight_diagnosis: bool,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            enable_peer_review: true,
            enable_refinement: true,
            max_rounds: 2,
            diversity_bonus: 0.1,
            synthesis_enabled: true,
            synthesis_top_k: 3,
            preflight_diagnosis: true,
        }
    }
}

/// Sampling options sent with every generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// CPU threads the backend may use for coordination work
    pub thread_hint: u32,
    pub probe_temperature: f32,
    pub probe_max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1_000,
            thread_hint: 1,
            probe_temperature: 0.1,
            probe_max_tokens: 3,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    pub health: HealthPolicy,
    pub staging: StagingConfig,
    pub classifier: ClassifierConfig,
    pub collaboration: CollaborationConfig,
    pub generation: GenerationOptions,
}

impl EngineConfig {
    /// Defaults with `CHORUS_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `CHORUS_*` environment overrides on top of the current values
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse::<usize>("CHORUS_MAX_CONCURRENCY") {
            self.dispatch.max_concurrency = v.max(1);
        }
        if let Some(v) = env_parse("CHORUS_COOLDOWN_MS") {
            self.dispatch.cooldown_ms = v;
        }
        if let Some(v) = env_bool("CHORUS_PRIORITIZE_SPEED") {
            self.dispatch.prioritize_speed = v;
        }
        if let Some(v) = env_parse("CHORUS_TEAM_TIMEOUT_CEILING_MS") {
            self.dispatch.team_timeout_ceiling_ms = v;
        }
        if let Some(v) = env_parse("CHORUS_FAILURE_THRESHOLD") {
            self.health.failure_threshold = v;
        }
        if let Some(v) = env_parse("CHORUS_QUARANTINE_MS") {
            self.health.quarantine_ms = v;
        }
        if let Some(v) = env_bool("CHORUS_STAGING_ENABLED") {
            self.staging.enabled = v;
        }
        if let Some(v) = env_parse("CHORUS_STAGING_CAPACITY_BYTES") {
            self.staging.capacity_bytes = v;
        }
        if let Some(v) = env_bool("CHORUS_PEER_REVIEW") {
            self.collaboration.enable_peer_review = v;
        }
        if let Some(v) = env_bool("CHORUS_REFINEMENT") {
            self.collaboration.enable_refinement = v;
        }
        if let Some(v) = env_parse("CHORUS_MAX_ROUNDS") {
            self.collaboration.max_rounds = v;
        }
    }
}
