//! Per-call timeouts and the latency history they adapt to.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::DispatchConfig;
use crate::registry::Worker;

/// Assumed latency for a worker with no history
pub const DEFAULT_LATENCY_MS: u64 = 15_000;

/// Last observed latency per worker, split by warm-tier state.
#[derive(Debug, Clone, Default)]
pub struct LatencyTracker {
    staged: HashMap<String, u64>,
    cold: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyMetrics {
    pub mean_staged_ms: Option<f64>,
    pub mean_cold_ms: Option<f64>,
    /// How much faster staged calls are than cold ones, in percent
    pub improvement_percent: Option<f64>,
}

fn mean(values: &HashMap<String, u64>) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.values().sum::<u64>() as f64 / values.len() as f64)
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, worker: &str, latency_ms: u64, staged: bool) {
        let map = if staged {
            &mut self.staged
        } else {
            &mut self.cold
        };
        map.insert(worker.to_string(), latency_ms);
    }

    /// Mean of the last staged and last cold latency, whichever exist
    pub fn average_ms(&self, worker: &str) -> u64 {
        match (self.staged.get(worker), self.cold.get(worker)) {
            (Some(s), Some(c)) => (s + c) / 2,
            (Some(v), None) | (None, Some(v)) => *v,
            (None, None) => DEFAULT_LATENCY_MS,
        }
    }

    pub fn metrics(&self) -> LatencyMetrics {
        let mean_staged_ms = mean(&self.staged);
        let mean_cold_ms = mean(&self.cold);
        let improvement_percent = match (mean_staged_ms, mean_cold_ms) {
            (Some(s), Some(c)) if c > 0.0 => Some((c - s) / c * 100.0),
            _ => None,
        };
        LatencyMetrics {
            mean_staged_ms,
            mean_cold_ms,
            improvement_percent,
        }
    }
}

/// Timeout for one call.
///
/// Base is the worker's class timeout (or the default for unknown workers).
/// Team mode stretches it by the team multiplier up to the team ceiling.
/// Workers whose average latency exceeds the adaptive threshold get at least
/// `adaptive_multiplier ×` that average.
pub fn timeout_for(
    config: &DispatchConfig,
    worker: Option<&Worker>,
    team_mode: bool,
    average_latency_ms: u64,
) -> Duration {
    let base = worker.map_or(config.default_timeout_ms, |w| config.class_timeout_ms(w.class));
    let mut timeout_ms = if team_mode {
        let stretched = (base as f64 * config.team_timeout_multiplier) as u64;
        stretched.min(config.team_timeout_ceiling_ms)
    } else {
        base
    };
    if config.adaptive_timeout && average_latency_ms > config.adaptive_threshold_ms {
        let adaptive = (average_latency_ms as f64 * config.adaptive_multiplier) as u64;
        timeout_ms = timeout_ms.max(adaptive);
    }
    Duration::from_millis(timeout_ms)
}
