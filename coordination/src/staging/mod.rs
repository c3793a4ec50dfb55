//! Warm tier: a bounded set of pre-staged workers
//!
//! The tier tracks which workers the backend is expected to keep resident.
//! Capacity and footprints are configuration values, not memory
//! measurements; the only effect outside this module is a longer keep-alive
//! hint on requests to staged workers and lower expected latency in stats.
//!
//! Invariant: the summed footprint of staged entries never exceeds the
//! capacity. Staging that would overflow first evicts the least recently
//! touched entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::StagingConfig;
use crate::registry::{ResourceClass, Worker, WorkerCatalog};

/// Keep-alive hint for staged workers
pub const STAGED_KEEP_ALIVE: &str = "10m";
/// Keep-alive hint for everything else
pub const DEFAULT_KEEP_ALIVE: &str = "5m";

/// Estimated footprint of a worker of `class` under `config`
pub fn footprint_for(config: &StagingConfig, class: ResourceClass) -> u64 {
    config.footprint_for(class)
}

/// One staged worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagingEntry {
    pub worker: String,
    pub footprint_bytes: u64,
    pub last_access: DateTime<Utc>,
    pub priority: u32,
    /// Logical access clock; orders entries for eviction
    #[serde(skip)]
    pub access_seq: u64,
}

/// Result of a staging request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Staged { evicted: Vec<String> },
    AlreadyStaged,
    /// Footprint exceeds the whole capacity
    TooLarge,
    Disabled,
}

impl StageOutcome {
    /// Whether the worker is staged after the request
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. } | Self::AlreadyStaged)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagingUsage {
    pub enabled: bool,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub percent: f64,
    pub staged: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WarmTier {
    config: StagingConfig,
    entries: HashMap<String, StagingEntry>,
    used_bytes: u64,
    clock: u64,
}

impl WarmTier {
    pub fn new(config: StagingConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            used_bytes: 0,
            clock: 0,
        }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn free_bytes(&self) -> u64 {
        self.config.capacity_bytes.saturating_sub(self.used_bytes)
    }

    pub fn is_staged(&self, worker: &str) -> bool {
        self.entries.contains_key(worker)
    }

    pub fn entry(&self, worker: &str) -> Option<&StagingEntry> {
        self.entries.get(worker)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Whether `worker` fits into the free space without evicting anything
    pub fn fits(&self, worker: &Worker) -> bool {
        self.config.enabled && footprint_for(&self.config, worker.class) <= self.free_bytes()
    }

    /// Record a dispatch against a staged worker
    pub fn touch(&mut self, worker: &str) {
        let seq = self.tick();
        if let Some(entry) = self.entries.get_mut(worker) {
            entry.last_access = Utc::now();
            entry.access_seq = seq;
        }
    }

    fn insert(&mut self, worker: &Worker, footprint: u64) {
        let seq = self.tick();
        self.entries.insert(
            worker.id.clone(),
            StagingEntry {
                worker: worker.id.clone(),
                footprint_bytes: footprint,
                last_access: Utc::now(),
                priority: worker.priority,
                access_seq: seq,
            },
        );
        self.used_bytes += footprint;
        info!(
            worker = %worker.id,
            footprint_bytes = footprint,
            used_bytes = self.used_bytes,
            "worker staged"
        );
    }

    /// Stage a worker, evicting least recently used entries if needed
    pub fn stage(&mut self, worker: &Worker) -> StageOutcome {
        if !self.config.enabled {
            return StageOutcome::Disabled;
        }
        if self.is_staged(&worker.id) {
            self.touch(&worker.id);
            return StageOutcome::AlreadyStaged;
        }
        let footprint = footprint_for(&self.config, worker.class);
        if footprint > self.config.capacity_bytes {
            debug!(worker = %worker.id, footprint, "worker larger than warm tier");
            return StageOutcome::TooLarge;
        }
        let evicted = if footprint > self.free_bytes() {
            self.evict_lru(footprint)
        } else {
            Vec::new()
        };
        self.insert(worker, footprint);
        StageOutcome::Staged { evicted }
    }

    /// Stage only if it fits as-is; never evicts
    pub fn stage_if_fits(&mut self, worker: &Worker) -> bool {
        if self.is_staged(&worker.id) {
            return true;
        }
        if !self.fits(worker) {
            return false;
        }
        let footprint = footprint_for(&self.config, worker.class);
        self.insert(worker, footprint);
        true
    }

    /// Evict oldest-accessed entries until `required` bytes are free
    pub fn evict_lru(&mut self, required: u64) -> Vec<String> {
        self.evict_until(|tier| tier.free_bytes() >= required)
    }

    fn evict_until(&mut self, done: impl Fn(&Self) -> bool) -> Vec<String> {
        let mut by_age: Vec<(u64, String)> = self
            .entries
            .values()
            .map(|e| (e.access_seq, e.worker.clone()))
            .collect();
        by_age.sort();

        let mut evicted = Vec::new();
        for (_, worker) in by_age {
            if done(self) {
                break;
            }
            if let Some(entry) = self.entries.remove(&worker) {
                self.used_bytes = self.used_bytes.saturating_sub(entry.footprint_bytes);
                info!(worker = %worker, freed_bytes = entry.footprint_bytes, "worker evicted");
                evicted.push(worker);
            }
        }
        evicted
    }

    /// Startup preload: lighter classes first, then by priority, stopping at
    /// the first worker that does not fit.
    pub fn preload<'a>(&mut self, candidates: impl IntoIterator<Item = &'a Worker>) -> Vec<String> {
        if !self.config.enabled {
            return Vec::new();
        }
        let mut ordered: Vec<&Worker> = candidates.into_iter().collect();
        ordered.sort_by_key(|w| (w.class.rank(), w.priority));

        let mut staged = Vec::new();
        for worker in ordered {
            if self.is_staged(&worker.id) {
                continue;
            }
            if !self.stage_if_fits(worker) {
                break;
            }
            staged.push(worker.id.clone());
        }
        staged
    }

    /// After an unstaged call: slow, high-priority workers that fit are staged
    pub fn should_stage_opportunistically(
        &self,
        worker: &Worker,
        latency_ms: u64,
        was_staged: bool,
    ) -> bool {
        !was_staged
            && latency_ms > self.config.opportunistic_threshold_ms
            && worker.priority <= self.config.opportunistic_max_priority
            && self.fits(worker)
    }

    /// Keep-alive hint for requests to `worker`
    pub fn keep_alive_for(&self, worker: &str) -> &'static str {
        if self.is_staged(worker) {
            STAGED_KEEP_ALIVE
        } else {
            DEFAULT_KEEP_ALIVE
        }
    }

    /// Change enablement and capacity; shrinking evicts down to the new size
    pub fn configure(&mut self, enabled: bool, capacity_bytes: u64) -> Vec<String> {
        self.config.enabled = enabled;
        self.config.capacity_bytes = capacity_bytes;
        if !enabled {
            let evicted = self.staged_ids();
            self.clear();
            return evicted;
        }
        let evicted = self.evict_until(|tier| tier.used_bytes <= capacity_bytes);
        info!(enabled, capacity_bytes, evicted = evicted.len(), "warm tier reconfigured");
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
        info!("warm tier cleared");
    }

    /// Staged ids ordered by catalog priority
    pub fn staged_ids(&self) -> Vec<String> {
        let mut entries: Vec<&StagingEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.worker.cmp(&b.worker)));
        entries.into_iter().map(|e| e.worker.clone()).collect()
    }

    pub fn usage(&self) -> StagingUsage {
        let percent = if self.config.capacity_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.config.capacity_bytes as f64 * 100.0
        };
        StagingUsage {
            enabled: self.config.enabled,
            used_bytes: self.used_bytes,
            capacity_bytes: self.config.capacity_bytes,
            percent,
            staged: self.staged_ids(),
        }
    }

    /// Preload candidates from a catalog, skipping workers `exclude` rejects
    pub fn preload_catalog(
        &mut self,
        catalog: &WorkerCatalog,
        exclude: impl Fn(&Worker) -> bool,
    ) -> Vec<String> {
        let candidates: Vec<&Worker> = catalog.workers().iter().filter(|w| !exclude(w)).collect();
        self.preload(candidates)
    }
}
