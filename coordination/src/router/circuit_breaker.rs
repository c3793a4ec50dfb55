//! Per-worker health tracking: quarantine and blacklist.
//!
//! Every failed call increments a worker's failure counter. Below the
//! threshold the worker is *quarantined* for a fixed window and becomes
//! usable again once the window elapses. Reaching the threshold moves the
//! worker to the *blacklist*, which only an operator reset or
//! [`HealthMonitor::rehabilitate`] clears.
//!
//! ```text
//!   healthy ──fail──▶ quarantined ──window elapsed──▶ healthy
//!      ▲                  │
//!      └────success───────┤
//!                         └──fail × threshold──▶ blacklisted ──reset──▶ healthy
//! ```
//!
//! The monitor is pure bookkeeping. Every time-dependent method has an
//! `_at(now)` form so tests can drive the clock; the probe itself lives in
//! [`super::probe`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub use crate::config::HealthPolicy;

/// Health bookkeeping for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthRecord {
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Set while quarantined; the worker is usable again at this instant.
    pub quarantine_until: Option<DateTime<Utc>>,
    pub blacklisted: bool,
    pub last_probe: Option<DateTime<Utc>>,
}

impl HealthRecord {
    pub fn is_quarantined_at(&self, now: DateTime<Utc>) -> bool {
        self.quarantine_until.is_some_and(|until| now < until)
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.blacklisted && !self.is_quarantined_at(now)
    }
}

/// What a recorded failure did to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    Quarantined {
        until: DateTime<Utc>,
        failures: u32,
    },
    Blacklisted {
        failures: u32,
    },
}

/// Snapshot of health across all tracked workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub blacklisted: Vec<String>,
    pub quarantined: Vec<String>,
    pub failure_counts: BTreeMap<String, u32>,
}

fn chrono_window(ms: u64) -> ChronoDuration {
    ChronoDuration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// Quarantine/blacklist state for every worker the engine has called.
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    records: HashMap<String, HealthRecord>,
    policy: HealthPolicy,
}

impl HealthMonitor {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            records: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn record(&self, worker: &str) -> Option<&HealthRecord> {
        self.records.get(worker)
    }

    pub fn failure_count(&self, worker: &str) -> u32 {
        self.records.get(worker).map_or(0, |r| r.failure_count)
    }

    pub fn is_blacklisted(&self, worker: &str) -> bool {
        self.records.get(worker).is_some_and(|r| r.blacklisted)
    }

    pub fn is_usable(&self, worker: &str) -> bool {
        self.is_usable_at(worker, Utc::now())
    }

    /// Not blacklisted, and either never quarantined or past the window.
    pub fn is_usable_at(&self, worker: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(worker)
            .map_or(true, |r| r.is_usable_at(now))
    }

    pub fn record_failure(&mut self, worker: &str, error: &str) -> FailureVerdict {
        self.record_failure_at(worker, error, Utc::now())
    }

    pub fn record_failure_at(
        &mut self,
        worker: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> FailureVerdict {
        let threshold = self.policy.failure_threshold.max(1);
        let window = chrono_window(self.policy.quarantine_ms);
        let record = self.records.entry(worker.to_string()).or_default();
        record.failure_count += 1;
        record.last_failure = Some(now);
        record.last_error = Some(error.to_string());

        if record.failure_count >= threshold {
            record.blacklisted = true;
            record.quarantine_until = None;
            warn!(
                worker,
                failures = record.failure_count,
                error,
                "worker blacklisted"
            );
            FailureVerdict::Blacklisted {
                failures: record.failure_count,
            }
        } else {
            let until = now + window;
            record.quarantine_until = Some(until);
            warn!(
                worker,
                failures = record.failure_count,
                threshold,
                error,
                "worker quarantined"
            );
            FailureVerdict::Quarantined {
                until,
                failures: record.failure_count,
            }
        }
    }

    /// A successful call clears the failure counter and any quarantine.
    pub fn record_success(&mut self, worker: &str) {
        if let Some(record) = self.records.get_mut(worker) {
            record.failure_count = 0;
            record.last_error = None;
            record.quarantine_until = None;
        }
    }

    /// Drop quarantines whose window has elapsed.
    pub fn sweep_at(&mut self, now: DateTime<Utc>) {
        for (worker, record) in self.records.iter_mut() {
            if record.quarantine_until.is_some_and(|until| now >= until) {
                record.quarantine_until = None;
                info!(worker = %worker, "quarantine expired");
            }
        }
    }

    /// Blacklist a worker known to be broken, without probing it.
    pub fn fast_fail(&mut self, worker: &str) {
        let record = self.records.entry(worker.to_string()).or_default();
        record.blacklisted = true;
        record.quarantine_until = None;
        info!(worker, "known-bad worker blacklisted without probe");
    }

    pub fn is_known_bad(&self, worker: &str) -> bool {
        self.policy.known_bad.iter().any(|w| w == worker)
    }

    /// At most one probe per worker per probe interval.
    pub fn should_probe_at(&self, worker: &str, now: DateTime<Utc>) -> bool {
        match self.records.get(worker).and_then(|r| r.last_probe) {
            Some(last) => now - last >= chrono_window(self.policy.probe_interval_ms),
            None => true,
        }
    }

    pub fn mark_probed_at(&mut self, worker: &str, now: DateTime<Utc>) {
        self.records.entry(worker.to_string()).or_default().last_probe = Some(now);
    }

    /// Operator recovery: forget every failure, quarantine and blacklist.
    pub fn reset(&mut self) {
        let cleared = self.records.len();
        self.records.clear();
        info!(cleared, "health state reset");
    }

    /// Clear one worker's failures. Returns true if it was excluded.
    pub fn rehabilitate(&mut self, worker: &str) -> bool {
        self.rehabilitate_at(worker, Utc::now())
    }

    pub fn rehabilitate_at(&mut self, worker: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get_mut(worker) else {
            return false;
        };
        let was_excluded = record.blacklisted || record.is_quarantined_at(now);
        record.blacklisted = false;
        record.quarantine_until = None;
        record.failure_count = 0;
        record.last_failure = None;
        record.last_error = None;
        if was_excluded {
            info!(worker, "worker rehabilitated");
        }
        was_excluded
    }

    pub fn summary(&self) -> HealthSummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for (worker, record) in &self.records {
            if record.blacklisted {
                summary.blacklisted.push(worker.clone());
            } else if record.is_quarantined_at(now) {
                summary.quarantined.push(worker.clone());
            }
            if record.failure_count > 0 {
                summary
                    .failure_counts
                    .insert(worker.clone(), record.failure_count);
            }
        }
        summary.blacklisted.sort();
        summary.quarantined.sort();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthPolicy::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_unknown_worker_is_usable() {
        let m = monitor();
        assert!(m.is_usable_at("llama3:latest", t0()));
        assert_eq!(m.failure_count("llama3:latest"), 0);
    }

    #[test]
    fn test_failure_quarantines_until_window_elapses() {
        let mut m = monitor();
        let verdict = m.record_failure_at("phi3:latest", "timeout", t0());
        let window = ChronoDuration::minutes(5);
        assert_eq!(
            verdict,
            FailureVerdict::Quarantined {
                until: t0() + window,
                failures: 1
            }
        );
        assert!(!m.is_usable_at("phi3:latest", t0()));
        assert!(!m.is_usable_at("phi3:latest", t0() + window - ChronoDuration::milliseconds(1)));
        assert!(m.is_usable_at("phi3:latest", t0() + window));
    }

    #[test]
    fn test_threshold_blacklists_without_time_recovery() {
        let mut m = monitor();
        m.record_failure_at("qwen:14b", "status 500", t0());
        m.record_failure_at("qwen:14b", "status 500", t0());
        let verdict = m.record_failure_at("qwen:14b", "status 500", t0());
        assert_eq!(verdict, FailureVerdict::Blacklisted { failures: 3 });
        let much_later = t0() + ChronoDuration::days(30);
        assert!(!m.is_usable_at("qwen:14b", much_later));
        assert!(m.record("qwen:14b").unwrap().quarantine_until.is_none());
    }

    #[test]
    fn test_success_clears_failures_and_quarantine() {
        let mut m = monitor();
        m.record_failure_at("mistral:latest", "refused", t0());
        m.record_failure_at("mistral:latest", "refused", t0());
        m.record_success("mistral:latest");
        assert_eq!(m.failure_count("mistral:latest"), 0);
        assert!(m.is_usable_at("mistral:latest", t0()));
        // counter restarted, so one more failure only quarantines
        let verdict = m.record_failure_at("mistral:latest", "refused", t0());
        assert!(matches!(verdict, FailureVerdict::Quarantined { failures: 1, .. }));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut m = monitor();
        for _ in 0..3 {
            m.record_failure_at("a", "x", t0());
        }
        m.record_failure_at("b", "x", t0());
        m.reset();
        assert!(m.is_usable_at("a", t0()));
        assert!(m.is_usable_at("b", t0()));
        assert_eq!(m.summary_at(t0()), HealthSummary::default());
    }

    #[test]
    fn test_rehabilitate_reports_exclusion() {
        let mut m = monitor();
        assert!(!m.rehabilitate_at("a", t0()));
        for _ in 0..3 {
            m.record_failure_at("a", "x", t0());
        }
        assert!(m.rehabilitate_at("a", t0()));
        assert!(m.is_usable_at("a", t0()));
        assert!(!m.rehabilitate_at("a", t0()));
    }

    #[test]
    fn test_sweep_drops_expired_quarantine() {
        let mut m = monitor();
        m.record_failure_at("a", "x", t0());
        m.sweep_at(t0() + ChronoDuration::minutes(4));
        assert!(m.record("a").unwrap().quarantine_until.is_some());
        m.sweep_at(t0() + ChronoDuration::minutes(5));
        assert!(m.record("a").unwrap().quarantine_until.is_none());
        assert_eq!(m.failure_count("a"), 1);
    }

    #[test]
    fn test_probe_rate_limit() {
        let mut m = monitor();
        assert!(m.should_probe_at("a", t0()));
        m.mark_probed_at("a", t0());
        assert!(!m.should_probe_at("a", t0() + ChronoDuration::minutes(4)));
        assert!(m.should_probe_at("a", t0() + ChronoDuration::minutes(5)));
    }

    #[test]
    fn test_fast_fail_and_summary() {
        let mut m = HealthMonitor::new(HealthPolicy {
            known_bad: vec!["broken:7b".into()],
            ..HealthPolicy::default()
        });
        assert!(m.is_known_bad("broken:7b"));
        m.fast_fail("broken:7b");
        m.record_failure_at("phi3:latest", "x", t0());
        let summary = m.summary_at(t0());
        assert_eq!(summary.blacklisted, vec!["broken:7b".to_string()]);
        assert_eq!(summary.quarantined, vec!["phi3:latest".to_string()]);
        assert_eq!(summary.failure_counts.get("phi3:latest"), Some(&1));
    }
}
