//! Team intelligence: what the engine learns across runs.
//!
//! Every completed run appends a [`SessionRecord`] to a bounded history and
//! folds its scores into per-worker performance and running collaboration
//! averages. [`TeamIntelligence::insights`] turns the history into operator
//! hints once enough runs have been seen.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{consensus_strength, diversity_index};
use crate::state::{Candidate, ConsensusMethod, RunResult};

/// Sessions kept in the history
pub const MAX_SESSION_HISTORY: usize = 50;

/// Sessions needed before insights are produced
pub const MIN_SESSIONS_FOR_INSIGHTS: usize = 5;

/// Sessions at which insight confidence saturates
const FULL_CONFIDENCE_SESSIONS: f64 = 20.0;

/// Confidence reported while there is too little data
const LOW_DATA_CONFIDENCE: f64 = 0.1;

const HIGH_DIVERSITY: f64 = 0.7;
const LOW_DIVERSITY: f64 = 0.3;
const HIGH_SUCCESS_RATE: f64 = 0.8;

/// `(avg × (n − 1) + value) / n`, or `value` for the first sample
fn running_average(avg: f64, value: f64, count: u32) -> f64 {
    if count <= 1 {
        return value;
    }
    let n = f64::from(count);
    (avg * (n - 1.0) + value) / n
}

/// One completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    /// Workers in ranked order
    pub workers: Vec<String>,
    /// Final scores, aligned with `workers`
    pub scores: Vec<f64>,
    pub method: ConsensusMethod,
    pub peer_review: bool,
    /// Highest refinement iteration reached
    pub iterations: u32,
}

impl SessionRecord {
    fn mean_score(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainPerformance {
    pub count: u32,
    pub average_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerPerformance {
    pub sessions: u32,
    pub average_score: f64,
    pub best_score: f64,
    pub domains: BTreeMap<String, DomainPerformance>,
}

impl WorkerPerformance {
    fn record(&mut self, domain: &str, score: f64) {
        self.sessions += 1;
        self.average_score = running_average(self.average_score, score, self.sessions);
        self.best_score = self.best_score.max(score);
        let entry = self.domains.entry(domain.to_string()).or_default();
        entry.count += 1;
        entry.average_score = running_average(entry.average_score, score, entry.count);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub total_sessions: u32,
    /// Runs whose consensus came from synthesis
    pub successful_iterations: u32,
    pub avg_consensus_strength: f64,
    pub avg_diversity_index: f64,
}

impl TeamMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_sessions == 0 {
            return 0.0;
        }
        f64::from(self.successful_iterations) / f64::from(self.total_sessions)
    }
}

/// Best-scoring worker for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainLeader {
    pub domain: String,
    pub worker: String,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInsights {
    pub insights: Vec<String>,
    pub leaders: Vec<DomainLeader>,
    /// 0.1 below the session minimum, else `min(sessions / 20, 1)`
    pub confidence: f64,
    /// Absent below the session minimum
    pub metrics: Option<TeamMetrics>,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamIntelligence {
    history: VecDeque<SessionRecord>,
    workers: BTreeMap<String, WorkerPerformance>,
    metrics: TeamMetrics,
}

impl TeamIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> impl Iterator<Item = &SessionRecord> {
        self.history.iter()
    }

    pub fn session_count(&self) -> usize {
        self.history.len()
    }

    pub fn worker(&self, id: &str) -> Option<&WorkerPerformance> {
        self.workers.get(id)
    }

    pub fn metrics(&self) -> TeamMetrics {
        self.metrics
    }

    /// Fold a completed run into the history and running averages
    pub fn record_run(&mut self, result: &RunResult, peer_review: bool) {
        self.record(
            &result.stats.classification.domain,
            &result.candidates,
            result.consensus.method,
            peer_review,
        );
    }

    pub fn record(
        &mut self,
        domain: &str,
        ranked: &[Candidate],
        method: ConsensusMethod,
        peer_review: bool,
    ) {
        self.history.push_back(SessionRecord {
            timestamp: Utc::now(),
            domain: domain.to_string(),
            workers: ranked.iter().map(|c| c.worker.clone()).collect(),
            scores: ranked.iter().map(|c| c.final_score).collect(),
            method,
            peer_review,
            iterations: ranked.iter().map(|c| c.iteration).max().unwrap_or(0),
        });
        while self.history.len() > MAX_SESSION_HISTORY {
            self.history.pop_front();
        }

        for candidate in ranked {
            self.workers
                .entry(candidate.worker.clone())
                .or_default()
                .record(domain, candidate.final_score);
        }

        let m = &mut self.metrics;
        m.total_sessions += 1;
        if method == ConsensusMethod::AiSynthesis {
            m.successful_iterations += 1;
        }
        m.avg_consensus_strength = running_average(
            m.avg_consensus_strength,
            consensus_strength(ranked),
            m.total_sessions,
        );
        m.avg_diversity_index =
            running_average(m.avg_diversity_index, diversity_index(ranked), m.total_sessions);
    }

    /// Best worker per domain from the session history
    pub fn domain_leaders(&self) -> Vec<DomainLeader> {
        // domain → worker → (total, count)
        let mut table: BTreeMap<&str, BTreeMap<&str, (f64, u32)>> = BTreeMap::new();
        for session in &self.history {
            let per_worker = table.entry(session.domain.as_str()).or_default();
            for (worker, score) in session.workers.iter().zip(&session.scores) {
                let slot = per_worker.entry(worker.as_str()).or_insert((0.0, 0));
                slot.0 += score;
                slot.1 += 1;
            }
        }

        table
            .into_iter()
            .filter_map(|(domain, workers)| {
                workers
                    .into_iter()
                    .map(|(worker, (total, count))| (worker, total / f64::from(count)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(worker, average_score)| DomainLeader {
                        domain: domain.to_string(),
                        worker: worker.to_string(),
                        average_score,
                    })
            })
            .collect()
    }

    pub fn insights(&self) -> TeamInsights {
        let sessions = self.history.len();
        if sessions < MIN_SESSIONS_FOR_INSIGHTS {
            return TeamInsights {
                insights: vec![format!(
                    "Need at least {} sessions for reliable insights ({} so far)",
                    MIN_SESSIONS_FOR_INSIGHTS, sessions
                )],
                leaders: Vec::new(),
                confidence: LOW_DATA_CONFIDENCE,
                metrics: None,
                success_rate: None,
            };
        }

        let leaders = self.domain_leaders();
        let mut insights: Vec<String> = leaders
            .iter()
            .map(|l| {
                format!(
                    "For \"{}\" tasks: {} is the most effective (average score {:.1})",
                    l.domain, l.worker, l.average_score
                )
            })
            .collect();

        if self.metrics.avg_diversity_index > HIGH_DIVERSITY {
            insights.push("The team keeps a good diversity of perspectives".to_string());
        } else if self.metrics.avg_diversity_index < LOW_DIVERSITY {
            insights.push(
                "Workers tend to give very similar answers; consider adjusting the selection"
                    .to_string(),
            );
        }

        let success_rate = self.metrics.success_rate();
        if success_rate > HIGH_SUCCESS_RATE {
            insights.push("Iterative refinement is working very well".to_string());
        }

        TeamInsights {
            insights,
            leaders,
            confidence: (sessions as f64 / FULL_CONFIDENCE_SESSIONS).min(1.0),
            metrics: Some(self.metrics),
            success_rate: Some(success_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(worker: &str, text: &str, score: f64) -> Candidate {
        let mut c = Candidate::success(worker, text, 1);
        c.final_score = score;
        c
    }

    fn run(intel: &mut TeamIntelligence, domain: &str, method: ConsensusMethod) {
        intel.record(
            domain,
            &[
                candidate("coder", "sorting arrays quickly", 80.0),
                candidate("chat", "weather today sunny", 60.0),
            ],
            method,
            true,
        );
    }

    #[test]
    fn test_running_average() {
        assert_eq!(running_average(0.0, 7.0, 1), 7.0);
        assert_eq!(running_average(7.0, 9.0, 2), 8.0);
        assert_eq!(running_average(8.0, 2.0, 3), 6.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut intel = TeamIntelligence::new();
        for _ in 0..(MAX_SESSION_HISTORY + 5) {
            run(&mut intel, "programming", ConsensusMethod::AiSynthesis);
        }
        assert_eq!(intel.session_count(), MAX_SESSION_HISTORY);
        assert_eq!(intel.metrics().total_sessions, (MAX_SESSION_HISTORY + 5) as u32);
    }

    #[test]
    fn test_worker_performance() {
        let mut intel = TeamIntelligence::new();
        intel.record("math", &[candidate("coder", "x", 40.0)], ConsensusMethod::SingleBest, false);
        intel.record("math", &[candidate("coder", "x", 60.0)], ConsensusMethod::SingleBest, false);
        let perf = intel.worker("coder").unwrap();
        assert_eq!(perf.sessions, 2);
        assert_eq!(perf.average_score, 50.0);
        assert_eq!(perf.best_score, 60.0);
        assert_eq!(perf.domains["math"].count, 2);
    }

    #[test]
    fn test_insights_need_enough_sessions() {
        let mut intel = TeamIntelligence::new();
        for _ in 0..4 {
            run(&mut intel, "programming", ConsensusMethod::AiSynthesis);
        }
        let early = intel.insights();
        assert_eq!(early.confidence, LOW_DATA_CONFIDENCE);
        assert!(early.metrics.is_none());

        run(&mut intel, "programming", ConsensusMethod::AiSynthesis);
        let insights = intel.insights();
        assert_eq!(insights.confidence, 5.0 / 20.0);
        assert_eq!(insights.leaders.len(), 1);
        assert_eq!(insights.leaders[0].worker, "coder");
        assert_eq!(insights.success_rate, Some(1.0));
        // disjoint answers every time
        assert!(insights.insights.iter().any(|i| i.contains("diversity")));
        assert!(insights.insights.iter().any(|i| i.contains("refinement")));
    }

    #[test]
    fn test_fallback_runs_lower_success_rate() {
        let mut intel = TeamIntelligence::new();
        for _ in 0..3 {
            run(&mut intel, "general", ConsensusMethod::AiSynthesis);
        }
        for _ in 0..2 {
            run(&mut intel, "general", ConsensusMethod::BestFallback);
        }
        assert!((intel.metrics().success_rate() - 0.6).abs() < 1e-9);
        assert!(!intel
            .insights()
            .insights
            .iter()
            .any(|i| i.contains("refinement")));
    }
}
