//! Task classification and worker selection
//!
//! Scores a prompt against every worker's declared expertise and picks the
//! subset of workers to dispatch to. Scoring is a pure function of the
//! catalog and the prompt, so classifying the same prompt twice always
//! yields the same verdict.
//!
//! # Selection strategy
//!
//! ```text
//! confidence > threshold  → top specialists (≤ 3) + generalists (≤ 2)
//! otherwise               → workers by priority, capped at max concurrency
//!                           (light workers only in speed mode)
//! nothing selected        → first 3 usable workers
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClassifierConfig, DispatchConfig};
use crate::registry::{ResourceClass, Worker, WorkerCatalog};
use crate::state::TaskClassification;

/// Workers used when selection comes up empty
const FALLBACK_TEAM_SIZE: usize = 3;

/// How the worker subset was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Confident classification; specialists plus generalists
    ExpertBased,
    /// Priority-ordered default team
    Balanced,
    /// Selection was empty; first usable workers
    Fallback,
    /// The caller named the workers
    Requested,
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpertBased => write!(f, "expert_based"),
            Self::Balanced => write!(f, "balanced"),
            Self::Fallback => write!(f, "fallback"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSelection {
    pub workers: Vec<String>,
    pub strategy: SelectionStrategy,
}

/// Case-insensitive substring hit, so "sorting" counts for `sort` and
/// symbols like `c++` survive intact.
fn mentions(prompt_lower: &str, term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    !needle.is_empty() && prompt_lower.contains(&needle)
}

/// Keyword-table classifier over the worker catalog
#[derive(Debug, Clone, Default)]
pub struct TaskClassifier {
    config: ClassifierConfig,
}

impl TaskClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Score of one worker for one of its declared domains
    fn domain_score(&self, worker: &Worker, domain: &str, prompt_lower: &str) -> f64 {
        let expertise = &worker.expertise;
        let hits = expertise
            .keywords
            .iter()
            .filter(|k| mentions(prompt_lower, k))
            .count() as f64;
        let mut score = hits * expertise.strength;
        if mentions(prompt_lower, domain) {
            score += expertise.strength * self.config.domain_match_weight;
        }
        score
    }

    /// Pick the domain with the highest summed score across workers
    pub fn classify(&self, prompt: &str, catalog: &WorkerCatalog) -> TaskClassification {
        let prompt_lower = prompt.to_lowercase();

        // (domain, [(worker, score)]) in first-seen order so ties are stable
        let mut table: Vec<(String, Vec<(String, f64)>)> = Vec::new();
        for worker in catalog.workers() {
            for domain in &worker.expertise.domains {
                let score = self.domain_score(worker, domain, &prompt_lower);
                let idx = match table.iter().position(|(d, _)| d == domain) {
                    Some(idx) => idx,
                    None => {
                        table.push((domain.clone(), Vec::new()));
                        table.len() - 1
                    }
                };
                if score > 0.0 {
                    table[idx].1.push((worker.id.clone(), score));
                }
            }
        }

        let mut best: Option<(&str, f64, &Vec<(String, f64)>)> = None;
        for (domain, scores) in &table {
            let total: f64 = scores.iter().map(|(_, s)| s).sum();
            if total > best.map_or(0.0, |(_, t, _)| t) {
                best = Some((domain, total, scores));
            }
        }

        let Some((domain, total, scores)) = best else {
            debug!("no expertise matched; classified as general");
            return TaskClassification::general();
        };

        let mut ranked = scores.clone();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let confidence = (total / self.config.normalization.max(f64::EPSILON)).min(1.0);
        debug!(domain, confidence, "classified prompt");

        TaskClassification {
            domain: domain.to_string(),
            confidence,
            ranked_workers: ranked.into_iter().map(|(w, _)| w).collect(),
        }
    }

    fn is_generalist(&self, worker: &Worker) -> bool {
        self.config
            .generalist_domains
            .iter()
            .any(|d| worker.expertise.covers(d))
    }

    /// Choose the team for a classified prompt from the usable workers.
    ///
    /// `usable` must be in catalog order.
    pub fn select_workers(
        &self,
        classification: &TaskClassification,
        usable: &[&Worker],
        dispatch: &DispatchConfig,
    ) -> WorkerSelection {
        let is_usable = |id: &str| usable.iter().any(|w| w.id == id);

        let (mut workers, strategy) = if classification.confidence
            > self.config.confidence_threshold
        {
            let experts: Vec<String> = classification
                .ranked_workers
                .iter()
                .filter(|id| is_usable(id.as_str()))
                .take(self.config.max_specialists)
                .cloned()
                .collect();
            let generalists: Vec<String> = usable
                .iter()
                .filter(|w| !experts.contains(&w.id) && self.is_generalist(w))
                .take(self.config.max_generalists)
                .map(|w| w.id.clone())
                .collect();
            let mut team = experts;
            team.extend(generalists);
            team.truncate(self.config.max_team_size);
            (team, SelectionStrategy::ExpertBased)
        } else {
            let mut by_priority: Vec<&Worker> = usable.to_vec();
            by_priority.sort_by_key(|w| w.priority);
            let team = by_priority
                .into_iter()
                .filter(|w| !dispatch.prioritize_speed || w.class == ResourceClass::Light)
                .take(dispatch.max_concurrency.max(1))
                .map(|w| w.id.clone())
                .collect();
            (team, SelectionStrategy::Balanced)
        };

        if workers.is_empty() {
            workers = usable
                .iter()
                .take(FALLBACK_TEAM_SIZE)
                .map(|w| w.id.clone())
                .collect();
            return WorkerSelection {
                workers,
                strategy: SelectionStrategy::Fallback,
            };
        }

        WorkerSelection { workers, strategy }
    }
}
