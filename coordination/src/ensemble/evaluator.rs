//! Multi-criterion response evaluator
//!
//! Scores each candidate on seven independent, individually capped
//! criteria:
//!
//! ```text
//! relevance        0..25   prompt words present (+5 when expertise matches domain)
//! completeness     0..28   length bands, +3 for multi-sentence answers
//! coherence       12..25   −8 for repeated sentences, +1 per connective (≤ 5)
//! specificity      0..    15 − 2 × hedges + precise phrases
//! utility          0..15   2 × actionable terms
//! originality      0..10   low overlap with siblings
//! complementarity  0..10   topics no sibling mentions
//! ```
//!
//! The evaluation score is the capped, rounded sum. The final score adds
//! the peer-review collaboration score and a diversity bonus for highly
//! original answers.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::registry::WorkerCatalog;
use crate::state::{Candidate, ScoreBreakdown, TaskClassification};

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("SENTENCE_SPLIT regex should compile"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("NON_WORD regex should compile"));

/// Originality above this earns the diversity bonus
const ORIGINALITY_BONUS_THRESHOLD: f64 = 7.0;

fn owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

/// Word lists the heuristics count against
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    pub connectors: Vec<String>,
    pub generic_phrases: Vec<String>,
    pub specific_phrases: Vec<String>,
    pub utility_terms: Vec<String>,
    pub topic_stopwords: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            connectors: owned(&[
                "because",
                "therefore",
                "however",
                "moreover",
                "for example",
                "in conclusion",
            ]),
            generic_phrases: owned(&[
                "in general",
                "normally",
                "usually",
                "typically",
                "generally",
                "tends to",
                "often",
            ]),
            specific_phrases: owned(&[
                "specifically",
                "exactly",
                "precisely",
                "concretely",
                "in particular",
            ]),
            utility_terms: owned(&[
                "example",
                "steps",
                "how to",
                "method",
                "process",
                "solution",
                "implement",
                "apply",
            ]),
            topic_stopwords: owned(&[
                "about", "could", "would", "should", "where", "which", "there", "their", "these",
                "those", "while", "since", "until", "during", "other",
            ]),
        }
    }
}

fn count_present(text: &str, terms: &[String]) -> usize {
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}

fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lower-cased words longer than `min_len` characters
pub fn word_set(text: &str, min_len: usize) -> HashSet<String> {
    NON_WORD
        .split(&text.to_lowercase())
        .filter(|w| w.chars().count() > min_len)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two word sets; 0 when both are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone)]
pub struct ResponseEvaluator {
    lexicon: Lexicon,
    diversity_bonus: f64,
}

impl Default for ResponseEvaluator {
    fn default() -> Self {
        Self::new(Lexicon::default(), 0.1)
    }
}

impl ResponseEvaluator {
    pub fn new(lexicon: Lexicon, diversity_bonus: f64) -> Self {
        Self {
            lexicon,
            diversity_bonus,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Up to ten distinct topic words (longer than four characters)
    pub fn topics(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        NON_WORD
            .split(&text.to_lowercase())
            .filter(|w| w.chars().count() > 4)
            .filter(|w| !self.lexicon.topic_stopwords.iter().any(|s| s == w))
            .filter(|w| seen.insert(w.to_string()))
            .take(10)
            .map(str::to_string)
            .collect()
    }

    fn relevance(&self, text: &str, prompt: &str, expertise_match: bool) -> f64 {
        let prompt_words: Vec<String> = prompt
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| w.chars().count() > 3)
            .collect();
        let matches = prompt_words.iter().filter(|w| text.contains(w.as_str())).count();
        let mut score = matches as f64 / prompt_words.len().max(1) as f64 * 20.0;
        if expertise_match {
            score += 5.0;
        }
        score
    }

    fn completeness(&self, raw: &str) -> f64 {
        let mut score: f64 = match raw.chars().count() {
            0..=49 => 0.0,
            50..=199 => 10.0,
            200..=499 => 20.0,
            500..=999 => 25.0,
            _ => 15.0,
        };
        if sentences(raw).len() > 3 {
            score += 3.0;
        }
        score
    }

    fn coherence(&self, raw: &str, text: &str) -> f64 {
        let mut score = 20.0;
        let all = sentences(raw);
        let unique: HashSet<String> = all.iter().map(|s| s.to_lowercase()).collect();
        if (unique.len() as f64) < all.len() as f64 * 0.8 {
            score -= 8.0;
        }
        score += count_present(text, &self.lexicon.connectors).min(5) as f64;
        score
    }

    fn specificity(&self, text: &str) -> f64 {
        let generic = count_present(text, &self.lexicon.generic_phrases) as f64;
        let specific = count_present(text, &self.lexicon.specific_phrases) as f64;
        (15.0 - generic * 2.0 + specific).max(0.0)
    }

    fn utility(&self, text: &str) -> f64 {
        (count_present(text, &self.lexicon.utility_terms) as f64 * 2.0).min(15.0)
    }

    fn originality(&self, candidate: &Candidate, text: &str, all: &[Candidate]) -> f64 {
        if all.len() < 2 {
            return 5.0;
        }
        let own: HashSet<&str> = text.split(' ').filter(|w| w.chars().count() > 3).collect();
        let mut score: f64 = 5.0;
        for other in all.iter().filter(|o| o.worker != candidate.worker) {
            let other_text = other.text.to_lowercase();
            let theirs: HashSet<&str> = other_text
                .split(' ')
                .filter(|w| w.chars().count() > 3)
                .collect();
            let similarity = own.intersection(&theirs).count() as f64 / own.len().max(1) as f64;
            if similarity > 0.7 {
                score -= 2.0;
            } else if similarity < 0.3 {
                score += 1.0;
            }
        }
        score.clamp(0.0, 10.0)
    }

    fn complementarity(&self, candidate: &Candidate, all: &[Candidate]) -> f64 {
        if all.len() < 2 {
            return 5.0;
        }
        let others: HashSet<String> = all
            .iter()
            .filter(|o| o.worker != candidate.worker)
            .flat_map(|o| self.topics(&o.text))
            .collect();
        let unique = self
            .topics(&candidate.text)
            .into_iter()
            .filter(|t| !others.contains(t))
            .count();
        (unique as f64 * 2.0).min(10.0)
    }

    /// Score one candidate against the prompt and its siblings
    pub fn score(
        &self,
        candidate: &Candidate,
        prompt: &str,
        all: &[Candidate],
        classification: &TaskClassification,
        catalog: &WorkerCatalog,
    ) -> ScoreBreakdown {
        let text = candidate.text.to_lowercase();
        let expertise_match = catalog
            .get(&candidate.worker)
            .is_some_and(|w| w.expertise.covers(&classification.domain));
        ScoreBreakdown {
            relevance: self.relevance(&text, prompt, expertise_match),
            completeness: self.completeness(&candidate.text),
            coherence: self.coherence(&candidate.text, &text),
            specificity: self.specificity(&text),
            utility: self.utility(&text),
            originality: self.originality(candidate, &text, all),
            complementarity: self.complementarity(candidate, all),
        }
    }

    /// Score every candidate in place, each against the full set
    pub fn evaluate_all(
        &self,
        candidates: &mut [Candidate],
        prompt: &str,
        classification: &TaskClassification,
        catalog: &WorkerCatalog,
    ) {
        let snapshot = candidates.to_vec();
        for candidate in candidates.iter_mut() {
            self.evaluate(candidate, prompt, &snapshot, classification, catalog);
        }
    }

    /// Score one candidate and store the breakdown on it
    pub fn evaluate(
        &self,
        candidate: &mut Candidate,
        prompt: &str,
        all: &[Candidate],
        classification: &TaskClassification,
        catalog: &WorkerCatalog,
    ) {
        let scores = self.score(candidate, prompt, all, classification, catalog);
        candidate.scores = scores;
        candidate.evaluation_score = scores.total().round();
    }

    /// Final score: evaluation + collaboration + diversity bonus
    pub fn finalize(&self, candidate: &mut Candidate) {
        let mut score = candidate.evaluation_score + candidate.collaboration_score.unwrap_or(0.0);
        if candidate.scores.originality > ORIGINALITY_BONUS_THRESHOLD {
            score += self.diversity_bonus * 10.0;
        }
        candidate.final_score = score;
    }

    /// Stable sort by descending final score; ties go to the lower priority
    pub fn rank(candidates: &mut [Candidate], catalog: &WorkerCatalog) {
        candidates.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| catalog.priority_of(&a.worker).cmp(&catalog.priority_of(&b.worker)))
        });
    }
}
