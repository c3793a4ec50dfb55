//! Peer critique parsing and sentiment scoring.
//!
//! Reviewers are asked to answer in three sections (strengths, weaknesses,
//! suggestions). [`PeerCritique::parse`] recovers those sections when the
//! reviewer followed the format and keeps the raw text either way.
//! [`collaboration_score`] turns a candidate's critiques into a bounded
//! bonus by counting positive and negative indicator words.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::router::prompts::{STRENGTHS_HEADER, SUGGESTIONS_HEADER, WEAKNESSES_HEADER};
use crate::state::PeerReview;

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*\**\s*(STRENGTHS|WEAKNESSES|SUGGESTIONS)\s*\**\s*:")
        .expect("SECTION_HEADER regex should compile")
});
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+").expect("WORD regex should compile"));

/// Upper bound on a candidate's collaboration score
pub const MAX_COLLABORATION_SCORE: f64 = 5.0;

/// Weight of each net positive indicator
const SENTIMENT_WEIGHT: f64 = 0.5;

const POSITIVE_TERMS: &[&str] = &[
    "good",
    "excellent",
    "clear",
    "complete",
    "useful",
    "precise",
    "correct",
];
const NEGATIVE_TERMS: &[&str] = &[
    "bad",
    "incomplete",
    "confusing",
    "incorrect",
    "vague",
    "superficial",
];

/// A critique split into its sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerCritique {
    pub reviewer: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub raw: String,
}

fn items(section: &str) -> Vec<String> {
    section
        .lines()
        .flat_map(|line| line.split(';'))
        .map(|item| {
            item.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

impl PeerCritique {
    pub fn parse(review: &PeerReview) -> Self {
        let mut critique = Self {
            reviewer: review.reviewer.clone(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            suggestions: Vec::new(),
            raw: review.text.clone(),
        };

        let headers: Vec<(usize, usize, String)> = SECTION_HEADER
            .captures_iter(&review.text)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                let name = cap.get(1)?.as_str().to_uppercase();
                Some((whole.start(), whole.end(), name))
            })
            .collect();

        for (i, (_, body_start, name)) in headers.iter().enumerate() {
            let body_end = headers
                .get(i + 1)
                .map_or(review.text.len(), |(next_start, _, _)| *next_start);
            let body = items(&review.text[*body_start..body_end]);
            match format!("{}:", name).as_str() {
                STRENGTHS_HEADER => critique.strengths.extend(body),
                WEAKNESSES_HEADER => critique.weaknesses.extend(body),
                SUGGESTIONS_HEADER => critique.suggestions.extend(body),
                _ => {}
            }
        }
        critique
    }

    /// Whether the reviewer used the requested sections
    pub fn is_structured(&self) -> bool {
        !(self.strengths.is_empty() && self.weaknesses.is_empty() && self.suggestions.is_empty())
    }

    /// Net positive minus negative indicator words
    pub fn sentiment(&self) -> i32 {
        let text = self.raw.to_lowercase();
        let words: Vec<&str> = WORD.find_iter(&text).map(|m| m.as_str()).collect();
        let count = |terms: &[&str]| terms.iter().filter(|t| words.contains(t)).count() as i32;
        count(POSITIVE_TERMS) - count(NEGATIVE_TERMS)
    }

    /// Compact form for the refinement prompt
    pub fn to_feedback(&self) -> String {
        if !self.is_structured() {
            return format!("From {}:\n{}", self.reviewer, self.raw.trim());
        }
        let mut out = format!("From {}:\n", self.reviewer);
        for (label, list) in [
            (STRENGTHS_HEADER, &self.strengths),
            (WEAKNESSES_HEADER, &self.weaknesses),
            (SUGGESTIONS_HEADER, &self.suggestions),
        ] {
            if list.is_empty() {
                continue;
            }
            out.push_str(label);
            out.push('\n');
            for item in list {
                out.push_str(&format!("- {}\n", item));
            }
        }
        out.trim_end().to_string()
    }
}

/// Bounded bonus from peer critiques: each critique adds
/// `0.5 × (positive − negative)`, the total clamped to `[0, 5]`.
pub fn collaboration_score(critiques: &[PeerCritique]) -> f64 {
    if critiques.is_empty() {
        return 0.0;
    }
    let total: f64 = critiques
        .iter()
        .map(|c| f64::from(c.sentiment()) * SENTIMENT_WEIGHT)
        .sum();
    total.clamp(0.0, MAX_COLLABORATION_SCORE)
}
