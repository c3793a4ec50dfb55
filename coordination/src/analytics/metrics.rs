//! Per-run collaboration metrics.
//!
//! Pure functions over the ranked candidates of one run.

use crate::ensemble::evaluator::{jaccard, word_set};
use crate::state::Candidate;

/// Words of this length or shorter are ignored when comparing answers
const DIVERSITY_MIN_WORD_LEN: usize = 3;

/// Mean pairwise lexical distance (`1 − Jaccard`) between answers.
///
/// 0 for fewer than two candidates.
pub fn diversity_index(candidates: &[Candidate]) -> f64 {
    if candidates.len() < 2 {
        return 0.0;
    }
    let sets: Vec<_> = candidates
        .iter()
        .map(|c| word_set(&c.text, DIVERSITY_MIN_WORD_LEN))
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            total += 1.0 - jaccard(a, b);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// How tightly final scores agree: `max(0, 1 − (max − min) / mean)`.
///
/// 1 for fewer than two candidates.
pub fn consensus_strength(candidates: &[Candidate]) -> f64 {
    if candidates.len() < 2 {
        return 1.0;
    }
    let scores = candidates.iter().map(|c| c.final_score);
    let max = scores.clone().fold(f64::MIN, f64::max);
    let min = scores.clone().fold(f64::MAX, f64::min);
    let mean = scores.sum::<f64>() / candidates.len() as f64;
    if mean <= 0.0 {
        return if max == min { 1.0 } else { 0.0 };
    }
    (1.0 - (max - min) / mean).max(0.0)
}

/// Mean relative improvement of refined candidates, clamped to `[0, 1]`.
///
/// 0 when nothing was refined.
pub fn collaboration_effectiveness(candidates: &[Candidate]) -> f64 {
    let improvements: Vec<f64> = candidates
        .iter()
        .filter(|c| c.refined)
        .map(|c| {
            let original = c.original_score.unwrap_or(0.0);
            (c.evaluation_score - original) / original.max(1.0)
        })
        .collect();
    if improvements.is_empty() {
        return 0.0;
    }
    let mean = improvements.iter().sum::<f64>() / improvements.len() as f64;
    mean.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(worker: &str, text: &str, final_score: f64) -> Candidate {
        let mut c = Candidate::success(worker, text, 1);
        c.final_score = final_score;
        c.evaluation_score = final_score;
        c
    }

    #[test]
    fn test_diversity_index() {
        assert_eq!(diversity_index(&[scored("a", "alpha beta", 1.0)]), 0.0);

        let same = [
            scored("a", "sorting lists quickly", 1.0),
            scored("b", "sorting lists quickly", 1.0),
        ];
        assert_eq!(diversity_index(&same), 0.0);

        let disjoint = [
            scored("a", "sorting lists quickly", 1.0),
            scored("b", "weather today sunny", 1.0),
        ];
        assert_eq!(diversity_index(&disjoint), 1.0);

        // short words are ignored: {sorting, method} vs {sorting}
        let partial = [
            scored("a", "use the sorting method", 1.0),
            scored("b", "try a sorting", 1.0),
        ];
        assert!((diversity_index(&partial) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_strength() {
        assert_eq!(consensus_strength(&[]), 1.0);
        assert_eq!(
            consensus_strength(&[scored("a", "", 50.0), scored("b", "", 50.0)]),
            1.0
        );
        // (60 − 40) / 50 = 0.4
        let strength = consensus_strength(&[scored("a", "", 60.0), scored("b", "", 40.0)]);
        assert!((strength - 0.6).abs() < 1e-9);
        assert_eq!(
            consensus_strength(&[scored("a", "", 100.0), scored("b", "", 1.0)]),
            0.0
        );
    }

    #[test]
    fn test_collaboration_effectiveness() {
        let plain = scored("a", "", 50.0);
        assert_eq!(collaboration_effectiveness(&[plain.clone()]), 0.0);

        let mut refined = scored("b", "", 60.0);
        refined.refined = true;
        refined.original_score = Some(50.0);
        // (60 − 50) / 50
        assert!((collaboration_effectiveness(&[plain, refined.clone()]) - 0.2).abs() < 1e-9);

        let mut worse = refined.clone();
        worse.evaluation_score = 10.0;
        assert_eq!(collaboration_effectiveness(&[worse]), 0.0);
    }
}
