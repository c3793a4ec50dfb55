//! Prompt templates for the collaboration passes
//!
//! Peer review, refinement and synthesis each send workers a structured
//! instruction built around the user's question. Keeping the templates
//! together means the critique parser and the review prompt agree on the
//! section headers.

use serde::{Deserialize, Serialize};

use crate::state::Candidate;

/// Section headers workers are asked to use in critiques
pub const STRENGTHS_HEADER: &str = "STRENGTHS:";
pub const WEAKNESSES_HEADER: &str = "WEAKNESSES:";
pub const SUGGESTIONS_HEADER: &str = "SUGGESTIONS:";

/// Single-word prompt used to warm a worker up
pub const WARMUP_PROMPT: &str = "Hello";

/// Test prompt used by performance diagnosis
pub const DIAGNOSIS_PROMPT: &str = "Hello, respond briefly.";

/// Prompt templates for the collaboration passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromptTemplate {
    /// Ask `reviewer` to critique another worker's answer
    Review {
        reviewer: String,
        question: String,
        answer: String,
    },
    /// Ask `worker` to improve its own answer using peer critiques
    Refine {
        worker: String,
        question: String,
        answer: String,
        critiques: Vec<String>,
    },
    /// Ask one worker to merge the best answers into a final one
    Synthesize {
        question: String,
        /// (worker, evaluation score, text)
        sources: Vec<(String, f64, String)>,
    },
}

impl PromptTemplate {
    pub fn review(reviewer: &str, question: &str, candidate: &Candidate) -> Self {
        Self::Review {
            reviewer: reviewer.to_string(),
            question: question.to_string(),
            answer: candidate.text.clone(),
        }
    }

    pub fn refine(question: &str, candidate: &Candidate, critiques: Vec<String>) -> Self {
        Self::Refine {
            worker: candidate.worker.clone(),
            question: question.to_string(),
            answer: candidate.text.clone(),
            critiques,
        }
    }

    pub fn synthesize(question: &str, ranked: &[Candidate]) -> Self {
        Self::Synthesize {
            question: question.to_string(),
            sources: ranked
                .iter()
                .map(|c| (c.worker.clone(), c.evaluation_score, c.text.clone()))
                .collect(),
        }
    }

    /// Render the template as the prompt text sent to the worker
    pub fn render(&self) -> String {
        match self {
            Self::Review {
                reviewer,
                question,
                answer,
            } => format!(
                "As {reviewer}, critically review this answer to the question \"{question}\":\n\n\
                 ANSWER UNDER REVIEW:\n\"{answer}\"\n\n\
                 REVIEW INSTRUCTIONS:\n\
                 - Identify specific strengths of the answer\n\
                 - Point out weaknesses or missing information\n\
                 - Suggest concrete improvements\n\
                 - Keep a constructive, professional tone\n\
                 - Be specific, not generic\n\n\
                 Reply ONLY with your critique in this format:\n\
                 {STRENGTHS_HEADER} [list of positive aspects]\n\
                 {WEAKNESSES_HEADER} [list of problems found]\n\
                 {SUGGESTIONS_HEADER} [specific recommended improvements]"
            ),
            Self::Refine {
                worker,
                question,
                answer,
                critiques,
            } => format!(
                "As {worker}, improve your original answer using feedback from other models.\n\n\
                 ORIGINAL QUESTION: \"{question}\"\n\n\
                 YOUR ORIGINAL ANSWER:\n\"{answer}\"\n\n\
                 FEEDBACK FROM OTHER MODELS:\n{feedback}\n\n\
                 INSTRUCTIONS:\n\
                 - Incorporate the valid suggestions from the feedback\n\
                 - Keep the strengths of your original answer\n\
                 - Fix the weaknesses that were identified\n\
                 - Add information the feedback says was missing\n\
                 - Keep the same tone and focus but be more complete\n\n\
                 Reply with your improved version:",
                feedback = critiques.join("\n\n")
            ),
            Self::Synthesize { question, sources } => {
                let answers = sources
                    .iter()
                    .enumerate()
                    .map(|(i, (worker, score, text))| {
                        format!(
                            "ANSWER {} ({}, score: {:.1}/100):\n{}\n",
                            i + 1,
                            worker,
                            score,
                            text
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n---\n");
                format!(
                    "Based on the following answers from different AI models to the question \"{question}\", \
                     write a final answer that combines the best of each:\n\n\
                     {answers}\n\
                     Instructions for the final answer:\n\
                     1. Combine the most accurate and useful information from all answers\n\
                     2. Remove contradictory or incorrect information\n\
                     3. Keep a natural, coherent tone\n\
                     4. Make the answer complete but concise\n\
                     5. If the answers disagree, mention the different perspectives\n\n\
                     IMPROVED FINAL ANSWER:"
                )
            }
        }
    }
}
