//! Peer review between workers
//!
//! After the first evaluation, workers critique each other's drafts and
//! rewrite their own answers from the feedback:
//!
//! ```text
//! drafts ─▶ cross-critique (n × (n − 1)) ─▶ collaboration score
//!                                      │
//!                                      └─▶ refine round 1 ─▶ … ─▶ refine round R
//! ```
//!
//! # Components
//!
//! - **critique**: parses STRENGTHS / WEAKNESSES / SUGGESTIONS sections and
//!   turns indicator words into a bounded bonus
//! - **orchestrator**: runs the review and refinement passes through the
//!   dispatcher

pub mod critique;
pub mod orchestrator;

pub use critique::{collaboration_score, PeerCritique, MAX_COLLABORATION_SCORE};
pub use orchestrator::{LoopSummary, PeerReviewLoop};
