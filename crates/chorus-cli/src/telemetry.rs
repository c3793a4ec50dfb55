//! JSONL telemetry for completed runs.
//!
//! Each delivered [`RunResult`] becomes one line in an append-only file so
//! runs can be analysed with streaming tools.

use chorus_coordination::{ConsensusMethod, ResponseSink, RunResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Score of one candidate in a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub worker: String,
    pub final_score: f64,
    pub latency_ms: u64,
    pub refined: bool,
}

/// One line of the telemetry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub confidence: f64,
    pub consensus_worker: String,
    pub method: ConsensusMethod,
    pub candidates: Vec<CandidateRecord>,
    pub diversity_index: f64,
    pub consensus_strength: f64,
    pub peer_reviews: usize,
    pub elapsed_ms: u64,
}

impl RunRecord {
    pub fn from_result(result: &RunResult) -> Self {
        let stats = &result.stats;
        Self {
            timestamp: Utc::now(),
            domain: stats.classification.domain.clone(),
            confidence: stats.classification.confidence,
            consensus_worker: result.consensus.candidate.worker.clone(),
            method: result.consensus.method,
            candidates: result
                .candidates
                .iter()
                .map(|c| CandidateRecord {
                    worker: c.worker.clone(),
                    final_score: c.final_score,
                    latency_ms: c.latency_ms,
                    refined: c.refined,
                })
                .collect(),
            diversity_index: stats.collaboration.diversity_index,
            consensus_strength: stats.collaboration.consensus_strength,
            peer_reviews: stats.collaboration.peer_reviews,
            elapsed_ms: stats.elapsed_ms,
        }
    }
}

/// Appends a [`RunRecord`] per delivered run to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResponseSink for JsonlSink {
    fn deliver(&self, result: &RunResult) {
        append_record(&RunRecord::from_result(result), &self.path);
    }
}

/// Append one record to `path`; failures are logged, never raised.
pub fn append_record(record: &RunRecord, path: &Path) {
    match serde_json::to_string(record) {
        Ok(json) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append telemetry: {e}");
                    } else {
                        info!(path = %path.display(), "Appended run telemetry");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize telemetry: {e}"),
    }
}

/// Read every record back; malformed lines are skipped.
pub fn read_records(path: &Path) -> std::io::Result<Vec<RunRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
