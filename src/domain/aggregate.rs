//! The final merged output of a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::events::PipelineId;

/// Decision returned by the adjudicator.
///
/// Known fields are typed; anything else the adjudicator returns is kept in
/// `extra` so the verdict is embedded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default = "unknown_decision")]
    pub decision: String,

    #[serde(default)]
    pub confidence_score: f64,

    #[serde(default = "neutral_probability")]
    pub truth_probability: f64,

    #[serde(default)]
    pub narrative: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_decision() -> String {
    "UNKNOWN".to_string()
}

fn neutral_probability() -> f64 {
    50.0
}

impl Verdict {
    /// Create a verdict with empty metadata
    pub fn new(decision: impl Into<String>, confidence_score: f64, truth_probability: f64) -> Self {
        Self {
            decision: decision.into(),
            confidence_score,
            truth_probability,
            narrative: String::new(),
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Attach a narrative summary
    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = narrative.into();
        self
    }
}

/// Where the stored report can be retrieved from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub download_url: String,
    pub path: String,
}

/// Merged, adjudicated result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatePayload {
    /// Unique identifier of the run that produced this payload
    pub run_id: Uuid,

    pub claim: String,

    /// Stable identifier derived from the normalized claim
    pub claim_id: String,

    /// Partial result per pipeline, projected to open mappings
    pub evidence: BTreeMap<PipelineId, Map<String, Value>>,

    /// Adjudicator output, embedded verbatim
    pub verdict: Verdict,

    /// Pipelines that failed, with their messages
    #[serde(default)]
    pub failures: BTreeMap<PipelineId, String>,

    /// Wall-clock time for the whole run, formatted as "12.3s"
    pub processing_time: String,

    pub elapsed_ms: u64,

    pub completed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageInfo>,
}

impl AggregatePayload {
    /// Evidence contributed by one pipeline
    pub fn evidence_for(&self, id: &PipelineId) -> Option<&Map<String, Value>> {
        self.evidence.get(id)
    }

    /// Name of the report file for this payload
    pub fn report_file_name(&self) -> String {
        format!("{}-{}.json", self.claim_id, self.run_id)
    }
}

/// Derive the claim identifier: first 16 hex chars of SHA-256 over the
/// trimmed, lowercased claim
pub fn claim_id(claim: &str) -> String {
    let normalized = claim.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Format elapsed milliseconds with one decimal of seconds
pub fn format_processing_time(elapsed_ms: u64) -> String {
    format!("{:.1}s", elapsed_ms as f64 / 1000.0)
}
