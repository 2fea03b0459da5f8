//! Adapter interfaces for external collaborators.
//!
//! The orchestrator only sees pipelines, the adjudicator and the report sink
//! through the traits defined here. Concrete adapters run subprocesses,
//! call HTTP endpoints or write to disk.

pub mod command;
pub mod http;
pub mod report;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::pipeline::PipelineDefinition;
use crate::domain::{AggregatePayload, PartialResult, PipelineId, StorageInfo, Verdict};

pub use command::{CommandAdjudicator, CommandPipeline};
pub use http::HttpAdjudicator;
pub use report::FileReportSink;

/// Credentials for one run, passed explicitly to every collaborator.
///
/// Never written to process-wide environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RunCredentials {
    /// Key for the text-generation service
    pub generation_key: Option<String>,

    /// Key for the web search service
    pub search_key: Option<String>,
}

impl RunCredentials {
    /// Look up a credential by its name in pipeline definitions
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "generation" => self.generation_key.as_deref(),
            "search" => self.search_key.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

impl fmt::Debug for RunCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("RunCredentials")
            .field("generation_key", &redact(&self.generation_key))
            .field("search_key", &redact(&self.search_key))
            .finish()
    }
}

/// One named stage transition of a pipeline with its state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: String,

    #[serde(default)]
    pub state: serde_json::Value,
}

impl StageSnapshot {
    pub fn new(stage: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            stage: stage.into(),
            state,
        }
    }
}

/// Sender half a pipeline pushes its stage snapshots into
pub type StageSender = mpsc::Sender<StageSnapshot>;

/// Everything a pipeline receives at launch
#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// The claim under analysis
    pub claim: String,

    /// Initial state record with the claim injected
    pub initial_state: serde_json::Value,

    pub credentials: RunCredentials,
}

/// An independent analysis pipeline
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Static description: id, stage vocabulary, result key
    fn definition(&self) -> &PipelineDefinition;

    /// Pipeline identifier
    fn id(&self) -> &PipelineId {
        &self.definition().id
    }

    /// Run to completion, pushing every stage transition into `stages`.
    ///
    /// Returning `Err` marks the pipeline as failed; snapshots already sent
    /// are still published.
    async fn execute(&self, input: PipelineInput, stages: StageSender) -> Result<()>;
}

/// Decision function combining all partial results into a verdict
#[async_trait]
pub trait Adjudicator: Send + Sync {
    /// Human-readable adjudicator name
    fn name(&self) -> &str;

    /// Produce a verdict; may fail
    async fn adjudicate(
        &self,
        claim: &str,
        partials: &BTreeMap<PipelineId, PartialResult>,
        credentials: &RunCredentials,
    ) -> Result<Verdict>;
}

/// Destination for finished payloads
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Human-readable sink name
    fn name(&self) -> &str;

    /// Persist the payload and return where it can be retrieved from
    async fn store(&self, payload: &AggregatePayload) -> Result<StorageInfo>;
}

/// Request body sent to out-of-process adjudicators
#[derive(Debug, Serialize)]
pub(crate) struct AdjudicationRequest<'a> {
    pub claim: &'a str,
    pub partials: BTreeMap<&'a PipelineId, serde_json::Map<String, serde_json::Value>>,
}

impl<'a> AdjudicationRequest<'a> {
    pub(crate) fn new(claim: &'a str, partials: &'a BTreeMap<PipelineId, PartialResult>) -> Self {
        Self {
            claim,
            partials: partials.iter().map(|(id, p)| (id, p.to_map())).collect(),
        }
    }
}
