//! Per-run bookkeeping owned by the fan-in scheduler.
//!
//! A [`RunState`] tracks which pipelines are still pending and what each
//! finished pipeline contributed. Every pipeline leaves the pending set
//! exactly once; later transitions for the same pipeline are ignored.

use std::collections::{BTreeMap, BTreeSet};

use super::events::{ErrorInfo, PipelineId};
use super::partial::{PartialResult, ResultSchema};

/// How a single pipeline finished
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Pipeline completed; its reduced result is attached
    Succeeded(PartialResult),

    /// Pipeline failed; the error has already been emitted as an event
    Failed(ErrorInfo),
}

/// Mutable record of one orchestration run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Results of pipelines that succeeded
    pub partial_results: BTreeMap<PipelineId, PartialResult>,

    /// Pipelines that have not reported a terminal outcome yet
    pub pending: BTreeSet<PipelineId>,

    /// Failures of pipelines that did not succeed
    pub errors: BTreeMap<PipelineId, ErrorInfo>,

    /// Result schema per pipeline, used to default failed contributions
    schemas: BTreeMap<PipelineId, ResultSchema>,
}

impl RunState {
    /// Start a run with every pipeline pending
    pub fn new(pipelines: impl IntoIterator<Item = (PipelineId, ResultSchema)>) -> Self {
        let schemas: BTreeMap<PipelineId, ResultSchema> = pipelines.into_iter().collect();
        Self {
            partial_results: BTreeMap::new(),
            pending: schemas.keys().cloned().collect(),
            errors: BTreeMap::new(),
            schemas,
        }
    }

    /// Record a terminal outcome.
    ///
    /// Returns false when the pipeline is unknown or already left the
    /// pending set; the state is unchanged in that case.
    pub fn complete(&mut self, id: PipelineId, outcome: PipelineOutcome) -> bool {
        if !self.pending.remove(&id) {
            return false;
        }

        match outcome {
            PipelineOutcome::Succeeded(partial) => {
                self.partial_results.insert(id, partial);
            }
            PipelineOutcome::Failed(error) => {
                self.errors.insert(id, error);
            }
        }
        true
    }

    /// Fail every pipeline that is still pending, returning the recorded errors
    pub fn fail_pending(&mut self, make_error: impl Fn(&PipelineId) -> ErrorInfo) -> Vec<ErrorInfo> {
        let pending: Vec<PipelineId> = self.pending.iter().cloned().collect();
        let mut failed = Vec::with_capacity(pending.len());

        for id in pending {
            let error = make_error(&id);
            failed.push(error.clone());
            self.complete(id, PipelineOutcome::Failed(error));
        }

        failed
    }

    /// Whether every pipeline has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Schema declared for a pipeline
    pub fn schema(&self, id: &PipelineId) -> ResultSchema {
        self.schemas.get(id).copied().unwrap_or_default()
    }

    /// Every pipeline participating in this run
    pub fn pipeline_ids(&self) -> impl Iterator<Item = &PipelineId> {
        self.schemas.keys()
    }
}
