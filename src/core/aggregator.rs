//! Merges per-pipeline results and applies adjudication.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Adjudicator, RunCredentials};
use crate::domain::aggregate::format_processing_time;
use crate::domain::{claim_id, AggregatePayload, RunState};

/// Failures while building the aggregate payload
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Adjudicator '{adjudicator}' failed: {message}")]
    Adjudication {
        adjudicator: String,
        message: String,
    },
}

/// Identifiers and timing for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub claim: String,
    pub elapsed: Duration,
}

/// Builds the aggregate payload once every pipeline has finished
#[derive(Clone)]
pub struct ResultAggregator {
    adjudicator: Arc<dyn Adjudicator>,
}

impl ResultAggregator {
    pub fn new(adjudicator: Arc<dyn Adjudicator>) -> Self {
        Self { adjudicator }
    }

    /// Merge partial results and the verdict into the final payload.
    ///
    /// Failed pipelines contribute the empty default for their schema, so the
    /// adjudicator always sees one entry per pipeline.
    #[instrument(skip_all, fields(run_id = %context.run_id))]
    pub async fn aggregate(
        &self,
        context: &RunContext,
        state: &RunState,
        credentials: &RunCredentials,
    ) -> Result<AggregatePayload, AggregationError> {
        let mut partials = BTreeMap::new();
        for id in state.pipeline_ids() {
            let partial = match state.partial_results.get(id) {
                Some(partial) => partial.clone(),
                None => {
                    warn!(pipeline = %id, "Substituting empty result for failed pipeline");
                    crate::domain::PartialResult::empty(state.schema(id))
                }
            };
            partials.insert(id.clone(), partial);
        }

        let verdict = self
            .adjudicator
            .adjudicate(&context.claim, &partials, credentials)
            .await
            .map_err(|e| AggregationError::Adjudication {
                adjudicator: self.adjudicator.name().to_string(),
                message: format!("{:#}", e),
            })?;

        let evidence = partials
            .into_iter()
            .map(|(id, partial)| (id, partial.into_map()))
            .collect();

        let failures = state
            .errors
            .iter()
            .map(|(id, error)| (id.clone(), error.message.clone()))
            .collect();

        let elapsed_ms = context.elapsed.as_millis() as u64;

        info!(decision = %verdict.decision, elapsed_ms, "Verdict adjudicated");

        Ok(AggregatePayload {
            run_id: context.run_id,
            claim: context.claim.clone(),
            claim_id: claim_id(&context.claim),
            evidence,
            verdict,
            failures,
            processing_time: format_processing_time(elapsed_ms),
            elapsed_ms,
            completed_at: Utc::now(),
            storage: None,
        })
    }
}
