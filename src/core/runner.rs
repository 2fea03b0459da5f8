//! Runs one pipeline and translates its stage transitions into events.
//!
//! The runner is the failure boundary for a pipeline: errors and panics
//! raised inside the pipeline become an `Error` event plus a failed outcome,
//! never a propagated error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::adapters::{Pipeline, PipelineInput, RunCredentials, StageSnapshot};
use crate::domain::{ErrorInfo, Event, PartialResult, PipelineId, PipelineOutcome};

use super::channel::EventSender;

/// Stage snapshots buffered between a pipeline and its runner
const STAGE_BUFFER: usize = 16;

/// Wraps one pipeline execution for a single run
pub struct PipelineRunner {
    pipeline: Arc<dyn Pipeline>,
    events: EventSender,
}

impl PipelineRunner {
    /// Create a runner publishing onto `events`
    pub fn new(pipeline: Arc<dyn Pipeline>, events: EventSender) -> Self {
        Self { pipeline, events }
    }

    /// Pipeline this runner drives
    pub fn id(&self) -> &PipelineId {
        self.pipeline.id()
    }

    /// Execute the pipeline to a terminal outcome.
    ///
    /// Every stage snapshot yields one `Log` event, plus one `PartialData`
    /// event for stages that surface intermediate data. The last snapshot
    /// carrying the pipeline's result key becomes the partial result; its
    /// absence yields the empty default.
    #[instrument(skip_all, fields(pipeline = %self.pipeline.id()))]
    pub async fn run(self, claim: String, credentials: RunCredentials) -> PipelineOutcome {
        let definition = self.pipeline.definition();
        let id = definition.id.clone();
        let started = Instant::now();

        let input = PipelineInput {
            initial_state: definition.initial_state(&claim),
            claim,
            credentials,
        };

        info!("Pipeline started");

        let (stage_tx, mut stage_rx) = mpsc::channel::<StageSnapshot>(STAGE_BUFFER);

        // The pipeline owns stage_tx, so the forwarding loop ends when the
        // pipeline future completes (successfully, with an error, or by panic).
        let execution = AssertUnwindSafe(self.pipeline.execute(input, stage_tx)).catch_unwind();

        let forwarding = async {
            let mut located: Option<Value> = None;
            while let Some(snapshot) = stage_rx.recv().await {
                self.translate(&snapshot).await;
                if let Some(payload) = snapshot.state.get(&definition.result_key) {
                    located = Some(payload.clone());
                }
            }
            located
        };

        let (result, located) = tokio::join!(execution, forwarding);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let failure = match result {
            Ok(Ok(())) => {
                if located.is_none() {
                    debug!(result_key = %definition.result_key, "Result key never reported, using empty default");
                }
                info!(elapsed_ms, "Pipeline completed");
                return PipelineOutcome::Succeeded(PartialResult::from_value(
                    definition.schema,
                    located,
                ));
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(panic) => format!("pipeline panicked: {}", panic_message(panic.as_ref())),
        };

        error!(elapsed_ms, error = %failure, "Pipeline failed");
        let info = ErrorInfo::producer(id, failure);
        self.events.emit(Event::Error(info.clone())).await;
        PipelineOutcome::Failed(info)
    }

    /// Map one stage transition onto events
    async fn translate(&self, snapshot: &StageSnapshot) {
        let definition = self.pipeline.definition();
        let id = definition.id.clone();

        let Some(rule) = definition.stage(&snapshot.stage) else {
            debug!(stage = %snapshot.stage, "Stage not in vocabulary");
            self.events
                .emit(Event::log(id, format!("Stage '{}' completed.", snapshot.stage)))
                .await;
            return;
        };

        self.events
            .emit(Event::log(id.clone(), rule.render(&snapshot.state)))
            .await;

        if let Some(ref key) = rule.surface {
            let data = snapshot
                .state
                .get(key)
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));

            self.events
                .emit(Event::PartialData {
                    producer: id,
                    stage: snapshot.stage.clone(),
                    data,
                })
                .await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
