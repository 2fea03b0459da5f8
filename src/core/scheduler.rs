//! Fan-in scheduler: runs every pipeline concurrently and merges their events.
//!
//! One run is driven by a single loop that owns the [`RunState`]. Producers
//! only push events and report their outcome through their task handle, so
//! no run state is shared between tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Adjudicator, Pipeline, ReportSink, RunCredentials};
use crate::core::pipeline::PipelineDefinition;
use crate::domain::{
    AggregatePayload, ErrorInfo, Event, FailureKind, PipelineId, PipelineOutcome, RunState,
};

use super::aggregator::{ResultAggregator, RunContext};
use super::channel::{event_channel, EventSender, DEFAULT_CAPACITY};
use super::runner::PipelineRunner;
use super::validation::{validate_pipelines, ClaimLimits, ValidationError};

/// Tunables for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Events buffered between producers and the drain loop
    pub channel_capacity: usize,

    /// Total run deadline; pipelines still pending on expiry are failed
    pub run_timeout: Option<Duration>,

    pub limits: ClaimLimits,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CAPACITY,
            run_timeout: None,
            limits: ClaimLimits::default(),
        }
    }
}

/// One verification request
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub claim: String,
    pub credentials: RunCredentials,
}

impl ClaimRequest {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            credentials: RunCredentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: RunCredentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Errors of the non-streaming variant
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Run ended without a result")]
    Incomplete,
}

/// Main claim orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    pipelines: Vec<Arc<dyn Pipeline>>,
    aggregator: ResultAggregator,
    sink: Option<Arc<dyn ReportSink>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create an orchestrator over a fixed pipeline set
    pub fn new(pipelines: Vec<Arc<dyn Pipeline>>, adjudicator: Arc<dyn Adjudicator>) -> Self {
        Self {
            pipelines,
            aggregator: ResultAggregator::new(adjudicator),
            sink: None,
            settings: OrchestratorSettings::default(),
        }
    }

    /// Store finished payloads in `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Definitions of every configured pipeline
    pub fn definitions(&self) -> impl Iterator<Item = &PipelineDefinition> {
        self.pipelines.iter().map(|p| p.definition())
    }

    /// Reject malformed requests before anything is launched
    pub fn validate(&self, request: &ClaimRequest) -> Result<String, ValidationError> {
        let claim = self.settings.limits.validate_claim(&request.claim)?;
        validate_pipelines(self.definitions(), &request.credentials)?;
        Ok(claim)
    }

    /// Start a run and return its event stream.
    ///
    /// Validation happens synchronously; on error no task is spawned and no
    /// event is produced. The stream always ends with [`Event::Done`].
    pub fn stream(&self, request: ClaimRequest) -> Result<ReceiverStream<Event>, ValidationError> {
        let claim = self.validate(&request)?;
        let (tx, rx) = event_channel(self.settings.channel_capacity);

        let this = self.clone();
        let run_id = Uuid::new_v4();
        tokio::spawn(async move {
            this.orchestrate(run_id, claim, request.credentials, tx).await;
        });

        Ok(rx.into_stream())
    }

    /// Run to completion and return only the final payload
    pub async fn verify(&self, request: ClaimRequest) -> Result<AggregatePayload, VerifyError> {
        let mut events = self.stream(request)?;
        let mut payload = None;
        let mut aggregation_error = None;

        while let Some(event) = events.next().await {
            match event {
                Event::Result { data } => payload = Some(*data),
                Event::Error(info) if info.kind == FailureKind::Aggregation => {
                    aggregation_error = Some(info.message)
                }
                Event::Error(info) => debug!(kind = ?info.kind, message = %info.message, "Run error"),
                Event::Done => break,
                _ => {}
            }
        }

        match (payload, aggregation_error) {
            (Some(payload), _) => Ok(payload),
            (None, Some(message)) => Err(VerifyError::Aggregation(message)),
            (None, None) => Err(VerifyError::Incomplete),
        }
    }

    /// Drive one run, publishing every event on `out`.
    ///
    /// Terminates with exactly one `Done`, after either a `Result` or a
    /// run-level `Error`.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn orchestrate(
        &self,
        run_id: Uuid,
        claim: String,
        credentials: RunCredentials,
        out: EventSender,
    ) {
        let started = Instant::now();
        info!(pipelines = self.pipelines.len(), "Run started");
        out.emit(Event::status("Initializing pipelines...")).await;

        let mut state = RunState::new(
            self.pipelines
                .iter()
                .map(|p| (p.id().clone(), p.definition().schema)),
        );

        let (events_tx, mut events_rx) = event_channel(self.settings.channel_capacity);
        let mut tasks: JoinSet<(PipelineId, PipelineOutcome)> = JoinSet::new();

        for pipeline in &self.pipelines {
            let runner = PipelineRunner::new(pipeline.clone(), events_tx.clone());
            let id = runner.id().clone();
            let claim = claim.clone();
            let credentials = credentials.clone();
            debug!(pipeline = %id, "Launching pipeline");
            tasks.spawn(async move {
                let outcome = runner.run(claim, credentials).await;
                (id, outcome)
            });
        }
        // Only runners hold senders now; the channel closes when they finish.
        drop(events_tx);

        let deadline = self
            .settings
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut timed_out = false;

        while !state.is_finished() {
            for event in events_rx.drain_buffered() {
                out.emit(event).await;
            }

            tokio::select! {
                Some(event) = events_rx.recv() => {
                    out.emit(event).await;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((id, outcome))) => {
                        debug!(pipeline = %id, succeeded = matches!(outcome, PipelineOutcome::Succeeded(_)), "Pipeline finished");
                        state.complete(id, outcome);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Pipeline task did not complete");
                    }
                    None => {
                        warn!(pending = state.pending.len(), "All tasks ended with pipelines still pending");
                        let lost = state.fail_pending(|id| {
                            ErrorInfo::producer(id.clone(), "pipeline task ended without reporting an outcome")
                        });
                        for info in lost {
                            out.emit(Event::Error(info)).await;
                        }
                    }
                },
                _ = wait_for_deadline(deadline) => {
                    warn!(pending = state.pending.len(), "Run deadline expired");
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            tasks.abort_all();
            // Outcomes that raced the deadline still count.
            while let Some(joined) = tasks.join_next().await {
                if let Ok((id, outcome)) = joined {
                    state.complete(id, outcome);
                }
            }
        }

        // Every runner has finished, so this drains the channel to its end.
        while let Some(event) = events_rx.recv().await {
            out.emit(event).await;
        }

        if timed_out {
            let limit = self.settings.run_timeout.unwrap_or_default();
            let expired = state.fail_pending(|id| {
                ErrorInfo::timeout(
                    id.clone(),
                    format!("pipeline did not finish within the {:?} run deadline", limit),
                )
            });
            for info in expired {
                out.emit(Event::Error(info)).await;
            }
        }

        out.emit(Event::status("Adjudicating verdict...")).await;

        let context = RunContext {
            run_id,
            claim,
            elapsed: started.elapsed(),
        };

        match self.aggregator.aggregate(&context, &state, &credentials).await {
            Ok(payload) => self.publish_result(payload, &out).await,
            Err(e) => {
                error!(error = %e, "Aggregation failed");
                out.emit(Event::Error(ErrorInfo::run(FailureKind::Aggregation, e.to_string())))
                    .await;
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed = state.errors.len(),
            "Run finished"
        );
        out.emit(Event::Done).await;
    }

    /// Store the payload (when a sink is configured) and emit the result
    async fn publish_result(&self, mut payload: AggregatePayload, out: &EventSender) {
        let mut sink_error = None;

        if let Some(ref sink) = self.sink {
            out.emit(Event::status("Generating report...")).await;
            match sink.store(&payload).await {
                Ok(storage) => {
                    info!(sink = sink.name(), url = %storage.download_url, "Report stored");
                    payload.storage = Some(storage);
                }
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "Report sink failed");
                    sink_error = Some(format!("Report storage failed: {:#}", e));
                }
            }
        }

        out.emit(Event::Result {
            data: Box::new(payload),
        })
        .await;

        if let Some(message) = sink_error {
            out.emit(Event::Error(ErrorInfo::run(FailureKind::Sink, message)))
                .await;
        }
    }
}

async fn wait_for_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
