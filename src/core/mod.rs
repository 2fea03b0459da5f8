//! Core orchestration logic.
//!
//! This module contains:
//! - Channel: Bounded event conduit from runners to the scheduler
//! - Runner: Per-pipeline execution and stage-to-event translation
//! - Scheduler: Fan-in of all runners into one ordered stream
//! - Aggregator: Merging partial results with the adjudicated verdict
//! - Publisher: Framing events onto an outward text stream
//! - Pipeline: Pipeline definitions and loading
//! - Validation: Request checks performed before launch

pub mod aggregator;
pub mod channel;
pub mod pipeline;
pub mod publisher;
pub mod runner;
pub mod scheduler;
pub mod validation;

// Re-export commonly used types
pub use aggregator::{AggregationError, ResultAggregator, RunContext};
pub use channel::{event_channel, EventReceiver, EventSender};
pub use pipeline::{CommandSpec, CredentialRequirement, PipelineDefinition, StageRule};
pub use publisher::{encode_frame, split_frames, StreamPublisher, DONE_SENTINEL};
pub use runner::PipelineRunner;
pub use scheduler::{ClaimRequest, Orchestrator, OrchestratorSettings, VerifyError};
pub use validation::{validate_pipelines, ClaimLimits, ValidationError};
