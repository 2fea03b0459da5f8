//! Domain types for the claimcheck orchestrator.
//!
//! This module contains the core data structures:
//! - Events: Typed progress records flowing to the stream publisher
//! - Partial results: Per-pipeline terminal outputs
//! - Run: Scheduler bookkeeping for one orchestration run
//! - Aggregate: The adjudicated final payload

pub mod aggregate;
pub mod events;
pub mod partial;
pub mod run;

// Re-export commonly used types
pub use aggregate::{claim_id, AggregatePayload, StorageInfo, Verdict};
pub use events::{ErrorInfo, Event, FailureKind, PipelineId};
pub use partial::{
    EvidenceDossier, ForensicLog, PartialResult, ResultSchema, REJECTED_FIELDS_KEY,
};
pub use run::{PipelineOutcome, RunState};
