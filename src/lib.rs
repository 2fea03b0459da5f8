//! claimcheck - Parallel claim verification orchestrator
//!
//! Runs independent analysis pipelines concurrently, merges their progress
//! events into one ordered stream, and feeds their final results into a
//! single adjudication step whose verdict ends the stream.
//!
//! # Architecture
//!
//! - Each pipeline runs in its own task and reports stage transitions
//! - A single drain loop forwards events in arrival order
//! - A failing pipeline degrades the verdict's input, it never aborts the run
//! - Every stream ends with exactly one `[DONE]` marker
//!
//! # Modules
//!
//! - `adapters`: External collaborators (pipelines, adjudicator, report sink)
//! - `core`: Orchestration logic (channel, runner, scheduler, aggregator, publisher)
//! - `domain`: Data structures (Event, PartialResult, RunState, AggregatePayload)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Stream progress frames for a claim
//! claimcheck verify "The Great Wall is visible from the Moon"
//!
//! # Print only the final payload
//! claimcheck verify --no-stream "The Great Wall is visible from the Moon"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{ClaimRequest, Orchestrator, OrchestratorSettings};
pub use domain::{AggregatePayload, Event, PartialResult, PipelineId, Verdict};
