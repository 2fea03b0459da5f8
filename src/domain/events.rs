//! Event types carried from pipeline runners to the stream publisher.
//!
//! Every unit of orchestrator output is an [`Event`]. Events are immutable once
//! created and are serialized with a `type` tag matching the outward frame
//! vocabulary (`status`, `log`, `sources`, `error`, `result`).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::aggregate::AggregatePayload;

/// Identifies one of the concurrently running pipelines (e.g. "evidence").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Create a pipeline identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where a failure surfaced during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A pipeline raised or exited unsuccessfully
    Producer,

    /// A pipeline was still pending when the run deadline expired
    Timeout,

    /// Adjudication or payload merge failed
    Aggregation,

    /// The report sink failed to store the payload
    Sink,
}

/// A captured failure, attributed to a producer when one is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Pipeline that failed (None for run-level failures)
    pub producer: Option<PipelineId>,

    /// Failure category
    pub kind: FailureKind,

    /// Human-readable message (NO secrets)
    pub message: String,
}

impl ErrorInfo {
    /// A pipeline-level failure
    pub fn producer(producer: PipelineId, message: impl Into<String>) -> Self {
        Self {
            producer: Some(producer),
            kind: FailureKind::Producer,
            message: message.into(),
        }
    }

    /// A pipeline that missed the run deadline
    pub fn timeout(producer: PipelineId, message: impl Into<String>) -> Self {
        Self {
            producer: Some(producer),
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    /// A run-level failure not owned by any pipeline
    pub fn run(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            producer: None,
            kind,
            message: message.into(),
        }
    }
}

/// A single unit of orchestrator output.
///
/// Ordering is arrival order on the event channel. Events from one producer
/// keep their emission order; interleaving between producers is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run-level progress message emitted by the scheduler
    Status { message: String },

    /// One stage transition of a pipeline
    Log {
        producer: PipelineId,
        message: String,
    },

    /// User-facing intermediate data surfaced by a stage (e.g. discovered sources)
    #[serde(rename = "sources")]
    PartialData {
        producer: PipelineId,
        stage: String,
        data: serde_json::Value,
    },

    /// A failure; the run continues unless this is the terminal error
    Error(ErrorInfo),

    /// The aggregated, adjudicated outcome of the run
    Result { data: Box<AggregatePayload> },

    /// End of stream; published as the `[DONE]` sentinel, never as JSON
    Done,
}

impl Event {
    /// Convenience constructor for status events
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Convenience constructor for log events
    pub fn log(producer: PipelineId, message: impl Into<String>) -> Self {
        Self::Log {
            producer,
            message: message.into(),
        }
    }

    /// The pipeline that produced this event, if any
    pub fn producer(&self) -> Option<&PipelineId> {
        match self {
            Self::Log { producer, .. } | Self::PartialData { producer, .. } => Some(producer),
            Self::Error(info) => info.producer.as_ref(),
            Self::Status { .. } | Self::Result { .. } | Self::Done => None,
        }
    }

    /// Outward frame type name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Log { .. } => "log",
            Self::PartialData { .. } => "sources",
            Self::Error(_) => "error",
            Self::Result { .. } => "result",
            Self::Done => "done",
        }
    }

    /// Whether this is the end-of-stream marker
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
