//! Request validation performed before any pipeline is launched.
//!
//! A request that fails here produces no events at all.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::RunCredentials;
use crate::core::pipeline::PipelineDefinition;
use crate::domain::PipelineId;

/// Limits applied to incoming claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLimits {
    /// Maximum claim size in bytes after trimming (default: 8KB)
    #[serde(default = "default_max_claim_bytes")]
    pub max_claim_bytes: usize,
}

fn default_max_claim_bytes() -> usize {
    8 * 1024
}

impl Default for ClaimLimits {
    fn default() -> Self {
        Self {
            max_claim_bytes: default_max_claim_bytes(),
        }
    }
}

impl ClaimLimits {
    /// Trim and check a claim, returning the normalized text
    pub fn validate_claim(&self, claim: &str) -> Result<String, ValidationError> {
        let trimmed = claim.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyClaim);
        }

        if trimmed.len() > self.max_claim_bytes {
            return Err(ValidationError::ClaimTooLong {
                actual: trimmed.len(),
                limit: self.max_claim_bytes,
            });
        }

        Ok(trimmed.to_string())
    }
}

/// Check that the pipeline set can run and every required credential is present
pub fn validate_pipelines<'a>(
    definitions: impl IntoIterator<Item = &'a PipelineDefinition>,
    credentials: &RunCredentials,
) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();

    for definition in definitions {
        if !seen.insert(definition.id.clone()) {
            return Err(ValidationError::DuplicatePipeline {
                pipeline: definition.id.clone(),
            });
        }

        for requirement in definition.credentials.iter().filter(|c| c.required) {
            if credentials.get(&requirement.name).is_none() {
                return Err(ValidationError::MissingCredential {
                    pipeline: definition.id.clone(),
                    credential: requirement.name.clone(),
                });
            }
        }
    }

    if seen.is_empty() {
        return Err(ValidationError::NoPipelines);
    }

    Ok(())
}

/// Malformed or incomplete requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Claim cannot be empty")]
    EmptyClaim,

    #[error("Claim too long: {actual} bytes > {limit}")]
    ClaimTooLong { actual: usize, limit: usize },

    #[error("No pipelines configured")]
    NoPipelines,

    #[error("Pipeline '{pipeline}' is configured more than once")]
    DuplicatePipeline { pipeline: PipelineId },

    #[error("Pipeline '{pipeline}' requires the '{credential}' credential")]
    MissingCredential {
        pipeline: PipelineId,
        credential: String,
    },
}
