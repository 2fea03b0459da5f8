//! Subprocess adapters.
//!
//! A command pipeline receives `{"claim": ..., "state": ...}` on stdin and
//! reports each stage as one JSON line on stdout:
//! `{"stage": "executor", "state": {...}}`. Lines that are not stage
//! snapshots are ignored. A non-zero exit marks the pipeline as failed.
//!
//! A command adjudicator receives `{"claim": ..., "partials": {...}}` on
//! stdin and prints one verdict object on stdout.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::pipeline::{CommandSpec, CredentialRequirement, PipelineDefinition};
use crate::domain::{PartialResult, PipelineId, Verdict};

use super::{
    AdjudicationRequest, Adjudicator, Pipeline, PipelineInput, RunCredentials, StageSender,
    StageSnapshot,
};

/// Pipeline implemented by an external program
pub struct CommandPipeline {
    definition: PipelineDefinition,
    command: CommandSpec,
}

impl CommandPipeline {
    /// Build from a definition that declares a `command`
    pub fn new(definition: PipelineDefinition) -> Result<Self> {
        let command = definition
            .command
            .clone()
            .with_context(|| format!("Pipeline '{}' has no command", definition.id))?;

        Ok(Self {
            definition,
            command,
        })
    }

    fn spawn(&self, credentials: &RunCredentials) -> Result<Child> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Credentials reach the child only; our own environment is untouched.
        for requirement in &self.definition.credentials {
            if let Some(value) = credentials.get(&requirement.name) {
                command.env(&requirement.env, value);
            }
        }

        command.spawn().with_context(|| {
            format!(
                "Failed to spawn '{}' for pipeline '{}'",
                self.command.program, self.definition.id
            )
        })
    }

    async fn run_child(&self, input: PipelineInput, stages: StageSender) -> Result<()> {
        let mut child = self.spawn(&input.credentials)?;

        let request = serde_json::json!({
            "claim": input.claim,
            "state": input.initial_state,
        });
        write_stdin(&mut child, request.to_string().as_bytes()).await?;

        let stderr = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer).await;
                buffer
            })
        });

        let stdout = child
            .stdout
            .take()
            .context("Pipeline stdout was not captured")?;
        let mut reader = BufReader::new(stdout);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .await
                .context("Failed to read pipeline output")?;
            if read == 0 {
                break;
            }

            // Invalid UTF-8 decodes lossily and is then skipped as non-JSON.
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<StageSnapshot>(line) {
                Ok(snapshot) => {
                    if stages.send(snapshot).await.is_err() {
                        debug!(pipeline = %self.definition.id, "Stage receiver closed");
                        break;
                    }
                }
                Err(e) => debug!(pipeline = %self.definition.id, error = %e, "Ignoring non-stage output line"),
            }
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for pipeline process")?;

        let stderr = match stderr {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            anyhow::bail!(
                "'{}' exited with code {}: {}",
                self.command.program,
                status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Pipeline for CommandPipeline {
    fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    async fn execute(&self, input: PipelineInput, stages: StageSender) -> Result<()> {
        let limit = self.definition.timeout();
        timeout(limit, self.run_child(input, stages))
            .await
            .with_context(|| format!("Pipeline '{}' timed out after {:?}", self.definition.id, limit))?
    }
}

/// Adjudicator implemented by an external program
pub struct CommandAdjudicator {
    command: CommandSpec,
    timeout: Duration,
    /// Credentials exported to the child, by environment name
    credentials: Vec<CredentialRequirement>,
}

impl CommandAdjudicator {
    /// Create an adjudicator that receives the generation key as `GOOGLE_API_KEY`
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            credentials: vec![CredentialRequirement {
                name: "generation".to_string(),
                env: "GOOGLE_API_KEY".to_string(),
                required: false,
            }],
        }
    }

    /// Builder: replace the credentials exported to the child
    pub fn with_credentials(mut self, credentials: Vec<CredentialRequirement>) -> Self {
        self.credentials = credentials;
        self
    }

    async fn run_child(
        &self,
        claim: &str,
        partials: &BTreeMap<PipelineId, PartialResult>,
        credentials: &RunCredentials,
    ) -> Result<Verdict> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for requirement in &self.credentials {
            if let Some(value) = credentials.get(&requirement.name) {
                command.env(&requirement.env, value);
            }
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn adjudicator '{}'", self.command.program))?;

        let request = serde_json::to_vec(&AdjudicationRequest::new(claim, partials))
            .context("Failed to encode adjudication request")?;
        write_stdin(&mut child, &request).await?;

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for adjudicator process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Adjudicator '{}' exited with code {}: {}",
                self.command.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("Adjudicator output is not a verdict object")
    }
}

#[async_trait]
impl Adjudicator for CommandAdjudicator {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn adjudicate(
        &self,
        claim: &str,
        partials: &BTreeMap<PipelineId, PartialResult>,
        credentials: &RunCredentials,
    ) -> Result<Verdict> {
        timeout(self.timeout, self.run_child(claim, partials, credentials))
            .await
            .with_context(|| format!("Adjudicator timed out after {:?}", self.timeout))?
    }
}

/// Write the request and close stdin to signal EOF.
///
/// A child that exits without reading its input is not an error here; its
/// exit status decides.
async fn write_stdin(child: &mut Child, bytes: &[u8]) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };

    match stdin.write_all(bytes).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!("Child process closed stdin before reading its input");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to write to child stdin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_requires_command() {
        let definition = PipelineDefinition::new("evidence", "evidence_dossier");
        assert!(CommandPipeline::new(definition).is_err());
    }

    #[test]
    fn test_pipeline_keeps_definition() {
        let mut definition = PipelineDefinition::new("evidence", "evidence_dossier");
        definition.command = Some(CommandSpec {
            program: "claim-evidence".to_string(),
            args: vec!["--fast".to_string()],
        });

        let pipeline = CommandPipeline::new(definition).unwrap();
        assert_eq!(pipeline.id(), &PipelineId::new("evidence"));
        assert_eq!(pipeline.command.args, vec!["--fast".to_string()]);
    }

    #[test]
    fn test_adjudicator_name_is_program() {
        let adjudicator = CommandAdjudicator::new(
            CommandSpec {
                program: "claim-judge".to_string(),
                args: Vec::new(),
            },
            Duration::from_secs(5),
        );
        assert_eq!(adjudicator.name(), "claim-judge");
    }
}
