//! Pipeline definitions and loading.
//!
//! Pipelines are defined in YAML. A definition names the pipeline, declares
//! the stage vocabulary the runner translates into events, and says where the
//! substantive result lives in the final state.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PipelineId, ResultSchema};

/// A complete pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline identifier (unique within a run)
    pub id: PipelineId,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// State key holding the pipeline's substantive output
    pub result_key: String,

    /// Shape of the output found under `result_key`
    #[serde(default)]
    pub schema: ResultSchema,

    /// Key under which the claim is injected into the initial state
    #[serde(default = "default_input_key")]
    pub input_key: String,

    /// Initial state record (the claim is added under `input_key`)
    #[serde(default)]
    pub initial_state: serde_json::Map<String, Value>,

    /// Credentials this pipeline consumes
    #[serde(default)]
    pub credentials: Vec<CredentialRequirement>,

    /// Stage vocabulary, in expected order
    #[serde(default)]
    pub stages: Vec<StageRule>,

    /// External command implementing the pipeline (for subprocess pipelines)
    #[serde(default)]
    pub command: Option<CommandSpec>,

    /// Upper bound for one execution, in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_input_key() -> String {
    "claim".to_string()
}

fn default_timeout_seconds() -> u64 {
    300
}

impl PipelineDefinition {
    /// Create a minimal definition with no stages
    pub fn new(id: impl Into<PipelineId>, result_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            result_key: result_key.into(),
            schema: ResultSchema::Open,
            input_key: default_input_key(),
            initial_state: serde_json::Map::new(),
            credentials: Vec::new(),
            stages: Vec::new(),
            command: None,
            timeout_seconds: None,
        }
    }

    /// Builder: set the result schema
    pub fn with_schema(mut self, schema: ResultSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Builder: append a stage rule
    pub fn with_stage(mut self, stage: StageRule) -> Self {
        self.stages.push(stage);
        self
    }

    /// Builder: declare a credential
    pub fn with_credential(mut self, credential: CredentialRequirement) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Load a definition from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid pipeline file: {}", path.display()))
    }

    /// Parse a definition from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Load every `*.yaml` / `*.yml` definition in a directory, sorted by id
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read pipelines directory: {}", dir.display()))?;

        let mut definitions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }

            let definition = Self::from_file(&path)?;
            definition.validate()?;
            definitions.push(definition);
        }

        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }

    /// Validate the definition
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            anyhow::bail!("Pipeline id cannot be empty");
        }

        if self.result_key.trim().is_empty() {
            anyhow::bail!("Pipeline '{}' has an empty result_key", self.id);
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if stage.name.is_empty() {
                anyhow::bail!("Stage {} of pipeline '{}' has an empty name", i, self.id);
            }

            if self.stages[..i].iter().any(|s| s.name == stage.name) {
                anyhow::bail!(
                    "Pipeline '{}' declares stage '{}' more than once",
                    self.id,
                    stage.name
                );
            }
        }

        if let Some(ref command) = self.command {
            if command.program.trim().is_empty() {
                anyhow::bail!("Pipeline '{}' has an empty command program", self.id);
            }
        }

        Ok(())
    }

    /// Get a stage rule by name
    pub fn stage(&self, name: &str) -> Option<&StageRule> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Build the initial state for a claim
    pub fn initial_state(&self, claim: &str) -> Value {
        let mut state = self.initial_state.clone();
        state.insert(self.input_key.clone(), Value::String(claim.to_string()));
        Value::Object(state)
    }

    /// Effective execution timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or_else(default_timeout_seconds))
    }
}

/// How a named stage is surfaced to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRule {
    /// Stage name as reported by the pipeline
    pub name: String,

    /// Log message; `{count}` expands to the length of the surfaced list
    #[serde(default)]
    pub message: Option<String>,

    /// State key whose value is published as partial data
    #[serde(default)]
    pub surface: Option<String>,
}

impl StageRule {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: Some(message.into()),
            surface: None,
        }
    }

    /// Builder: publish `state[key]` as partial data
    pub fn surfacing(mut self, key: impl Into<String>) -> Self {
        self.surface = Some(key.into());
        self
    }

    /// Render the log message for a snapshot of this stage
    pub fn render(&self, state: &Value) -> String {
        let Some(ref template) = self.message else {
            return format!("Stage '{}' completed.", self.name);
        };

        if !template.contains("{count}") {
            return template.clone();
        }

        let count = self
            .surface
            .as_ref()
            .and_then(|key| state.get(key))
            .map(|v| match v {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                _ => 1,
            })
            .unwrap_or(0);

        template.replace("{count}", &count.to_string())
    }
}

/// A credential a pipeline consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequirement {
    /// Credential name ("generation" or "search")
    pub name: String,

    /// Environment variable set on the pipeline's child process
    pub env: String,

    /// Reject the run up front when missing
    #[serde(default)]
    pub required: bool,
}

impl CredentialRequirement {
    pub fn required(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
            required: true,
        }
    }
}

/// External program implementing a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}
