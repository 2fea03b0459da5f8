//! Configuration for claimcheck.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CLAIMCHECK_HOME, CLAIMCHECK_PIPELINES,
//!    CLAIMCHECK_REPORTS, CLAIMCHECK_BASE_URL)
//! 2. Config file (.claimcheck/config.yaml)
//! 3. Defaults (~/.claimcheck)
//!
//! Config file discovery:
//! - Searches current directory and parents for .claimcheck/config.yaml
//! - Relative paths in the config file resolve against the project root
//!   (the directory containing .claimcheck/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::channel::DEFAULT_CAPACITY;
use crate::core::pipeline::{CommandSpec, CredentialRequirement};
use crate::core::{ClaimLimits, OrchestratorSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub orchestrator: Option<OrchestratorConfig>,
    #[serde(default)]
    pub limits: Option<ClaimLimits>,
    #[serde(default)]
    pub adjudicator: Option<AdjudicatorConfig>,
    #[serde(default)]
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Directory holding pipeline definitions
    pub pipelines: Option<String>,
    /// Directory receiving report files
    pub reports: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    pub channel_capacity: Option<usize>,
    pub run_timeout_seconds: Option<u64>,
    pub adjudicator_timeout_seconds: Option<u64>,
}

/// How to reach the adjudicator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AdjudicatorConfig {
    /// External program: `{ command: claim-judge, args: [], credentials: [] }`
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Credentials exported to the child; the generation key when empty
        #[serde(default)]
        credentials: Vec<CredentialRequirement>,
    },

    /// HTTP endpoint: `{ url: http://... }`
    Http { url: String },
}

impl Default for AdjudicatorConfig {
    fn default() -> Self {
        Self::Command {
            command: "claim-judge".to_string(),
            args: Vec::new(),
            credentials: Vec::new(),
        }
    }
}

impl AdjudicatorConfig {
    /// Command spec for the subprocess variant
    pub fn command_spec(&self) -> Option<CommandSpec> {
        match self {
            Self::Command { command, args, .. } => Some(CommandSpec {
                program: command.clone(),
                args: args.clone(),
            }),
            Self::Http { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// Directory holding pipeline definitions
    pub pipelines_dir: PathBuf,
    /// Directory receiving report files
    pub reports_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Scheduler tunables
    pub orchestrator: OrchestratorSettings,
    /// Adjudicator endpoint
    pub adjudicator: AdjudicatorConfig,
    pub adjudicator_timeout: Duration,
    /// Whether finished payloads are written to the reports directory
    pub report_enabled: bool,
    /// Public base URL for report locators
    pub base_url: Option<String>,
}

fn default_adjudicator_timeout() -> u64 {
    120
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".claimcheck").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed config file, environment lookups and defaults
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: &dyn Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_file, parsed) = match file {
        Some((path, parsed)) => (Some(path), Some(parsed)),
        None => (None, None),
    };

    // Project root: parent of .claimcheck/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let paths = parsed.as_ref().map(|c| c.paths.clone()).unwrap_or_default();

    let home = env("CLAIMCHECK_HOME")
        .map(PathBuf::from)
        .or_else(|| paths.home.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or(default_home);

    let pipelines_dir = env("CLAIMCHECK_PIPELINES")
        .map(PathBuf::from)
        .or_else(|| paths.pipelines.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| home.join("pipelines"));

    let reports_dir = env("CLAIMCHECK_REPORTS")
        .map(PathBuf::from)
        .or_else(|| paths.reports.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| home.join("reports"));

    let orchestrator_config = parsed
        .as_ref()
        .and_then(|c| c.orchestrator.clone())
        .unwrap_or_default();

    let orchestrator = OrchestratorSettings {
        channel_capacity: orchestrator_config
            .channel_capacity
            .unwrap_or(DEFAULT_CAPACITY),
        run_timeout: orchestrator_config
            .run_timeout_seconds
            .map(Duration::from_secs),
        limits: parsed
            .as_ref()
            .and_then(|c| c.limits.clone())
            .unwrap_or_default(),
    };

    let report = parsed.as_ref().and_then(|c| c.report.clone());

    ResolvedConfig {
        home,
        pipelines_dir,
        reports_dir,
        config_file,
        orchestrator,
        adjudicator: parsed
            .as_ref()
            .and_then(|c| c.adjudicator.clone())
            .unwrap_or_default(),
        adjudicator_timeout: Duration::from_secs(
            orchestrator_config
                .adjudicator_timeout_seconds
                .unwrap_or_else(default_adjudicator_timeout),
        ),
        report_enabled: report.as_ref().map(|r| r.enabled).unwrap_or(true),
        base_url: env("CLAIMCHECK_BASE_URL").or_else(|| report.and_then(|r| r.base_url)),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".claimcheck");

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    Ok(resolve(file, &env, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, &no_env, PathBuf::from("/home/u/.claimcheck"));

        assert_eq!(config.home, PathBuf::from("/home/u/.claimcheck"));
        assert_eq!(config.pipelines_dir, PathBuf::from("/home/u/.claimcheck/pipelines"));
        assert_eq!(config.reports_dir, PathBuf::from("/home/u/.claimcheck/reports"));
        assert_eq!(config.orchestrator.channel_capacity, DEFAULT_CAPACITY);
        assert!(config.orchestrator.run_timeout.is_none());
        assert_eq!(config.adjudicator, AdjudicatorConfig::default());
        assert!(config.report_enabled);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".claimcheck");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  pipelines: ./pipelines
  reports: /var/claimcheck/reports
orchestrator:
  channel_capacity: 8
  run_timeout_seconds: 90
limits:
  max_claim_bytes: 512
adjudicator:
  url: http://localhost:8900/adjudicate
report:
  base_url: https://claims.example
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(
            parsed.adjudicator,
            Some(AdjudicatorConfig::Http {
                url: "http://localhost:8900/adjudicate".to_string()
            })
        );

        let config = resolve(
            Some((config_path.clone(), parsed)),
            &no_env,
            PathBuf::from("/unused"),
        );

        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(config.reports_dir, PathBuf::from("/var/claimcheck/reports"));
        assert!(config.pipelines_dir.ends_with("pipelines"));
        assert_eq!(config.orchestrator.channel_capacity, 8);
        assert_eq!(config.orchestrator.run_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.orchestrator.limits.max_claim_bytes, 512);
        assert_eq!(config.base_url.as_deref(), Some("https://claims.example"));
    }

    #[test]
    fn test_env_overrides_file() {
        let parsed: ConfigFile = serde_yaml::from_str(
            r#"
version: "1.0"
paths:
  reports: /from/file
report:
  base_url: https://file.example
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("CLAIMCHECK_REPORTS", "/from/env"),
            ("CLAIMCHECK_BASE_URL", "https://env.example"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let config = resolve(
            Some((PathBuf::from("/proj/.claimcheck/config.yaml"), parsed)),
            &lookup,
            PathBuf::from("/unused"),
        );

        assert_eq!(config.reports_dir, PathBuf::from("/from/env"));
        assert_eq!(config.base_url.as_deref(), Some("https://env.example"));
    }

    #[test]
    fn test_command_adjudicator_config() {
        let parsed: AdjudicatorConfig =
            serde_yaml::from_str("command: claim-judge\nargs: [--strict]").unwrap();

        let spec = parsed.command_spec().unwrap();
        assert_eq!(spec.program, "claim-judge");
        assert_eq!(spec.args, vec!["--strict".to_string()]);
    }

    #[test]
    fn test_command_adjudicator_credentials() {
        let parsed: AdjudicatorConfig = serde_yaml::from_str(
            "command: claim-judge\ncredentials:\n  - name: generation\n    env: JUDGE_MODEL_KEY\n",
        )
        .unwrap();

        match parsed {
            AdjudicatorConfig::Command { credentials, .. } => {
                assert_eq!(credentials.len(), 1);
                assert_eq!(credentials[0].name, "generation");
                assert_eq!(credentials[0].env, "JUDGE_MODEL_KEY");
                assert!(!credentials[0].required);
            }
            other => panic!("unexpected adjudicator config: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
