//! Command-line interface for claimcheck.
//!
//! Provides commands for verifying a claim (streaming or blocking),
//! inspecting configured pipelines, and showing the resolved configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{
    Adjudicator, CommandAdjudicator, CommandPipeline, FileReportSink, HttpAdjudicator, Pipeline,
    RunCredentials,
};
use crate::config::{self, AdjudicatorConfig, ResolvedConfig};
use crate::core::{ClaimRequest, CommandSpec, Orchestrator, PipelineDefinition, StreamPublisher};

/// claimcheck - Parallel claim verification with streamed progress
#[derive(Parser, Debug)]
#[command(name = "claimcheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify a claim with every configured pipeline
    Verify {
        /// The claim to verify
        claim: String,

        /// Print only the final payload instead of streaming frames
        #[arg(long)]
        no_stream: bool,

        /// Key for the text-generation service
        #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
        generation_key: Option<String>,

        /// Key for the web search service
        #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
        search_key: Option<String>,

        /// Do not write a report file
        #[arg(long)]
        no_report: bool,
    },

    /// List and validate configured pipelines
    Pipelines,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Verify {
                claim,
                no_stream,
                generation_key,
                search_key,
                no_report,
            } => {
                let credentials = RunCredentials {
                    generation_key,
                    search_key,
                };
                verify(claim, credentials, no_stream, no_report).await
            }
            Commands::Pipelines => list_pipelines(),
            Commands::Config => show_config(),
        }
    }
}

/// Assemble an orchestrator from configuration
pub fn build_orchestrator(config: &ResolvedConfig, with_report: bool) -> Result<Orchestrator> {
    let pipelines = PipelineDefinition::load_dir(&config.pipelines_dir)?
        .into_iter()
        .map(|definition| {
            CommandPipeline::new(definition).map(|p| Arc::new(p) as Arc<dyn Pipeline>)
        })
        .collect::<Result<Vec<_>>>()?;

    let adjudicator: Arc<dyn Adjudicator> = match config.adjudicator {
        AdjudicatorConfig::Http { ref url } => {
            Arc::new(HttpAdjudicator::new(url.clone(), config.adjudicator_timeout)?)
        }
        AdjudicatorConfig::Command {
            ref command,
            ref args,
            ref credentials,
        } => {
            let spec = CommandSpec {
                program: command.clone(),
                args: args.clone(),
            };
            let mut adjudicator = CommandAdjudicator::new(spec, config.adjudicator_timeout);
            if !credentials.is_empty() {
                adjudicator = adjudicator.with_credentials(credentials.clone());
            }
            Arc::new(adjudicator)
        }
    };

    let mut orchestrator =
        Orchestrator::new(pipelines, adjudicator).with_settings(config.orchestrator.clone());

    if with_report && config.report_enabled {
        let mut sink = FileReportSink::new(&config.reports_dir);
        if let Some(ref base_url) = config.base_url {
            sink = sink.with_base_url(base_url.clone());
        }
        orchestrator = orchestrator.with_sink(Arc::new(sink));
    }

    Ok(orchestrator)
}

/// Verify a claim, streaming frames to stdout or printing the final payload
async fn verify(
    claim: String,
    credentials: RunCredentials,
    no_stream: bool,
    no_report: bool,
) -> Result<()> {
    let config = config::config()?;
    let orchestrator = build_orchestrator(config, !no_report)?;
    let request = ClaimRequest::new(claim).with_credentials(credentials);

    if no_stream {
        let payload = orchestrator.verify(request).await?;
        let json = serde_json::to_string_pretty(&payload).context("Failed to encode payload")?;
        println!("{}", json);
        return Ok(());
    }

    let events = orchestrator.stream(request)?;
    let mut publisher = StreamPublisher::new(tokio::io::stdout());
    let frames = publisher.publish(events).await?;
    tracing::debug!(frames, "Stream finished");

    Ok(())
}

/// List configured pipelines
fn list_pipelines() -> Result<()> {
    let config = config::config()?;
    let definitions = PipelineDefinition::load_dir(&config.pipelines_dir)?;

    if definitions.is_empty() {
        println!("No pipelines found in {}", config.pipelines_dir.display());
        return Ok(());
    }

    println!(
        "{:<16} {:<12} {:<20} {:<8} {}",
        "ID", "SCHEMA", "RESULT KEY", "STAGES", "COMMAND"
    );
    println!("{}", "-".repeat(75));

    for definition in definitions {
        let command = definition
            .command
            .as_ref()
            .map(|c| c.program.as_str())
            .unwrap_or("-");
        println!(
            "{:<16} {:<12} {:<20} {:<8} {}",
            definition.id,
            format!("{:?}", definition.schema).to_lowercase(),
            definition.result_key,
            definition.stages.len(),
            command
        );
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Config file: {}", match config.config_file {
        Some(ref path) => path.display().to_string(),
        None => "(none, using defaults)".to_string(),
    });
    println!("Home:        {}", config.home.display());
    println!("Pipelines:   {}", config.pipelines_dir.display());
    println!("Reports:     {}", config.reports_dir.display());
    println!("Reports on:  {}", config.report_enabled);
    if let Some(ref base_url) = config.base_url {
        println!("Base URL:    {}", base_url);
    }
    match config.adjudicator {
        AdjudicatorConfig::Command { ref command, .. } => println!("Adjudicator: command '{}'", command),
        AdjudicatorConfig::Http { ref url } => println!("Adjudicator: http {}", url),
    }
    println!("\nOrchestrator:");
    println!("  channel_capacity: {}", config.orchestrator.channel_capacity);
    match config.orchestrator.run_timeout {
        Some(timeout) => println!("  run_timeout:      {:?}", timeout),
        None => println!("  run_timeout:      (none)"),
    }
    println!("  max_claim_bytes:  {}", config.orchestrator.limits.max_claim_bytes);

    Ok(())
}
