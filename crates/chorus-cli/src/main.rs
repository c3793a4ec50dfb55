//! `chorus` - run prompts across a team of local models
//!
//! ```bash
//! # Ask the whole team
//! chorus ask "How do I sort a list in Python?"
//!
//! # Restrict the team and print the full result
//! chorus ask --workers phi3:mini,mistral:latest --json "Explain borrowing"
//!
//! # Check the backend and time a test prompt
//! chorus diagnose
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chorus_cli::config::RunnerConfig;
use chorus_cli::context::FileContext;
use chorus_cli::telemetry::JsonlSink;
use chorus_coordination::ensemble::{DiscardSink, NoContext};
use chorus_coordination::{
    ContextProvider, OllamaBackend, ResponseSink, RunResult, TeamOrchestrator,
};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with `[engine]` settings and `[[workers]]` tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append one JSON line per completed run to this file
    #[arg(long, global = true)]
    telemetry: Option<PathBuf>,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a prompt across the team and print the consensus answer
    Ask {
        prompt: String,

        /// File whose contents are prepended as context
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Comma-separated worker ids to use instead of automatic selection
        #[arg(long, value_delimiter = ',')]
        workers: Option<Vec<String>>,

        /// Print the full run result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check backend reachability and grade worker latency
    Diagnose,
    /// Send one health probe to a worker
    Probe { worker: String },
    /// Preload the warm tier and print the team snapshot
    Stats,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = RunnerConfig::load(args.config.as_deref())?;
    info!(
        backend = %config.backend_url,
        workers = config.catalog.len(),
        "chorus starting"
    );

    let backend = OllamaBackend::new(&config.backend_url)
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
    let orchestrator = TeamOrchestrator::new(config.catalog, Arc::new(backend), config.engine);

    match args.command {
        Command::Ask {
            prompt,
            context_file,
            workers,
            json,
        } => {
            let result = ask(
                &orchestrator,
                &prompt,
                context_file,
                workers,
                args.telemetry,
            )
            .await?;
            if json {
                print_json(&result)?;
            } else {
                println!("{}", result.consensus.candidate.text);
            }
        }
        Command::Diagnose => {
            let health = orchestrator.diagnose_backend_health().await;
            let performance = if health.healthy {
                Some(orchestrator.diagnose_performance().await)
            } else {
                None
            };
            print_json(&serde_json::json!({
                "backend": health,
                "performance": performance,
            }))?;
        }
        Command::Probe { worker } => {
            if !orchestrator.catalog().contains(&worker) {
                anyhow::bail!("Unknown worker: {worker}");
            }
            let healthy = orchestrator.probe_health(&worker).await;
            println!("{worker}: {}", if healthy { "healthy" } else { "unhealthy" });
            if !healthy {
                std::process::exit(1);
            }
        }
        Command::Stats => {
            orchestrator.initialize().await;
            print_json(&orchestrator.team_stats().await)?;
        }
    }

    Ok(())
}

async fn ask(
    orchestrator: &TeamOrchestrator,
    prompt: &str,
    context_file: Option<PathBuf>,
    workers: Option<Vec<String>>,
    telemetry: Option<PathBuf>,
) -> Result<RunResult> {
    let provider: Box<dyn ContextProvider> = match context_file {
        Some(path) => Box::new(FileContext::new(path)),
        None => Box::new(NoContext),
    };
    let sink: Box<dyn ResponseSink> = match telemetry {
        Some(path) => Box::new(JsonlSink::new(path)),
        None => Box::new(DiscardSink),
    };

    orchestrator.initialize().await;

    let result = match workers {
        None => orchestrator.respond(prompt, provider.as_ref(), sink.as_ref()).await?,
        Some(subset) => {
            let context = provider.get_context(prompt).await;
            let result = orchestrator
                .run_team_request(prompt, Some(&context), Some(&subset))
                .await?;
            sink.deliver(&result);
            result
        }
    };
    Ok(result)
}
