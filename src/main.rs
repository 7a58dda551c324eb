use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use maestro::api::{serve, AppState};
use maestro::ingest::DocumentProcessor;
use maestro::orchestrator::{Orchestrator, OrchestratorConfig};
use maestro::providers::{GroqProvider, LlmProvider};
use maestro::storage::{InMemoryStore, PostgresStorage, Storage};
use maestro::types::{AgentKind, Workflow, WorkflowStep};
use maestro::Config;

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Multi-agent task orchestration platform", long_about = None)]
#[command(version)]
struct Cli {
    /// Optional TOML config file; environment variables take precedence
    #[arg(long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Submit a single task and print the reply
    Task {
        #[arg(help = "Agent kind: research, analyst, coding, or document")]
        kind: String,
        #[arg(help = "Task prompt")]
        prompt: String,
    },
    /// Run a workflow definition from a YAML file
    Workflow {
        #[arg(help = "Path to a workflow YAML file")]
        file: PathBuf,
    },
}

#[derive(serde::Deserialize)]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    description: String,
    steps: Vec<WorkflowStep>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Task { kind, prompt } => run_task(config, &kind, &prompt).await?,
        Commands::Workflow { file } => run_workflow_file(config, &file).await?,
    }

    Ok(())
}

async fn build_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match &config.database_url {
        Some(url) => {
            let storage = PostgresStorage::new(url).await.context("database connect")?;
            storage.run_migrations().await.context("run migrations")?;
            Ok(Arc::new(storage))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn build_llm(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let api_key = config
        .groq_api_key
        .clone()
        .context("GROQ_API_KEY is not set")?;
    Ok(Arc::new(
        GroqProvider::new(api_key)
            .with_model(config.model.clone())
            .with_retry(config.llm_max_retries, config.retry_backoff())
            .with_timeout(config.llm_timeout()),
    ))
}

async fn build_orchestrator(config: &Config) -> Result<(Arc<Orchestrator>, Arc<dyn Storage>)> {
    let storage = build_storage(config).await?;
    let llm = build_llm(config)?;
    let orchestrator = Arc::new(Orchestrator::new(
        storage.clone(),
        llm,
        OrchestratorConfig {
            max_concurrent_tasks: config.max_concurrent_tasks,
        },
    ));
    orchestrator.initialize().await?;
    Ok((orchestrator, storage))
}

async fn run_server(config: Config) -> Result<()> {
    let (orchestrator, storage) = build_orchestrator(&config).await?;

    let state = AppState {
        orchestrator: orchestrator.clone(),
        storage,
        processor: DocumentProcessor::new(config.chunk_size, config.chunk_overlap),
        top_k: config.top_k,
    };

    let host = config.host.clone();
    let port = config.port;
    let interval = std::time::Duration::from_secs(config.metrics_interval_secs.max(1));

    tokio::select! {
        result = serve(state, &host, port, interval) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            orchestrator.shutdown().await?;
        }
    }

    Ok(())
}

async fn run_task(config: Config, kind: &str, prompt: &str) -> Result<()> {
    let kind = AgentKind::parse(kind)
        .with_context(|| format!("unknown agent kind: {kind} (expected research, analyst, coding, or document)"))?;

    let (orchestrator, _storage) = build_orchestrator(&config).await?;
    let outcome = orchestrator.submit(kind, prompt, json!({})).await?;

    println!("task {} finished: {}", outcome.task.id, outcome.task.status.as_str());
    if let Some(reply) = outcome.reply {
        println!("confidence: {:.2}\n\n{}", reply.confidence, reply.response);
    } else if let Some(error) = outcome.task.error {
        println!("error: {error}");
    }

    Ok(())
}

async fn run_workflow_file(config: Config, file: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read workflow file {}", file.display()))?;
    let definition: WorkflowFile = serde_yaml::from_str(&raw).context("parse workflow YAML")?;

    let workflow = Workflow::new(definition.name, definition.description, definition.steps);
    workflow.validate()?;

    let (orchestrator, storage) = build_orchestrator(&config).await?;
    storage.create_workflow(&workflow).await?;

    let run = orchestrator.run_workflow(workflow.id).await?;
    println!("workflow run {} finished: {}", run.id, run.status.as_str());

    for result in &run.step_results {
        println!("\n== step {} [{}] ==", result.step_id, result.status.as_str());
        if let Some(response) = &result.response {
            println!("{response}");
        }
        if let Some(error) = &result.error {
            println!("error: {error}");
        }
    }
    if let Some(summary) = &run.summary {
        println!("\n== summary ==\n{summary}");
    }

    Ok(())
}
