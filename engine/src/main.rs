//! Headless process wiring and CLI smoke-test entry point; no HTTP server.
//! `run <query>` builds the same in-process collaborators a transport layer
//! would, submits the query through the orchestrator, and prints the
//! streamed lifecycle events plus the final output — enough to exercise the
//! whole stack end to end without a live LLM or sandbox.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
use waymark_memory::MemoryStore;
use waymark_observability::{init_process_logging, ProcessKind};
use waymark_orchestrator::persistence::InMemoryPersistence;
use waymark_orchestrator::router::RouterOverrides;
use waymark_orchestrator::Orchestrator;
use waymark_providers::{ProviderRegistry, StubProvider};
use waymark_tools::{ToolRegistry, Workspace};
use waymark_types::Budget;
use waymark_wire::{sse_event_name, SseEnvelope};

use config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "waymark-engine")]
#[command(about = "Headless Waymark workflow engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submits `query` as a single task and runs it to completion in-process.
    Run {
        query: String,
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state_dir = resolve_state_dir(None);
    let logs_dir = waymark_observability::canonical_logs_dir_from_root(&state_dir);
    let _guard = init_process_logging(ProcessKind::Engine, &logs_dir, 14)
        .map(|(guard, info)| {
            tracing::info!(logs_dir = %info.logs_dir, "engine logging initialized");
            guard
        })
        .ok();

    let config = EngineConfig::from_env().context("loading WAYMARK_ environment configuration")?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run { query, state_dir: override_dir } => {
            let state_dir = override_dir.unwrap_or(state_dir);
            run_query(&config, &state_dir, &query).await?;
        }
    }

    Ok(())
}

fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("WAYMARK_STATE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(".waymark")
}

async fn run_query(config: &EngineConfig, state_dir: &PathBuf, query: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(state_dir).context("creating state dir")?;
    let workspace_root = state_dir.join("workspace");
    std::fs::create_dir_all(&workspace_root).context("creating workspace dir")?;

    let event_bus = Arc::new(EventBus::with_log_dir(state_dir.join("events")));
    let control = ControlStateStore::new();
    let providers = ProviderRegistry::new(
        vec![Arc::new(StubProvider::new(
            "stub",
            "This is a stand-in response: the engine binary has no real LLM provider wired in.",
        ))],
        None,
    );
    let tools = ToolRegistry::with_defaults();
    let agent_executor = Arc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
    let memory = MemoryStore::open_in_memory().ok().map(Arc::new);
    let persistence = InMemoryPersistence::new();

    let orchestrator = Orchestrator::new(event_bus.clone(), control, agent_executor, persistence, memory);

    let workflow_id = format!("wf-{}", uuid::Uuid::new_v4());
    let mut events = event_bus.subscribe(&workflow_id).await;
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let envelope = SseEnvelope {
                workflow_id: event.workflow_id.clone(),
                event_type: event.event_type,
                seq: event.seq,
                timestamp: event.timestamp,
                agent_id: event.agent_id.clone(),
                message: event.message.clone(),
                payload: Some(event.payload.clone()),
            };
            println!("[{}] {}", sse_event_name(envelope.event_type), serde_json::to_string(&envelope).unwrap_or_default());
        }
    });

    let budget = Budget::new(config.budget_max_iterations, config.budget_max_tokens, config.budget_max_wall_time_secs, 20);
    let workspace = Workspace::new(workspace_root);

    let outcome = orchestrator
        .submit(workflow_id, "cli-user", query, RouterOverrides::default(), workspace, budget)
        .await;

    // Give the printer a moment to drain the terminal events before we exit.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    printer.abort();

    match outcome {
        Ok(result) => {
            println!("---");
            println!("{}", result.output.unwrap_or_default());
            Ok(())
        }
        Err(err) => {
            eprintln!("workflow failed: {err}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_state_dir() {
        std::env::remove_var("WAYMARK_STATE_DIR");
        assert_eq!(resolve_state_dir(None), PathBuf::from(".waymark"));
    }

    #[test]
    fn explicit_flag_wins_over_env() {
        assert_eq!(resolve_state_dir(Some("/tmp/custom".to_string())), PathBuf::from("/tmp/custom"));
    }
}
