//! Supervisor / Hierarchical: a supervisor agent plans, delegates to worker
//! agents, and may recruit/retire team members at runtime through the
//! idempotent `TeamRoster` gate, grounded in `agent_team.rs`'s
//! `SpawnPolicy::evaluate`, simplified to team-size/round bounds.

use serde_json::json;

use waymark_core::AgentInput;
use waymark_types::{Event, EventType, Usage};

use crate::spawn_policy::{agent_description_hash, TeamRoster};
use crate::subtask::decompose_heuristic;

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

const DEFAULT_CAP: usize = 8;

pub async fn run(ctx: &WorkflowContext, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "supervisor"})).await;
    ctx.checkpoint_gate().await?;

    let mut roster = TeamRoster::default_bounds();
    let worker_queries = decompose_heuristic(query, DEFAULT_CAP);
    let mut worker_outputs = Vec::with_capacity(worker_queries.len());
    let mut total_usage = Usage::default();

    loop {
        ctx.checkpoint_gate().await?;
        let round = match roster.advance_round() {
            Ok(round) => round,
            Err(_) => break,
        };

        let pending: Vec<(usize, &String)> = worker_queries
            .iter()
            .enumerate()
            .skip(worker_outputs.len())
            .take(roster_capacity_for_round(&roster))
            .collect();
        if pending.is_empty() {
            break;
        }

        for (index, worker_query) in pending {
            ctx.checkpoint_gate().await?;
            let role = "worker";
            let key = agent_description_hash(role, worker_query);
            let decision = roster.evaluate_recruit(&key);
            let agent_id = format!("worker-{index}");

            if !decision.allowed {
                ctx.emit(EventType::TeamDenied, json!({"role": role, "agent_key": key, "round": round, "reason": decision.reason})).await;
                continue;
            }

            roster.record_recruit(key.clone());
            ctx.emit(EventType::TeamRecruited, json!({"role": role, "agent_key": key, "round": round})).await;

            let input = AgentInput::new(agent_id.clone(), ctx.workflow_id.clone(), worker_query.clone());
            let model_hint = input.model_hint.clone().unwrap_or_else(|| "default".to_string());
            let output = ctx
                .agent_executor
                .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
                .await
                .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
            ctx.record_agent_run(&agent_id, &model_hint, worker_query, &output).await;
            total_usage.add(&output.usage);
            worker_outputs.push(output.output);

            roster.record_retire(&agent_id);
            ctx.emit(EventType::TeamRetired, json!({"agent_id": agent_id, "round": round})).await;
        }

        if worker_outputs.len() >= worker_queries.len() {
            break;
        }
    }

    let synthesis_input = format!(
        "Synthesize a final answer for the request \"{query}\" from these worker findings:\n{}",
        worker_outputs.join("\n---\n")
    );
    let synthesis_agent = AgentInput::new("supervisor-synthesis", ctx.workflow_id.clone(), synthesis_input.clone());
    let synthesis = ctx
        .agent_executor
        .execute(synthesis_agent, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
    ctx.record_agent_run("supervisor-synthesis", "default", &synthesis_input, &synthesis).await;
    total_usage.add(&synthesis.usage);

    ctx.event_bus
        .publish(Event::new(ctx.workflow_id.clone(), EventType::Synthesis, json!({"worker_count": worker_outputs.len()})))
        .await;
    ctx.emit(EventType::WorkflowCompleted, json!({"team_size": roster.active_count(), "tokens": total_usage.total_tokens})).await;

    Ok(WorkflowOutcome::new(synthesis.output, total_usage))
}

fn roster_capacity_for_round(_roster: &TeamRoster) -> usize {
    // Caps how many workers are considered per round; `evaluate_recruit`'s
    // max-team-size/round bounds still decide which of those actually run.
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Arc;
    use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
    use waymark_providers::{ProviderRegistry, StubProvider};
    use waymark_tools::{ToolRegistry, Workspace};
    use waymark_types::Budget;

    async fn context(workflow_id: &str) -> WorkflowContext {
        let event_bus = Arc::new(EventBus::new());
        let control = ControlStateStore::new();
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "worker-result"))], None);
        let tools = ToolRegistry::with_defaults();
        let executor = Arc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf());
        WorkflowContext::new(
            workflow_id,
            "task-0",
            event_bus,
            control,
            Budget::new(40, 200_000, 3600, 20),
            executor,
            workspace,
            4,
            None,
            InMemoryPersistence::new(),
        )
        .await
    }

    #[tokio::test]
    async fn supervisor_delegates_and_synthesizes() {
        let ctx = context("wf-supervisor").await;
        let query = "audit the repo and fix the bug and write a changelog entry";
        let outcome = run(&ctx, query).await.unwrap();
        assert!(outcome.output.is_some());
    }
}
