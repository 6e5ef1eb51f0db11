//! Standard / Parallel: independent subtasks fanned out concurrently,
//! aggregated by ordered concatenation keyed by subtask index.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use tokio::sync::Semaphore;

use waymark_core::AgentInput;
use waymark_types::{Event, EventType, Usage};

use crate::subtask::{decompose_heuristic, Subtask, SubtaskStatus};

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

const DEFAULT_CAP: usize = 8;

pub async fn run(ctx: &WorkflowContext, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "standard"})).await;
    ctx.checkpoint_gate().await?;

    let mut subtasks: Vec<Subtask> = decompose_heuristic(query, DEFAULT_CAP)
        .into_iter()
        .enumerate()
        .map(|(i, q)| Subtask::parse(i, q))
        .collect();

    ctx.checkpoint_gate().await?;

    let results = fan_out(ctx, &subtasks).await?;
    let mut total_usage = Usage::default();
    for (index, result) in results {
        let subtask = &mut subtasks[index];
        match result {
            Ok((output, usage)) => {
                total_usage.add(&usage);
                subtask.status = SubtaskStatus::Completed;
                subtask.output = Some(output);
            }
            Err(err) => {
                subtask.status = SubtaskStatus::Failed;
                subtask.error = Some(err);
            }
        }
    }

    let failed_required: Vec<&Subtask> =
        subtasks.iter().filter(|s| s.required && s.status == SubtaskStatus::Failed).collect();
    if !failed_required.is_empty() {
        let reasons = failed_required.iter().map(|s| s.error.clone().unwrap_or_default()).collect::<Vec<_>>().join("; ");
        ctx.emit(EventType::WorkflowFailed, json!({"reason": reasons})).await;
        return Err(WorkflowError::AgentFailed(reasons));
    }

    let synthesis = subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Completed)
        .map(|s| s.output.clone().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n\n");

    let omitted: Vec<usize> = subtasks
        .iter()
        .filter(|s| !s.required && s.status == SubtaskStatus::Failed)
        .map(|s| s.index)
        .collect();

    ctx.emit(EventType::WorkflowCompleted, json!({"subtasks": subtasks.len(), "tokens": total_usage.total_tokens})).await;
    Ok(WorkflowOutcome::new(synthesis, total_usage).with_metadata(json!({"omitted_subtasks": omitted})))
}

async fn fan_out(
    ctx: &WorkflowContext,
    subtasks: &[Subtask],
) -> Result<Vec<(usize, Result<(String, Usage), String>)>, WorkflowError> {
    ctx.emit(EventType::Progress, json!({"fan_out": subtasks.len()})).await;

    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrent_agents.max(1)));
    let mut futures = FuturesUnordered::new();
    for subtask in subtasks {
        let index = subtask.index;
        let query = subtask.query.clone();
        let ctx_ref = ctx;
        let semaphore = semaphore.clone();
        futures.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            (index, run_one(ctx_ref, index, &query).await)
        });
    }

    let mut results = Vec::with_capacity(subtasks.len());
    while let Some(item) = futures.next().await {
        results.push(item);
    }
    results.sort_by_key(|(index, _)| *index);
    Ok(results)
}

async fn run_one(ctx: &WorkflowContext, index: usize, query: &str) -> Result<(String, Usage), String> {
    ctx.checkpoint_gate().await.map_err(|e| e.to_string())?;
    let agent_id = format!("agent-{index}");
    let input = AgentInput::new(agent_id.clone(), ctx.workflow_id.clone(), query);
    let model_hint = input.model_hint.clone().unwrap_or_else(|| "default".to_string());
    let output = ctx
        .agent_executor
        .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| e.to_string())?;
    ctx.record_agent_run(&agent_id, &model_hint, query, &output).await;
    ctx.event_bus
        .publish(Event::new(ctx.workflow_id.clone(), EventType::Delegation, json!({"subtask": index})).with_agent(agent_id))
        .await;
    Ok((output.output, output.usage))
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
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "done"))], None);
        let tools = ToolRegistry::with_defaults();
        let executor = Arc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf());
        WorkflowContext::new(
            workflow_id,
            "task-0",
            event_bus,
            control,
            Budget::new(10, 100_000, 3600, 5),
            executor,
            workspace,
            4,
            None,
            InMemoryPersistence::new(),
        )
        .await
    }

    #[tokio::test]
    async fn independent_subtasks_are_aggregated_in_order() {
        let ctx = context("wf-standard").await;
        let outcome = run(&ctx, "fetch the changelog and summarize it and email the team").await.unwrap();
        assert!(outcome.output.unwrap().contains("done"));
    }
}
