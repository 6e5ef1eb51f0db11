//! DAG / Sequentially Dependent: topological scheduling with
//! `max concurrency = min(ready, max_concurrent_agents)`; a dependency
//! failure propagates SKIPPED to descendants.

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;

use waymark_core::AgentInput;
use waymark_types::{EventType, Usage};

use crate::dag::{propagate_skips, ready_set, validate};
use crate::subtask::{decompose_heuristic, Subtask, SubtaskStatus};

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

const DEFAULT_CAP: usize = 8;

/// Builds a simple linear chain from the heuristic decomposition: each
/// subtask depends on its predecessor. A real planner would emit an
/// arbitrary graph; the chain is the conservative default for a query whose
/// wording implies sequence (the Router only reaches this family when it
/// detected non-independent subtasks).
fn build_chain(query: &str) -> Vec<Subtask> {
    decompose_heuristic(query, DEFAULT_CAP)
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let deps = if i == 0 { vec![] } else { vec![i - 1] };
            Subtask::parse(i, q).with_dependencies(deps)
        })
        .collect()
}

pub async fn run(ctx: &WorkflowContext, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "dag"})).await;
    ctx.checkpoint_gate().await?;

    let mut subtasks = build_chain(query);
    validate(&subtasks).map_err(|e| WorkflowError::Validation(e.to_string()))?;

    let mut total_usage = Usage::default();
    loop {
        ctx.checkpoint_gate().await?;

        let ready = ready_set(&subtasks);
        if ready.is_empty() {
            break;
        }

        let batch: Vec<usize> = ready.into_iter().take(ctx.max_concurrent_agents.max(1)).collect();
        for &index in &batch {
            subtasks[index].status = SubtaskStatus::Running;
        }

        let mut futures = FuturesUnordered::new();
        for &index in &batch {
            let query = subtasks[index].query.clone();
            futures.push(async move { (index, run_one(ctx, index, &query).await) });
        }
        while let Some((index, result)) = futures.next().await {
            match result {
                Ok((output, usage)) => {
                    total_usage.add(&usage);
                    subtasks[index].status = SubtaskStatus::Completed;
                    subtasks[index].output = Some(output);
                }
                Err(err) => {
                    subtasks[index].status = SubtaskStatus::Failed;
                    subtasks[index].error = Some(err);
                }
            }
        }

        propagate_skips(&mut subtasks);
    }

    let failed: Vec<&Subtask> = subtasks.iter().filter(|s| s.status == SubtaskStatus::Failed && s.required).collect();
    if !failed.is_empty() {
        let reasons = failed.iter().map(|s| s.error.clone().unwrap_or_default()).collect::<Vec<_>>().join("; ");
        ctx.emit(EventType::WorkflowFailed, json!({"reason": reasons})).await;
        return Err(WorkflowError::AgentFailed(reasons));
    }

    let skipped: Vec<usize> = subtasks.iter().filter(|s| s.status == SubtaskStatus::Skipped).map(|s| s.index).collect();
    let synthesis = subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Completed)
        .map(|s| s.output.clone().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n\n");

    ctx.emit(EventType::WorkflowCompleted, json!({"subtasks": subtasks.len(), "tokens": total_usage.total_tokens})).await;
    Ok(WorkflowOutcome::new(synthesis, total_usage).with_metadata(json!({"skipped_subtasks": skipped})))
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
    Ok((output.output, output.usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Arc as StdArc;
    use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
    use waymark_providers::{ProviderRegistry, StubProvider};
    use waymark_tools::{ToolRegistry, Workspace};
    use waymark_types::Budget;

    async fn context(workflow_id: &str) -> WorkflowContext {
        let event_bus = StdArc::new(EventBus::new());
        let control = ControlStateStore::new();
        let providers = ProviderRegistry::new(vec![StdArc::new(StubProvider::new("stub", "step-done"))], None);
        let tools = ToolRegistry::with_defaults();
        let executor = StdArc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf());
        WorkflowContext::new(
            workflow_id,
            "task-0",
            event_bus,
            control,
            Budget::new(20, 100_000, 3600, 10),
            executor,
            workspace,
            2,
            None,
            InMemoryPersistence::new(),
        )
        .await
    }

    #[tokio::test]
    async fn sequential_subtasks_run_to_completion() {
        let ctx = context("wf-dag").await;
        let query = "fetch the repo, then build it, then run the tests";
        let outcome = run(&ctx, query).await.unwrap();
        assert!(outcome.output.unwrap().contains("step-done"));
    }
}
