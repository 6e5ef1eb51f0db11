//! SimpleTask: a single agent, no subtasks.

use serde_json::json;

use waymark_core::AgentInput;
use waymark_types::EventType;

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

pub async fn run(ctx: &WorkflowContext, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "simple_task"})).await;
    ctx.checkpoint_gate().await?;

    let input = AgentInput::new("agent-0", ctx.workflow_id.clone(), query);
    let model_hint = input.model_hint.clone().unwrap_or_else(|| "default".to_string());
    let output = ctx
        .agent_executor
        .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
    ctx.record_agent_run("agent-0", &model_hint, query, &output).await;

    ctx.emit(EventType::WorkflowCompleted, json!({"tokens": output.usage.total_tokens})).await;
    Ok(WorkflowOutcome::new(output.output, output.usage))
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
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "42"))], None);
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
    async fn simple_task_returns_the_agent_output() {
        let ctx = context("wf-simple").await;
        let outcome = run(&ctx, "what is 6*7?").await.unwrap();
        assert_eq!(outcome.output.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn cancelled_workflow_short_circuits() {
        let ctx = context("wf-cancel").await;
        ctx.control.cancel("wf-cancel", Some("stop".to_string()), None).await;
        let err = run(&ctx, "anything").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));
    }
}
