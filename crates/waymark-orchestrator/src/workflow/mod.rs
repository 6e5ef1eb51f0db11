//! Shared workflow runtime: every family below — SimpleTask, Standard, Dag,
//! Supervisor, Research, Scheduled — is a function operating over the same
//! `WorkflowContext`, not a trait-object subtype hierarchy (`Strategy` is a
//! tagged enum, and so is the dispatch over it). Each still satisfies the
//! same capability set {run, checkpoint, on_pause, on_resume, on_cancel} by
//! funnelling every suspension point through `WorkflowContext::checkpoint_gate`,
//! generalizing a `permissions.rs` `wait_for_reply` pattern to
//! workflow-level granularity.

pub mod dag;
pub mod research;
pub mod scheduled;
pub mod simple_task;
pub mod standard;
pub mod supervisor;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use waymark_core::{AgentExecutor, Checkpoint, CheckpointOutcome, ControlStateStore, EventBus, TokenAccountant};
use waymark_memory::MemoryStore;
use waymark_tools::Workspace;
use waymark_types::{Budget, Event, EventType, Usage};

use crate::persistence::PersistenceAdapter;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("cancelled")]
    Cancelled,
    #[error("agent execution failed: {0}")]
    AgentFailed(String),
    #[error("unrecoverable error: {0}")]
    Unrecoverable(String),
}

#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub output: Option<String>,
    pub usage: Usage,
    pub metadata: serde_json::Value,
}

impl WorkflowOutcome {
    pub fn new(output: impl Into<String>, usage: Usage) -> Self {
        Self { output: Some(output.into()), usage, metadata: json!({}) }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Everything a workflow family needs to run one task: the shared core
/// primitives plus the orchestrator-level collaborators (agent executor,
/// workspace, memory, persistence).
pub struct WorkflowContext {
    pub workflow_id: String,
    pub task_id: String,
    pub event_bus: Arc<EventBus>,
    pub control: ControlStateStore,
    pub accountant: Arc<TokenAccountant>,
    pub checkpoint: Checkpoint,
    pub agent_executor: Arc<AgentExecutor>,
    pub workspace: Workspace,
    pub cancel: CancellationToken,
    pub max_concurrent_agents: usize,
    pub memory: Option<Arc<MemoryStore>>,
    pub persistence: Arc<dyn PersistenceAdapter>,
}

impl WorkflowContext {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        workflow_id: impl Into<String>,
        task_id: impl Into<String>,
        event_bus: Arc<EventBus>,
        control: ControlStateStore,
        budget: Budget,
        agent_executor: Arc<AgentExecutor>,
        workspace: Workspace,
        max_concurrent_agents: usize,
        memory: Option<Arc<MemoryStore>>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let accountant = Arc::new(TokenAccountant::new(workflow_id.clone(), budget, event_bus.clone()));
        let cancel = control.cancellation_token(&workflow_id).await;
        let checkpoint = Checkpoint::new(workflow_id.clone(), control.clone(), accountant.clone());
        Self {
            workflow_id,
            task_id: task_id.into(),
            event_bus,
            control,
            accountant,
            checkpoint,
            agent_executor,
            workspace,
            cancel,
            max_concurrent_agents,
            memory,
            persistence,
        }
    }

    /// Persists an `AgentExecution` row for a just-completed `agent_executor.execute`
    /// call, plus one `ToolExecution` row per tool the agent invoked along the way.
    /// Best-effort: a persistence failure is logged, never allowed to fail the run.
    pub async fn record_agent_run(
        &self,
        agent_id: &str,
        model: &str,
        input: &str,
        output: &waymark_core::AgentOutput,
    ) {
        let mut execution = waymark_types::AgentExecution::new(
            self.workflow_id.clone(),
            self.task_id.clone(),
            agent_id.to_string(),
            input.to_string(),
            model.to_string(),
        );
        execution.state = output.state_trace.last().copied().unwrap_or(execution.state);
        execution.output = Some(output.output.clone());
        execution.tokens = output.usage.clone();
        if let Err(err) = self.persistence.save_agent_execution(execution).await {
            tracing::warn!(error = %err, agent_id, "failed to persist agent execution");
        }
        for tool_execution in &output.tool_executions {
            if let Err(err) = self.persistence.save_tool_execution(tool_execution.clone()).await {
                tracing::warn!(error = %err, tool = %tool_execution.tool_name, "failed to persist tool execution");
            }
        }
    }

    pub async fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        self.event_bus.publish(Event::new(self.workflow_id.clone(), event_type, payload)).await;
    }

    /// The single suspension-point primitive every workflow family calls
    /// before an LLM/tool call, before subtask fan-out, and at the top of
    /// each loop iteration. Surfaces pause/resume/cancel as events so the
    /// capability set is observable the same way for every family.
    pub async fn checkpoint_gate(&self) -> Result<(), WorkflowError> {
        let was_paused = self.control.snapshot(&self.workflow_id).await.is_paused;
        if was_paused {
            self.emit(EventType::WorkflowPausing, json!({})).await;
            self.emit(EventType::WorkflowPaused, json!({})).await;
        }
        match self.checkpoint.enter().await {
            Ok(()) => {
                if was_paused {
                    self.emit(EventType::WorkflowResumed, json!({})).await;
                }
                Ok(())
            }
            Err(CheckpointOutcome::Cancelled) => {
                self.emit(EventType::WorkflowCancelling, json!({})).await;
                self.emit(EventType::WorkflowCancelled, json!({})).await;
                Err(WorkflowError::Cancelled)
            }
            Err(CheckpointOutcome::BudgetExceeded(reason)) => Err(WorkflowError::BudgetExceeded(reason)),
        }
    }
}

/// Central `Strategy` dispatcher: the one place that knows how a resolved
/// routing decision maps onto a workflow family's `run` entry point. Kept
/// as a free function (not a method on an enum) so `Strategy` itself stays
/// a plain data tag, dispatched as a tagged union rather than through
/// subtyping.
pub async fn dispatch(ctx: &WorkflowContext, strategy: waymark_types::Strategy, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    match strategy {
        waymark_types::Strategy::SimpleTask => simple_task::run(ctx, query).await,
        waymark_types::Strategy::Standard => standard::run(ctx, query).await,
        waymark_types::Strategy::Dag => dag::run(ctx, query).await,
        waymark_types::Strategy::Supervisor => supervisor::run(ctx, query).await,
        waymark_types::Strategy::Research => research::run(ctx, query).await,
        waymark_types::Strategy::Scheduled => {
            Err(WorkflowError::Validation("scheduled strategy must be run via workflow::scheduled::run with a schedule_id".to_string()))
        }
    }
}
