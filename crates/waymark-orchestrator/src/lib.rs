//! Complexity Analyzer & Router, the six workflow state machines, DAG
//! scheduling, Supervisor spawn policy, and persistence adapters.
//!
//! The entry point a caller actually drives is [`submit`]: it runs the
//! Router over a query, constructs a [`WorkflowContext`], and dispatches to
//! whichever workflow family the Router resolved, uniformly wrapping the
//! run with the `WorkflowStarted`/`WorkflowCompleted`/`WorkflowFailed`
//! lifecycle events every family already emits internally.

pub mod dag;
pub mod persistence;
pub mod router;
pub mod spawn_policy;
pub mod subtask;
pub mod workflow;

use std::sync::Arc;

use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
use waymark_memory::MemoryStore;
use waymark_tools::Workspace;
use waymark_types::{Budget, Strategy, Task, TaskError, TaskStatus, TaskTrigger};

use persistence::PersistenceAdapter;
use router::RouterOverrides;
use workflow::{WorkflowContext, WorkflowError, WorkflowOutcome};

/// Collaborators a caller (the `engine` binary, or any future transport
/// layer) wires up once per process and reuses across submissions.
#[derive(Clone)]
pub struct Orchestrator {
    pub event_bus: Arc<EventBus>,
    pub control: ControlStateStore,
    pub agent_executor: Arc<AgentExecutor>,
    pub persistence: Arc<dyn PersistenceAdapter>,
    pub memory: Option<Arc<MemoryStore>>,
    pub max_concurrent_agents: usize,
}

impl Orchestrator {
    pub fn new(
        event_bus: Arc<EventBus>,
        control: ControlStateStore,
        agent_executor: Arc<AgentExecutor>,
        persistence: Arc<dyn PersistenceAdapter>,
        memory: Option<Arc<MemoryStore>>,
    ) -> Self {
        Self { event_bus, control, agent_executor, persistence, memory, max_concurrent_agents: 4 }
    }

    /// Routes `query`, builds a fresh `WorkflowContext` scoped to
    /// `workflow_id`, and runs whichever workflow family the Router
    /// resolved to completion. Routing and execution are the two halves of
    /// one task submission. `user_id` scopes the post-run learning
    /// write-back (`StrategyPerformance` is keyed per user).
    pub async fn submit(
        &self,
        workflow_id: impl Into<String>,
        user_id: &str,
        query: &str,
        overrides: RouterOverrides,
        workspace: Workspace,
        budget: Budget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let workflow_id = workflow_id.into();
        let decision = router::analyze(query, &overrides, self.memory.as_deref()).await;

        let task = Task::new(workflow_id.clone(), user_id.to_string(), query.to_string(), TaskTrigger::Api);
        let task_id = task.id.clone();
        if let Err(err) = self.persistence.save_task(task).await {
            tracing::warn!(error = %err, %task_id, "failed to persist task on submit");
        }
        if let Err(err) = self.persistence.update_task_status(&task_id, TaskStatus::Running).await {
            tracing::warn!(error = %err, %task_id, "failed to record task as running");
        }

        let ctx = WorkflowContext::new(
            workflow_id.clone(),
            task_id.clone(),
            self.event_bus.clone(),
            self.control.clone(),
            budget,
            self.agent_executor.clone(),
            workspace,
            self.max_concurrent_agents,
            self.memory.clone(),
            self.persistence.clone(),
        )
        .await;

        ctx.emit(
            waymark_types::EventType::Analysis,
            serde_json::json!({
                "strategy": decision.strategy.as_str(),
                "complexity_score": decision.complexity_score,
                "rationale": decision.rationale,
                "degraded": decision.degraded,
            }),
        )
        .await;

        if decision.degraded {
            ctx.emit(
                waymark_types::EventType::DegradedRouting,
                serde_json::json!({"reason": "memory store unavailable, used rule-based score only"}),
            )
            .await;
        }

        let started = std::time::Instant::now();
        let result = workflow::dispatch(&ctx, decision.strategy, query).await;
        self.finish_task(&task_id, &result).await;
        self.record_learning(user_id, query, decision.strategy, &result, started.elapsed()).await;
        result
    }

    /// Transitions the persisted `Task` to its terminal status and records the
    /// run's output/usage/error. Best-effort, like `record_learning`.
    async fn finish_task(&self, task_id: &str, result: &Result<WorkflowOutcome, WorkflowError>) {
        let final_status = if result.is_ok() { TaskStatus::Completed } else { TaskStatus::Failed };
        if let Err(err) = self.persistence.update_task_status(task_id, final_status).await {
            tracing::warn!(error = %err, %task_id, "failed to record terminal task status");
        }
        match self.persistence.get_task(task_id).await {
            Ok(Some(mut task)) => {
                match result {
                    Ok(outcome) => {
                        task.result = outcome.output.clone();
                        task.usage = outcome.usage.clone();
                    }
                    Err(err) => {
                        task.error = Some(TaskError { code: "workflow_error".to_string(), message: err.to_string(), cause_chain: Vec::new() });
                    }
                }
                if let Err(err) = self.persistence.save_task(task).await {
                    tracing::warn!(error = %err, %task_id, "failed to persist task outcome");
                }
            }
            Ok(None) => tracing::warn!(%task_id, "task vanished before outcome could be recorded"),
            Err(err) => tracing::warn!(error = %err, %task_id, "failed to load task for outcome recording"),
        }
    }

    /// Best-effort cross-run learning write-back: rolls the run's outcome
    /// into the query's `DecompositionPattern` and the user's
    /// `StrategyPerformance`. Failures are logged, never surfaced — a
    /// broken memory store must not fail an otherwise-successful task.
    async fn record_learning(
        &self,
        user_id: &str,
        query: &str,
        strategy: Strategy,
        result: &Result<WorkflowOutcome, WorkflowError>,
        elapsed: std::time::Duration,
    ) {
        let Some(memory) = self.memory.as_deref() else { return };
        let succeeded = result.is_ok();
        let duration_ms = elapsed.as_millis() as u64;
        let tokens = result.as_ref().map(|o| o.usage.total_tokens).unwrap_or(0);

        let pattern_key = router::query_pattern_key(query);
        let pattern_update = async {
            let mut pattern = match memory.get_decomposition_pattern(&pattern_key).await? {
                Some(existing) => existing,
                None => waymark_types::memory::DecompositionPattern {
                    query_pattern: pattern_key.clone(),
                    subtasks: Vec::new(),
                    strategy,
                    success_rate: 0.0,
                    avg_duration_ms: 0.0,
                    total_runs: 0,
                    last_used: chrono::Utc::now(),
                },
            };
            pattern.record_run(succeeded, duration_ms);
            memory.upsert_decomposition_pattern(&pattern).await
        };
        if let Err(err) = pattern_update.await {
            tracing::warn!(error = %err, "failed to update decomposition pattern memory");
        }

        let perf_update = async {
            let mut perf = match memory.get_strategy_performance(user_id, strategy).await? {
                Some(existing) => existing,
                None => waymark_types::memory::StrategyPerformance::new(user_id.to_string(), strategy),
            };
            perf.record(succeeded, duration_ms, tokens, 0.0);
            memory.record_strategy_performance(&perf).await
        };
        if let Err(err) = perf_update.await {
            tracing::warn!(error = %err, "failed to update strategy performance memory");
        }

        let outcome_score = if succeeded { 1.0 } else { 0.0 };
        if let Err(err) = memory.record_case(query, strategy.as_str(), outcome_score).await {
            tracing::warn!(error = %err, "failed to record case for nearest-case retrieval");
        }
    }

    /// Runs a `schedule_id`-tagged task, delegating to whichever strategy
    /// `inner_strategy` names and rolling the outcome into the schedule's
    /// run statistics. `owner` is the schedule's owning user and scopes the
    /// learning write-back exactly like `submit`'s `user_id`.
    pub async fn submit_scheduled(
        &self,
        workflow_id: impl Into<String>,
        owner: &str,
        query: &str,
        schedule_id: &str,
        inner_strategy: Strategy,
        workspace: Workspace,
        budget: Budget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let workflow_id = workflow_id.into();
        let mut task = Task::new(workflow_id.clone(), owner.to_string(), query.to_string(), TaskTrigger::Schedule);
        task.schedule_id = Some(schedule_id.to_string());
        let task_id = task.id.clone();
        if let Err(err) = self.persistence.save_task(task).await {
            tracing::warn!(error = %err, %task_id, "failed to persist scheduled task on submit");
        }
        if let Err(err) = self.persistence.update_task_status(&task_id, TaskStatus::Running).await {
            tracing::warn!(error = %err, %task_id, "failed to record scheduled task as running");
        }

        let ctx = WorkflowContext::new(
            workflow_id,
            task_id.clone(),
            self.event_bus.clone(),
            self.control.clone(),
            budget,
            self.agent_executor.clone(),
            workspace,
            self.max_concurrent_agents,
            self.memory.clone(),
            self.persistence.clone(),
        )
        .await;

        let started = std::time::Instant::now();
        let result = workflow::scheduled::run(&ctx, query, schedule_id, inner_strategy).await;
        self.finish_task(&task_id, &result).await;
        self.record_learning(owner, query, inner_strategy, &result, started.elapsed()).await;
        result
    }
}
