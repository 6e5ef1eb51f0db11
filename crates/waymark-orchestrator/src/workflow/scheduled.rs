//! Scheduled: `trigger=schedule` tasks are dispatched by an
//! external cron engine (out of scope) and consumed here exactly like an
//! API-submitted task, tagged with `schedule_id`, with run statistics rolled
//! back into the schedule's counters on completion.

use serde_json::json;

use waymark_types::{EventType, Strategy};

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

pub async fn run(
    ctx: &WorkflowContext,
    query: &str,
    schedule_id: &str,
    inner_strategy: Strategy,
) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "scheduled", "schedule_id": schedule_id, "inner_strategy": inner_strategy.as_str()})).await;

    let result = super::dispatch(ctx, inner_strategy, query).await;

    match &result {
        Ok(_) => {
            let _ = ctx.persistence.record_schedule_run(schedule_id, true, None).await;
        }
        Err(err) => {
            let _ = ctx.persistence.record_schedule_run(schedule_id, false, Some(err.to_string())).await;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Arc;
    use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
    use waymark_providers::{ProviderRegistry, StubProvider};
    use waymark_tools::{ToolRegistry, Workspace};
    use waymark_types::memory::{ScheduledTask, ScheduledTaskStats, ScheduledTaskStatus, TaskTemplate};
    use waymark_types::Budget;

    #[tokio::test]
    async fn scheduled_run_tags_and_records_stats() {
        let event_bus = Arc::new(EventBus::new());
        let control = ControlStateStore::new();
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "digest"))], None);
        let tools = ToolRegistry::with_defaults();
        let executor = Arc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf());
        let persistence = InMemoryPersistence::new();
        persistence
            .save_scheduled_task(ScheduledTask {
                id: "sched-1".to_string(),
                owner: "user-1".to_string(),
                cron: "0 9 * * *".to_string(),
                timezone: "UTC".to_string(),
                task_template: TaskTemplate { query: "daily digest".to_string(), context: serde_json::json!({}) },
                budget_tokens: 10_000,
                timeout_s: 300,
                status: ScheduledTaskStatus::Active,
                next_run_at: chrono::Utc::now(),
                stats: ScheduledTaskStats::default(),
            })
            .await
            .unwrap();

        let ctx = WorkflowContext::new(
            "wf-scheduled",
            "task-0",
            event_bus,
            control,
            Budget::new(10, 100_000, 3600, 5),
            executor,
            workspace,
            4,
            None,
            persistence.clone() as Arc<dyn crate::persistence::PersistenceAdapter>,
        )
        .await;

        let outcome = run(&ctx, "daily digest", "sched-1", waymark_types::Strategy::SimpleTask).await.unwrap();
        assert_eq!(outcome.output.as_deref(), Some("digest"));

        let loaded = persistence.get_scheduled_task("sched-1").await.unwrap().unwrap();
        assert_eq!(loaded.stats.total_runs, 1);
        assert_eq!(loaded.stats.successful_runs, 1);
    }
}
