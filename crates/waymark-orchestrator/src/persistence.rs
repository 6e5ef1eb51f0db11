//! Persistence Adapters: durable storage for `Task`, `AgentExecution`, and
//! `ToolExecution` records, queried back for history and analytics. The
//! durable event log itself (`(workflow_id, seq)` uniqueness, `since_seq`
//! resume) is `waymark_core::EventBus`'s JSONL log, generalized from
//! `src-tauri/orchestrator/store.rs`'s `append_run_event`/`load_run_events`;
//! this module is the sibling adapter for the three record kinds that event
//! log doesn't itself model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use waymark_types::memory::ScheduledTask;
use waymark_types::{AgentExecution, Task, TaskStatus, ToolExecution};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("scheduled task not found: {0}")]
    ScheduledTaskNotFound(String),
    #[error("invalid status transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition { task_id: String, from: TaskStatus, to: TaskStatus },
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save_task(&self, task: Task) -> Result<(), PersistenceError>;
    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), PersistenceError>;
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, PersistenceError>;
    async fn list_tasks_for_workflow(&self, workflow_id: &str) -> Result<Vec<Task>, PersistenceError>;

    async fn save_agent_execution(&self, execution: AgentExecution) -> Result<(), PersistenceError>;
    async fn list_agent_executions(&self, workflow_id: &str) -> Result<Vec<AgentExecution>, PersistenceError>;

    async fn save_tool_execution(&self, execution: ToolExecution) -> Result<(), PersistenceError>;
    async fn list_tool_executions(&self, workflow_id: &str) -> Result<Vec<ToolExecution>, PersistenceError>;

    async fn save_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError>;
    async fn get_scheduled_task(&self, schedule_id: &str) -> Result<Option<ScheduledTask>, PersistenceError>;
    /// Rolls the run outcome into the schedule's `ScheduledTaskStats` counters.
    async fn record_schedule_run(&self, schedule_id: &str, succeeded: bool, error: Option<String>) -> Result<(), PersistenceError>;
}

/// Process-local adapter. A real deployment would back this with the same
/// SQLite-blob-in-column approach `waymark-memory` uses; kept in-memory here
/// since the storage binding itself is an external collaborator, and the
/// seam (the trait above) is what this crate needs to own.
#[derive(Default)]
pub struct InMemoryPersistence {
    tasks: RwLock<HashMap<String, Task>>,
    agent_executions: RwLock<HashMap<String, Vec<AgentExecution>>>,
    tool_executions: RwLock<HashMap<String, Vec<ToolExecution>>>,
    scheduled_tasks: RwLock<HashMap<String, ScheduledTask>>,
}

impl InMemoryPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn save_task(&self, task: Task) -> Result<(), PersistenceError> {
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), PersistenceError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(task_id).ok_or_else(|| PersistenceError::TaskNotFound(task_id.to_string()))?;
        let from = task.status;
        task.transition(status).map_err(|_| PersistenceError::InvalidTransition {
            task_id: task_id.to_string(),
            from,
            to: status,
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, PersistenceError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn list_tasks_for_workflow(&self, workflow_id: &str) -> Result<Vec<Task>, PersistenceError> {
        Ok(self.tasks.read().await.values().filter(|t| t.workflow_id == workflow_id).cloned().collect())
    }

    async fn save_agent_execution(&self, execution: AgentExecution) -> Result<(), PersistenceError> {
        self.agent_executions.write().await.entry(execution.workflow_id.clone()).or_default().push(execution);
        Ok(())
    }

    async fn list_agent_executions(&self, workflow_id: &str) -> Result<Vec<AgentExecution>, PersistenceError> {
        Ok(self.agent_executions.read().await.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn save_tool_execution(&self, execution: ToolExecution) -> Result<(), PersistenceError> {
        self.tool_executions.write().await.entry(execution.workflow_id.clone()).or_default().push(execution);
        Ok(())
    }

    async fn list_tool_executions(&self, workflow_id: &str) -> Result<Vec<ToolExecution>, PersistenceError> {
        Ok(self.tool_executions.read().await.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn save_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError> {
        self.scheduled_tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_scheduled_task(&self, schedule_id: &str) -> Result<Option<ScheduledTask>, PersistenceError> {
        Ok(self.scheduled_tasks.read().await.get(schedule_id).cloned())
    }

    async fn record_schedule_run(&self, schedule_id: &str, succeeded: bool, error: Option<String>) -> Result<(), PersistenceError> {
        let mut tasks = self.scheduled_tasks.write().await;
        let task = tasks
            .get_mut(schedule_id)
            .ok_or_else(|| PersistenceError::ScheduledTaskNotFound(schedule_id.to_string()))?;
        task.stats.total_runs += 1;
        if succeeded {
            task.stats.successful_runs += 1;
        } else {
            task.stats.last_error = error;
        }
        task.stats.last_run_at = Some(chrono::Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_types::TaskTrigger;

    fn sample_task(workflow_id: &str) -> Task {
        Task::new(workflow_id.to_string(), "user-1".to_string(), "do something".to_string(), TaskTrigger::Api)
    }

    #[tokio::test]
    async fn saved_task_round_trips() {
        let store = InMemoryPersistence::new();
        let task = sample_task("wf-1");
        let id = task.id.clone();
        store.save_task(task).await.unwrap();
        let loaded = store.get_task(&id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
    }

    #[tokio::test]
    async fn status_transition_is_enforced() {
        let store = InMemoryPersistence::new();
        let task = sample_task("wf-1");
        let id = task.id.clone();
        store.save_task(task).await.unwrap();
        store.update_task_status(&id, TaskStatus::Running).await.unwrap();
        let err = store.update_task_status(&id, TaskStatus::Pending).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn agent_executions_are_scoped_per_workflow() {
        let store = InMemoryPersistence::new();
        let exec = AgentExecution::new("wf-1".to_string(), "task-1".to_string(), "agent-1".to_string(), "in".to_string(), "model".to_string());
        store.save_agent_execution(exec).await.unwrap();
        assert_eq!(store.list_agent_executions("wf-1").await.unwrap().len(), 1);
        assert_eq!(store.list_agent_executions("wf-2").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn schedule_run_stats_accumulate() {
        use waymark_types::memory::{ScheduledTaskStats, ScheduledTaskStatus, TaskTemplate};

        let store = InMemoryPersistence::new();
        let task = ScheduledTask {
            id: "sched-1".to_string(),
            owner: "user-1".to_string(),
            cron: "0 * * * *".to_string(),
            timezone: "UTC".to_string(),
            task_template: TaskTemplate { query: "daily digest".to_string(), context: serde_json::json!({}) },
            budget_tokens: 10_000,
            timeout_s: 300,
            status: ScheduledTaskStatus::Active,
            next_run_at: chrono::Utc::now(),
            stats: ScheduledTaskStats::default(),
        };
        store.save_scheduled_task(task).await.unwrap();

        store.record_schedule_run("sched-1", true, None).await.unwrap();
        store.record_schedule_run("sched-1", false, Some("timeout".to_string())).await.unwrap();

        let loaded = store.get_scheduled_task("sched-1").await.unwrap().unwrap();
        assert_eq!(loaded.stats.total_runs, 2);
        assert_eq!(loaded.stats.successful_runs, 1);
        assert_eq!(loaded.stats.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn event_log_seq_is_unique_per_workflow_and_resumable() {
        use waymark_core::EventBus;
        use waymark_types::{Event, EventType};

        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::with_log_dir(dir.path());
        for _ in 0..3 {
            bus.publish(Event::new("wf-1", EventType::Progress, serde_json::json!({}))).await;
        }
        let all = bus.replay_since("wf-1", 0).unwrap();
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);

        let resumed = bus.replay_since("wf-1", 1).unwrap();
        assert_eq!(resumed.len(), 2);
        assert_eq!(resumed[0].seq, 2);
    }
}
