use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::routing::{RoutingDecision, TaskMode};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// Status transitions are monotonic: PENDING -> RUNNING -> terminal. No back-edges.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Completed | Failed | Cancelled | Timeout) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskTrigger {
    Api,
    Schedule,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workflow_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub query: String,
    pub mode: Option<TaskMode>,
    pub routing: Option<RoutingDecision>,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<TaskError>,
    pub usage: Usage,
    pub trigger: TaskTrigger,
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(workflow_id: String, user_id: String, query: String, trigger: TaskTrigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            user_id,
            session_id: None,
            query,
            mode: None,
            routing: None,
            status: TaskStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            usage: Usage::default(),
            trigger,
            schedule_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Applies a status transition, enforcing the monotonic invariant.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!("invalid transition {:?} -> {:?}", self.status, next));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub cause_chain: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Analyzing,
    Planning,
    Retrieving,
    Executing,
    Validating,
    Synthesizing,
    Completed,
    Failed,
}

impl AgentState {
    /// Strict progression, with re-entry into Executing from Validating allowed
    /// (bounded by iteration_cap at the call site).
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, Planning)
                | (Planning, Retrieving)
                | (Planning, Executing)
                | (Retrieving, Executing)
                | (Executing, Validating)
                | (Validating, Executing)
                | (Validating, Synthesizing)
                | (Synthesizing, Completed)
                | (_, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: String,
    pub workflow_id: String,
    pub task_id: String,
    pub agent_id: String,
    pub state: AgentState,
    pub input: String,
    pub output: Option<String>,
    pub model: String,
    pub tokens: Usage,
    pub duration_ms: u64,
    pub strategy: Option<crate::routing::Strategy>,
}

impl AgentExecution {
    pub fn new(workflow_id: String, task_id: String, agent_id: String, input: String, model: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            task_id,
            agent_id,
            state: AgentState::Idle,
            input,
            output: None,
            model,
            tokens: Usage::default(),
            duration_ms: 0,
            strategy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: String,
    pub workflow_id: String,
    pub agent_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub tokens: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub token_budget: u64,
    pub tokens_used: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub soft_deleted: bool,
}

impl Session {
    pub fn new(user_id: String, token_budget: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            context: HashMap::new(),
            token_budget,
            tokens_used: 0,
            created_at: now,
            updated_at: now,
            soft_deleted: false,
        }
    }

    /// tokens_used <= token_budget unless override is set.
    pub fn would_exceed(&self, additional: u64, override_budget: bool) -> bool {
        !override_budget && self.tokens_used + additional > self.token_budget
    }
}
