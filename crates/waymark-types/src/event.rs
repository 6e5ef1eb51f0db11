use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event taxonomy, persisted subset and ephemeral subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowPausing,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelling,
    WorkflowCancelled,
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    AgentThinking,
    LlmPrompt,
    LlmPartial,
    LlmOutput,
    LlmError,
    ToolInvoked,
    ToolObservation,
    ToolError,
    RoleAssigned,
    Delegation,
    Progress,
    TeamRecruited,
    TeamRetired,
    TeamDenied,
    TeamStatus,
    BudgetThreshold,
    Synthesis,
    Reflection,
    ErrorRecovery,
    ErrorOccurred,
    ApprovalRequested,
    ApprovalDecision,
    MessageSent,
    MessageReceived,
    WorkspaceUpdated,
    StatusUpdate,
    Analysis,
    DegradedRouting,
    Heartbeat,
    InternalPing,
    StreamEnd,
}

impl EventType {
    /// Ephemeral types are never written to the durable log.
    pub fn is_ephemeral(self) -> bool {
        matches!(
            self,
            EventType::LlmPartial | EventType::Heartbeat | EventType::InternalPing
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Monotone within a workflow, starting at 0, no gaps.
    pub seq: u64,
    pub agent_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub stream_id: Option<String>,
}

impl Event {
    pub fn new(workflow_id: impl Into<String>, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            event_type,
            seq: 0,
            agent_id: None,
            message: None,
            payload,
            timestamp: Utc::now(),
            stream_id: None,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
