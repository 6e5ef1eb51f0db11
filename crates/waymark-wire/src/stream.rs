use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waymark_types::EventType;

/// `GET /stream/sse?workflow_id=...&types=...&last_event_id=...` query shape.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamQuery {
    pub workflow_id: String,
    #[serde(default)]
    pub types: Option<Vec<EventType>>,
    #[serde(default)]
    pub last_event_id: Option<u64>,
}

/// One `data:` line of the SSE/WebSocket envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseEnvelope {
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Maps internal event type names to the wire-level SSE `event:` name, via a
/// small rewrite table (e.g. LLM_PARTIAL -> thread.message.delta).
pub fn sse_event_name(event_type: EventType) -> &'static str {
    match event_type {
        EventType::LlmPartial => "thread.message.delta",
        EventType::LlmOutput => "thread.message.completed",
        EventType::StreamEnd => "thread.stream.end",
        EventType::WorkflowStarted => "thread.run.started",
        EventType::WorkflowCompleted => "thread.run.completed",
        EventType::WorkflowFailed => "thread.run.failed",
        EventType::WorkflowCancelled => "thread.run.cancelled",
        _ => "thread.event",
    }
}
