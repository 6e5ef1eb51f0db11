use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waymark_types::{ModelTier, TaskMode, TaskStatus};

/// `POST` submit-task request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mode: Option<TaskMode>,
    /// Top-level override always wins over `context`'s values.
    #[serde(default)]
    pub model_tier: Option<ModelTier>,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub provider_override: Option<String>,
    #[serde(default)]
    pub research_strategy: Option<String>,
    #[serde(default)]
    pub max_concurrent_agents: Option<u32>,
    #[serde(default)]
    pub enable_verification: Option<bool>,
    #[serde(default)]
    pub context: SubmitTaskContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitTaskContext {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub prompt_params: serde_json::Value,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_version: Option<String>,
    #[serde(default)]
    pub disable_ai: bool,
    #[serde(default)]
    pub force_research: bool,
    #[serde(default)]
    pub iterative_max_iterations: Option<u32>,
    #[serde(default)]
    pub iterative_coverage_threshold: Option<f64>,
    #[serde(default)]
    pub enable_fact_extraction: bool,
    #[serde(default)]
    pub enable_citations: bool,
    #[serde(default)]
    pub react_max_iterations: Option<u32>,
    #[serde(default)]
    pub history_window_size: Option<u32>,
    #[serde(default)]
    pub primers_count: Option<u32>,
    #[serde(default)]
    pub recents_count: Option<u32>,
    #[serde(default)]
    pub compression_trigger_ratio: Option<f64>,
    #[serde(default)]
    pub compression_target_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub workflow_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBreakdownEntry {
    pub model: String,
    pub tokens: u64,
}

/// Final task output. Never includes private reasoning or sensitive payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutputResponse {
    pub output: Option<String>,
    pub status: TaskStatus,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub model_used: Option<String>,
    pub provider: Option<String>,
    #[serde(default)]
    pub model_breakdown: Vec<ModelBreakdownEntry>,
}
