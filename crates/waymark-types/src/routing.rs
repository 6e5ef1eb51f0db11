use serde::{Deserialize, Serialize};

/// A cognitive execution strategy chosen for a task. Tagged variants, not a
/// subtype hierarchy: every workflow family satisfies the same capability set
/// (run, checkpoint, on_pause, on_resume, on_cancel) regardless of variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SimpleTask,
    Standard,
    Dag,
    Supervisor,
    Research,
    Scheduled,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SimpleTask => "simple_task",
            Strategy::Standard => "standard",
            Strategy::Dag => "dag",
            Strategy::Supervisor => "supervisor",
            Strategy::Research => "research",
            Strategy::Scheduled => "scheduled",
        }
    }
}

/// Caller-supplied hint at submission time. Distinct from `Strategy`: `mode`
/// is a request, `Strategy` is the Router's resolved decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    Simple,
    Standard,
    Complex,
    Supervisor,
}

/// Output of the Complexity Analyzer & Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: Strategy,
    pub complexity_score: f64,
    pub suggested_agent_count: u32,
    pub max_iterations: u32,
    pub model_tier_hint: ModelTier,
    /// Rationale recorded alongside the ANALYSIS event; never shown as private reasoning.
    pub rationale: String,
    /// Set when the analyzer fell back to rule-based scoring after a memory/embedding error.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl Default for ModelTier {
    fn default() -> Self {
        ModelTier::Medium
    }
}
