use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::Strategy;

/// Reusable shape learned from completed workflows, keyed by a query fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionPattern {
    pub query_pattern: String,
    pub subtasks: Vec<String>,
    pub strategy: Strategy,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub total_runs: u64,
    pub last_used: DateTime<Utc>,
}

impl DecompositionPattern {
    /// Rolling update on workflow completion.
    pub fn record_run(&mut self, succeeded: bool, duration_ms: u64) {
        let n = self.total_runs as f64;
        let outcome = if succeeded { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * n + outcome) / (n + 1.0);
        self.avg_duration_ms = (self.avg_duration_ms * n + duration_ms as f64) / (n + 1.0);
        self.total_runs += 1;
        self.last_used = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyTotals {
    pub runs: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub user_id: String,
    pub strategy: Strategy,
    pub totals: StrategyTotals,
}

impl StrategyPerformance {
    pub fn new(user_id: String, strategy: Strategy) -> Self {
        Self {
            user_id,
            strategy,
            totals: StrategyTotals::default(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.totals.runs == 0 {
            0.0
        } else {
            self.totals.successes as f64 / self.totals.runs as f64
        }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.totals.runs == 0 {
            0.0
        } else {
            self.totals.total_duration_ms as f64 / self.totals.runs as f64
        }
    }

    pub fn avg_tokens(&self) -> f64 {
        if self.totals.runs == 0 {
            0.0
        } else {
            self.totals.total_tokens as f64 / self.totals.runs as f64
        }
    }

    pub fn record(&mut self, succeeded: bool, duration_ms: u64, tokens: u64, cost_usd: f64) {
        self.totals.runs += 1;
        if succeeded {
            self.totals.successes += 1;
        }
        self.totals.total_duration_ms += duration_ms;
        self.totals.total_tokens += tokens;
        self.totals.total_cost_usd += cost_usd;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledTaskStatus {
    Active,
    Paused,
    Deleted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledTaskStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub query: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub owner: String,
    pub cron: String,
    pub timezone: String,
    pub task_template: TaskTemplate,
    pub budget_tokens: u64,
    pub timeout_s: u64,
    pub status: ScheduledTaskStatus,
    pub next_run_at: DateTime<Utc>,
    pub stats: ScheduledTaskStats,
}

/// Advisory record surfaced to the Router when a recurring failure signature is detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    pub name: String,
    pub indicators: Vec<String>,
    pub mitigation: String,
    pub severity: FailureSeverity,
    pub occurrence_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Low,
    Medium,
    High,
    Critical,
}
