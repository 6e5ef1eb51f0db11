use serde::{Deserialize, Serialize};

/// Multi-dimensional budget for a workflow instance. `usage_percentage` is
/// the max across dimensions, so a single exhausted dimension drives gating
/// even if others are nearly empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub max_iterations: u32,
    pub iterations_used: u32,
    pub max_tokens: u64,
    pub tokens_used: u64,
    pub tokens_reserved: u64,
    pub max_wall_time_secs: u64,
    pub wall_time_secs: u64,
    pub max_subagent_runs: u32,
    pub subagent_runs_used: u32,
    pub exceeded: bool,
    pub exceeded_reason: Option<String>,
}

impl Budget {
    pub fn new(max_iterations: u32, max_tokens: u64, max_wall_time_secs: u64, max_subagent_runs: u32) -> Self {
        Self {
            max_iterations,
            iterations_used: 0,
            max_tokens,
            tokens_used: 0,
            tokens_reserved: 0,
            max_wall_time_secs,
            wall_time_secs: 0,
            max_subagent_runs,
            subagent_runs_used: 0,
            exceeded: false,
            exceeded_reason: None,
        }
    }

    /// Reserve estimated tokens ahead of an LLM call. Fails with BUDGET_EXCEEDED
    /// semantics (returns false) unless `override_budget` is set.
    pub fn reserve_tokens(&mut self, estimate: u64, override_budget: bool) -> bool {
        let projected = self.tokens_used + self.tokens_reserved + estimate;
        if projected > self.max_tokens && !override_budget {
            self.mark_exceeded("max_tokens");
            return false;
        }
        self.tokens_reserved += estimate;
        true
    }

    /// Commit actual usage after the call returns, releasing the reservation.
    pub fn commit_tokens(&mut self, reserved_estimate: u64, actual: u64) {
        self.tokens_reserved = self.tokens_reserved.saturating_sub(reserved_estimate);
        self.tokens_used += actual;
    }

    pub fn record_iteration(&mut self) -> bool {
        if self.iterations_used >= self.max_iterations {
            self.mark_exceeded("max_iterations");
            return false;
        }
        self.iterations_used += 1;
        true
    }

    pub fn record_subagent_run(&mut self) -> bool {
        if self.subagent_runs_used >= self.max_subagent_runs {
            self.mark_exceeded("max_subagent_runs");
            return false;
        }
        self.subagent_runs_used += 1;
        true
    }

    pub fn record_wall_time(&mut self, elapsed_secs: u64) {
        self.wall_time_secs = elapsed_secs;
        if elapsed_secs >= self.max_wall_time_secs {
            self.mark_exceeded("max_wall_time_secs");
        }
    }

    fn mark_exceeded(&mut self, reason: &str) {
        self.exceeded = true;
        self.exceeded_reason = Some(reason.to_string());
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn usage_percentage(&self) -> f64 {
        let iter_pct = if self.max_iterations == 0 {
            0.0
        } else {
            self.iterations_used as f64 / self.max_iterations as f64
        };
        let token_pct = if self.max_tokens == 0 {
            0.0
        } else {
            (self.tokens_used + self.tokens_reserved) as f64 / self.max_tokens as f64
        };
        let wall_pct = if self.max_wall_time_secs == 0 {
            0.0
        } else {
            self.wall_time_secs as f64 / self.max_wall_time_secs as f64
        };
        let sub_pct = if self.max_subagent_runs == 0 {
            0.0
        } else {
            self.subagent_runs_used as f64 / self.max_subagent_runs as f64
        };
        [iter_pct, token_pct, wall_pct, sub_pct]
            .into_iter()
            .fold(0.0_f64, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_commit_tracks_usage() {
        let mut budget = Budget::new(10, 1000, 3600, 5);
        assert!(budget.reserve_tokens(200, false));
        assert_eq!(budget.tokens_reserved, 200);
        budget.commit_tokens(200, 180);
        assert_eq!(budget.tokens_used, 180);
        assert_eq!(budget.tokens_reserved, 0);
    }

    #[test]
    fn reservation_exceeding_budget_fails_fast() {
        let mut budget = Budget::new(10, 100, 3600, 5);
        assert!(!budget.reserve_tokens(200, false));
        assert!(budget.is_exceeded());
        assert_eq!(budget.exceeded_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn override_bypasses_reservation_gate() {
        let mut budget = Budget::new(10, 100, 3600, 5);
        assert!(budget.reserve_tokens(200, true));
        assert!(!budget.is_exceeded());
    }

    #[test]
    fn usage_percentage_is_max_of_dimensions() {
        let mut budget = Budget::new(10, 1000, 3600, 5);
        budget.iterations_used = 9;
        budget.tokens_used = 100;
        assert!((budget.usage_percentage() - 0.9).abs() < 1e-9);
    }
}
