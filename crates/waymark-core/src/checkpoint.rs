use std::sync::Arc;

use crate::accountant::TokenAccountant;
use crate::control::ControlStateStore;

/// Why a `Checkpoint::enter` call returned early instead of letting the
/// workflow proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Cancelled,
    BudgetExceeded(String),
}

/// The single suspension-point primitive shared by every workflow family:
/// before an LLM/tool call, before subtask fan-out, on budget reservation,
/// and at the top of each loop iteration all call `enter()` rather than
/// re-implementing the pause/cancel/budget dance.
#[derive(Clone)]
pub struct Checkpoint {
    workflow_id: String,
    control: ControlStateStore,
    accountant: Arc<TokenAccountant>,
}

impl Checkpoint {
    pub fn new(workflow_id: impl Into<String>, control: ControlStateStore, accountant: Arc<TokenAccountant>) -> Self {
        Self { workflow_id: workflow_id.into(), control, accountant }
    }

    /// Blocks while paused, then fails fast on cancellation or an already
    /// exceeded budget. A clean return means the caller may proceed.
    pub async fn enter(&self) -> Result<(), CheckpointOutcome> {
        let state = self.control.wait_while_paused(&self.workflow_id).await;
        if state.is_cancelled {
            return Err(CheckpointOutcome::Cancelled);
        }
        if self.accountant.is_exceeded().await {
            let reason = self.accountant.snapshot().await.exceeded_reason.unwrap_or_else(|| "budget".to_string());
            return Err(CheckpointOutcome::BudgetExceeded(reason));
        }
        Ok(())
    }

    /// Reserves an estimated token count ahead of an LLM call. Fails fast if
    /// the reservation would exceed the workflow's budget.
    pub async fn reserve_tokens(&self, estimate: u64) -> Result<(), CheckpointOutcome> {
        if self.accountant.reserve_tokens(estimate, false).await {
            Ok(())
        } else {
            let reason = self.accountant.snapshot().await.exceeded_reason.unwrap_or_else(|| "budget".to_string());
            Err(CheckpointOutcome::BudgetExceeded(reason))
        }
    }

    /// Commits the actual token usage of a call, releasing its reservation.
    pub async fn commit_tokens(&self, reserved_estimate: u64, actual: u64) {
        self.accountant.commit_tokens(reserved_estimate, actual).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use waymark_types::Budget;

    #[tokio::test]
    async fn enter_fails_fast_once_cancelled() {
        let control = ControlStateStore::new();
        let accountant = Arc::new(TokenAccountant::new("wf-1", Budget::new(10, 1000, 3600, 5), Arc::new(EventBus::new())));
        let checkpoint = Checkpoint::new("wf-1", control.clone(), accountant);

        control.cancel("wf-1", Some("stop".to_string()), None).await;
        let outcome = checkpoint.enter().await.unwrap_err();
        assert_eq!(outcome, CheckpointOutcome::Cancelled);
    }

    #[tokio::test]
    async fn enter_reports_exceeded_budget() {
        let control = ControlStateStore::new();
        let mut budget = Budget::new(10, 100, 3600, 5);
        budget.reserve_tokens(200, false);
        let accountant = Arc::new(TokenAccountant::new("wf-1", budget, Arc::new(EventBus::new())));
        let checkpoint = Checkpoint::new("wf-1", control, accountant);

        let outcome = checkpoint.enter().await.unwrap_err();
        assert!(matches!(outcome, CheckpointOutcome::BudgetExceeded(_)));
    }

    #[tokio::test]
    async fn enter_unblocks_after_resume() {
        let control = ControlStateStore::new();
        let accountant = Arc::new(TokenAccountant::new("wf-1", Budget::new(10, 1000, 3600, 5), Arc::new(EventBus::new())));
        let checkpoint = Checkpoint::new("wf-1", control.clone(), accountant);

        control.pause("wf-1", None, None).await;
        let control_clone = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            control_clone.resume("wf-1", None, None).await;
        });
        assert!(checkpoint.enter().await.is_ok());
    }
}
