use std::sync::Arc;

use tokio::sync::RwLock;

use waymark_types::{Budget, Event, EventType};

use crate::event_bus::EventBus;

/// Threshold at which a `BUDGET_THRESHOLD` warning event fires, ahead of the
/// hard `BUDGET_EXCEEDED` failure.
const WARNING_THRESHOLD: f64 = 0.8;

/// Async gate in front of a workflow's `Budget`. Every reservation/commit/
/// record call goes through here so the warning event only needs to be wired
/// once, at the accounting boundary, rather than at every call site.
pub struct TokenAccountant {
    workflow_id: String,
    budget: RwLock<Budget>,
    event_bus: Arc<EventBus>,
    warned: RwLock<bool>,
}

impl TokenAccountant {
    pub fn new(workflow_id: impl Into<String>, budget: Budget, event_bus: Arc<EventBus>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            budget: RwLock::new(budget),
            event_bus,
            warned: RwLock::new(false),
        }
    }

    pub async fn snapshot(&self) -> Budget {
        self.budget.read().await.clone()
    }

    pub async fn is_exceeded(&self) -> bool {
        self.budget.read().await.is_exceeded()
    }

    pub async fn reserve_tokens(&self, estimate: u64, override_budget: bool) -> bool {
        let ok = {
            let mut budget = self.budget.write().await;
            budget.reserve_tokens(estimate, override_budget)
        };
        self.maybe_warn().await;
        ok
    }

    pub async fn commit_tokens(&self, reserved_estimate: u64, actual: u64) {
        let mut budget = self.budget.write().await;
        budget.commit_tokens(reserved_estimate, actual);
        drop(budget);
        self.maybe_warn().await;
    }

    pub async fn record_iteration(&self) -> bool {
        let ok = self.budget.write().await.record_iteration();
        self.maybe_warn().await;
        ok
    }

    pub async fn record_subagent_run(&self) -> bool {
        let ok = self.budget.write().await.record_subagent_run();
        self.maybe_warn().await;
        ok
    }

    pub async fn record_wall_time(&self, elapsed_secs: u64) {
        self.budget.write().await.record_wall_time(elapsed_secs);
        self.maybe_warn().await;
    }

    async fn maybe_warn(&self) {
        let usage = self.budget.read().await.usage_percentage();
        if usage < WARNING_THRESHOLD {
            return;
        }
        let mut warned = self.warned.write().await;
        if *warned {
            return;
        }
        *warned = true;
        self.event_bus
            .publish(Event::new(
                self.workflow_id.clone(),
                EventType::BudgetThreshold,
                serde_json::json!({"usage_percentage": usage}),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn warning_event_fires_once_past_threshold() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe("wf-1").await;
        let accountant = TokenAccountant::new("wf-1", Budget::new(10, 1000, 3600, 5), bus);

        assert!(accountant.reserve_tokens(850, false).await);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::BudgetThreshold);

        assert!(accountant.reserve_tokens(10, false).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reservation_over_cap_fails_and_marks_exceeded() {
        let bus = Arc::new(EventBus::new());
        let accountant = TokenAccountant::new("wf-1", Budget::new(10, 100, 3600, 5), bus);
        assert!(!accountant.reserve_tokens(200, false).await);
        assert!(accountant.is_exceeded().await);
    }
}
