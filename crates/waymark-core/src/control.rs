use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use waymark_types::ControlState;

/// Per-workflow pause/cancel signal. A `watch` channel callers can await on,
/// plus a `CancellationToken` checked at every suspension point.
struct ControlEntry {
    state: watch::Sender<ControlState>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct ControlStateStore {
    entries: Arc<RwLock<HashMap<String, Arc<ControlEntry>>>>,
}

impl ControlStateStore {
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    async fn entry_for(&self, workflow_id: &str) -> Arc<ControlEntry> {
        if let Some(existing) = self.entries.read().await.get(workflow_id) {
            return existing.clone();
        }
        let mut entries = self.entries.write().await;
        entries
            .entry(workflow_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = watch::channel(ControlState::new(workflow_id));
                Arc::new(ControlEntry { state: tx, cancel: CancellationToken::new() })
            })
            .clone()
    }

    pub async fn snapshot(&self, workflow_id: &str) -> ControlState {
        self.entry_for(workflow_id).await.state.borrow().clone()
    }

    pub async fn cancellation_token(&self, workflow_id: &str) -> CancellationToken {
        self.entry_for(workflow_id).await.cancel.clone()
    }

    pub async fn pause(&self, workflow_id: &str, reason: Option<String>, by: Option<String>) {
        let entry = self.entry_for(workflow_id).await;
        entry.state.send_modify(|state| state.pause(reason, by));
    }

    pub async fn resume(&self, workflow_id: &str, reason: Option<String>, by: Option<String>) {
        let entry = self.entry_for(workflow_id).await;
        entry.state.send_modify(|state| state.resume(reason, by));
    }

    /// Terminal latch: also fires the cancellation token so in-flight tool
    /// calls and provider streams observe it immediately, not just the next
    /// time a workflow checks `ControlState`.
    pub async fn cancel(&self, workflow_id: &str, reason: Option<String>, by: Option<String>) {
        let entry = self.entry_for(workflow_id).await;
        entry.state.send_modify(|state| state.cancel(reason, by));
        entry.cancel.cancel();
    }

    /// Blocks until the workflow is resumed or cancelled, whichever comes
    /// first. Returns the `ControlState` at the moment of wake.
    pub async fn wait_while_paused(&self, workflow_id: &str) -> ControlState {
        let entry = self.entry_for(workflow_id).await;
        let mut rx = entry.state.subscribe();
        loop {
            let snapshot = rx.borrow().clone();
            if !snapshot.is_paused || snapshot.is_cancelled {
                return snapshot;
            }
            tokio::select! {
                _ = entry.cancel.cancelled() => return rx.borrow().clone(),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return rx.borrow().clone();
                    }
                }
            }
        }
    }
}

impl Default for ControlStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_while_paused_unblocks_on_resume() {
        let store = ControlStateStore::new();
        store.pause("wf-1", Some("awaiting approval".to_string()), None).await;

        let store_clone = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            store_clone.resume("wf-1", None, Some("operator".to_string())).await;
        });

        let state = store.wait_while_paused("wf-1").await;
        assert!(!state.is_paused);
    }

    #[tokio::test]
    async fn cancel_is_a_terminal_latch() {
        let store = ControlStateStore::new();
        store.cancel("wf-1", Some("user abort".to_string()), None).await;
        store.resume("wf-1", None, None).await;
        let state = store.snapshot("wf-1").await;
        assert!(state.is_cancelled);
    }

    #[tokio::test]
    async fn cancellation_token_fires_immediately_on_cancel() {
        let store = ControlStateStore::new();
        let token = store.cancellation_token("wf-1").await;
        assert!(!token.is_cancelled());
        store.cancel("wf-1", None, None).await;
        assert!(token.is_cancelled());
    }
}
