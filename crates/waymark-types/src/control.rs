use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-workflow pause/cancel record. `is_cancelled=true` is a terminal
/// latch: once set it can never be cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlState {
    pub workflow_id: String,
    pub is_paused: bool,
    pub is_cancelled: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub paused_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ControlState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            is_paused: false,
            is_cancelled: false,
            paused_at: None,
            pause_reason: None,
            paused_by: None,
            cancel_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Idempotent: repeated pause calls are harmless, `paused_at` is set once.
    pub fn pause(&mut self, reason: Option<String>, by: Option<String>) {
        if self.is_cancelled {
            return;
        }
        if !self.is_paused {
            self.is_paused = true;
            self.paused_at = Some(Utc::now());
        }
        self.pause_reason = reason;
        self.paused_by = by;
        self.updated_at = Utc::now();
    }

    /// No-op if not paused.
    pub fn resume(&mut self, _reason: Option<String>, _by: Option<String>) {
        if !self.is_paused {
            return;
        }
        self.is_paused = false;
        self.updated_at = Utc::now();
    }

    /// Terminal latch: cannot be cleared once set.
    pub fn cancel(&mut self, reason: Option<String>, by: Option<String>) {
        if !self.is_cancelled {
            self.is_cancelled = true;
            self.cancelled_at = Some(Utc::now());
        }
        self.cancel_reason = reason;
        self.cancelled_by = by;
        self.updated_at = Utc::now();
    }
}
