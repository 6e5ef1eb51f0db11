use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use waymark_types::Event;

/// Per-workflow fanout plus the durable tail the append call appends to.
struct WorkflowChannel {
    tx: broadcast::Sender<Event>,
    seq: AtomicU64,
}

/// Two-tier event bus: an in-process broadcast fanout for live subscribers
/// (ephemeral, bounded, `RecvError::Lagged` on overflow) paired with an
/// append-only JSONL durable log keyed by `(workflow_id, seq)`.
/// Ephemeral event kinds (`Event::is_ephemeral`) are published to subscribers
/// but never written to the durable log.
pub struct EventBus {
    channels: RwLock<HashMap<String, Arc<WorkflowChannel>>>,
    log_dir: Option<PathBuf>,
    log_file: Mutex<Option<(String, std::fs::File)>>,
}

const CHANNEL_CAPACITY: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            log_dir: None,
            log_file: Mutex::new(None),
        }
    }

    /// Durable-backed bus: every non-ephemeral event is appended to
    /// `<log_dir>/<workflow_id>.jsonl` as it is published.
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            log_dir: Some(log_dir.into()),
            log_file: Mutex::new(None),
        }
    }

    async fn channel_for(&self, workflow_id: &str) -> Arc<WorkflowChannel> {
        if let Some(existing) = self.channels.read().await.get(workflow_id) {
            return existing.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(workflow_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                // seq is strictly increasing starting at 1.
                Arc::new(WorkflowChannel { tx, seq: AtomicU64::new(1) })
            })
            .clone()
    }

    pub async fn subscribe(&self, workflow_id: &str) -> broadcast::Receiver<Event> {
        self.channel_for(workflow_id).await.tx.subscribe()
    }

    /// Stamps `event.seq` with the next monotone, gapless sequence number for
    /// its workflow, fans it out to live subscribers, and appends it to the
    /// durable log unless it is classified ephemeral.
    pub async fn publish(&self, mut event: Event) -> Event {
        let channel = self.channel_for(&event.workflow_id).await;
        event.seq = channel.seq.fetch_add(1, Ordering::SeqCst);

        if !event.event_type.is_ephemeral() {
            if let Err(err) = self.append_durable(&event).await {
                tracing::error!(workflow_id = %event.workflow_id, error = %err, "failed to append durable event");
            }
        }

        let _ = channel.tx.send(event.clone());
        event
    }

    async fn append_durable(&self, event: &Event) -> std::io::Result<()> {
        let Some(dir) = &self.log_dir else { return Ok(()) };
        std::fs::create_dir_all(dir)?;
        let path = log_path(dir, &event.workflow_id);

        let mut guard = self.log_file.lock().await;
        let needs_new_handle = match guard.as_ref() {
            Some((wid, _)) => wid != &event.workflow_id,
            None => true,
        };
        if needs_new_handle {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            *guard = Some((event.workflow_id.clone(), file));
        }
        let (_, file) = guard.as_mut().expect("handle set above");
        let line = serde_json::to_string(event).expect("Event serializes");
        writeln!(file, "{line}")?;
        file.flush()
    }

    /// Replays the durable log for `workflow_id` from `since_seq` (exclusive),
    /// for SSE resume after a client reconnects.
    pub fn replay_since(&self, workflow_id: &str, since_seq: u64) -> std::io::Result<Vec<Event>> {
        let Some(dir) = &self.log_dir else { return Ok(Vec::new()) };
        let path = log_path(dir, workflow_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(line)?;
            if event.seq > since_seq {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn log_path(dir: &Path, workflow_id: &str) -> PathBuf {
    dir.join(format!("{workflow_id}.jsonl"))
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_types::EventType;

    fn event(workflow_id: &str, event_type: EventType) -> Event {
        Event::new(workflow_id, event_type, serde_json::json!({}))
    }

    #[tokio::test]
    async fn seq_is_monotone_and_gapless_per_workflow() {
        let bus = EventBus::new();
        let mut seqs = Vec::new();
        for _ in 0..5 {
            let published = bus.publish(event("wf-1", EventType::Progress)).await;
            seqs.push(published.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("wf-1").await;
        bus.publish(event("wf-1", EventType::WorkflowStarted)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::WorkflowStarted);
    }

    #[tokio::test]
    async fn ephemeral_events_are_not_written_to_durable_log() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::with_log_dir(dir.path());
        bus.publish(event("wf-1", EventType::LlmPartial)).await;
        bus.publish(event("wf-1", EventType::WorkflowStarted)).await;

        let replayed = bus.replay_since("wf-1", 0).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].event_type, EventType::WorkflowStarted);
    }

    #[tokio::test]
    async fn replay_since_resumes_after_given_seq() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::with_log_dir(dir.path());
        for _ in 0..3 {
            bus.publish(event("wf-1", EventType::Progress)).await;
        }
        let replayed = bus.replay_since("wf-1", 1).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].seq, 2);
    }
}
