//! Delayed deletion of bot replies and triggering messages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use whatsapp_client::Messenger;

/// Enough to find a message again later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: String,
    pub message_id: String,
}

impl MessageRef {
    pub fn new(chat_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub message: MessageRef,
    pub enqueued_at: Instant,
    pub timeout: Duration,
}

impl PendingDeletion {
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) >= self.timeout
    }
}

/// FIFO of pending deletions.
///
/// Entries are appended at the tail and swept from the head. Timeouts are
/// expected to be roughly uniform; a long timeout at the head holds back
/// shorter ones queued behind it.
pub struct AutoDeleteQueue {
    pending: Mutex<VecDeque<PendingDeletion>>,
    messenger: Arc<dyn Messenger>,
    lookback: usize,
}

impl AutoDeleteQueue {
    pub fn new(messenger: Arc<dyn Messenger>, lookback: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            messenger,
            lookback,
        }
    }

    pub async fn enqueue(&self, message: MessageRef, timeout: Duration) {
        self.enqueue_at(message, Instant::now(), timeout).await;
    }

    pub async fn enqueue_at(&self, message: MessageRef, enqueued_at: Instant, timeout: Duration) {
        debug!("Scheduling deletion of {} in {:?}", message.message_id, timeout);
        self.pending.lock().await.push_back(PendingDeletion {
            message,
            enqueued_at,
            timeout,
        });
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Delete every due entry at the head. Returns how many were deleted.
    pub async fn sweep(&self, now: Instant) -> usize {
        let due: Vec<PendingDeletion> = {
            let mut pending = self.pending.lock().await;
            let mut due = Vec::new();
            while pending.front().is_some_and(|p| p.is_due(now)) {
                if let Some(entry) = pending.pop_front() {
                    due.push(entry);
                }
            }
            due
        };

        let mut deleted = 0;
        for entry in &due {
            if self.delete(&entry.message).await {
                deleted += 1;
            }
        }

        if !due.is_empty() {
            debug!("Swept {} entries, deleted {}", due.len(), deleted);
        }
        deleted
    }

    /// Gone or out of the lookback window is normal, not an error.
    async fn delete(&self, message: &MessageRef) -> bool {
        let recent = match self
            .messenger
            .fetch_messages(&message.chat_id, self.lookback, None)
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                debug!("Could not fetch {} for deletion: {}", message.chat_id, e);
                return false;
            }
        };

        if !recent.iter().any(|m| m.id == message.message_id) {
            debug!("Message {} no longer in recent history", message.message_id);
            return false;
        }

        match self
            .messenger
            .delete_message(&message.chat_id, &message.message_id, true)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!("Delete of {} failed: {}", message.message_id, e);
                false
            }
        }
    }

    /// Sweep at a fixed interval until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        info!("Auto-delete sweeper running every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.sweep(Instant::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{group_message, RecordingMessenger, GROUP, USER};

    fn queue_with(messenger: Arc<RecordingMessenger>) -> AutoDeleteQueue {
        AutoDeleteQueue::new(messenger, 50)
    }

    #[tokio::test]
    async fn test_not_deleted_before_timeout() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.add_history(group_message("m1", USER, "#resumo"));
        let queue = queue_with(messenger.clone());

        let start = Instant::now();
        queue
            .enqueue_at(MessageRef::new(GROUP, "m1"), start, Duration::from_millis(1000))
            .await;

        assert_eq!(queue.sweep(start + Duration::from_millis(999)).await, 0);
        assert!(messenger.deleted().is_empty());
        assert_eq!(queue.len().await, 1);

        assert_eq!(queue.sweep(start + Duration::from_millis(1000)).await, 1);
        assert_eq!(messenger.deleted(), vec![(GROUP.to_string(), "m1".to_string())]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_message_is_dropped_silently() {
        let messenger = Arc::new(RecordingMessenger::new());
        let queue = queue_with(messenger.clone());

        let start = Instant::now();
        queue
            .enqueue_at(MessageRef::new(GROUP, "gone"), start, Duration::ZERO)
            .await;

        assert_eq!(queue.sweep(start).await, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_message_outside_lookback_is_dropped() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.add_history(group_message("old", USER, "antiga"));
        for i in 0..3 {
            messenger.add_history(group_message(&format!("new-{}", i), USER, "nova"));
        }
        let queue = AutoDeleteQueue::new(messenger.clone(), 2);

        let start = Instant::now();
        queue
            .enqueue_at(MessageRef::new(GROUP, "old"), start, Duration::ZERO)
            .await;

        assert_eq!(queue.sweep(start).await, 0);
        assert!(messenger.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_head_blocks_later_entries() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.add_history(group_message("slow", USER, "a"));
        messenger.add_history(group_message("fast", USER, "b"));
        let queue = queue_with(messenger.clone());

        let start = Instant::now();
        queue
            .enqueue_at(MessageRef::new(GROUP, "slow"), start, Duration::from_secs(60))
            .await;
        queue
            .enqueue_at(MessageRef::new(GROUP, "fast"), start, Duration::from_secs(1))
            .await;

        assert_eq!(queue.sweep(start + Duration::from_secs(2)).await, 0);
        assert_eq!(queue.sweep(start + Duration::from_secs(60)).await, 2);
    }
}
