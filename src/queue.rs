//! Per-channel single-flight queues.
//!
//! Two prompts racing on the same channel would each spawn a subprocess and
//! overwrite the shared session entry in whichever order they happened to
//! finish. Prompts for one channel therefore run strictly one at a time,
//! while distinct channels stay fully concurrent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Result of offering a prompt to a channel's queue.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Channel was idle; the caller now owns processing this prompt and must
    /// keep draining until `Idle`.
    ProcessNow(String),
    /// An exchange is in flight; the prompt waits its turn.
    Queued,
}

/// Result of draining after an exchange completes.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainResult {
    /// Queue is empty; the channel is idle again.
    Idle,
    /// Next prompt to process.
    Next(String),
}

struct QueueInner {
    busy: bool,
    pending: VecDeque<String>,
}

/// Single-flight queue for one channel.
pub struct ChannelQueue {
    inner: Mutex<QueueInner>,
}

impl ChannelQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                busy: false,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Offer a prompt. Marks the channel busy when it was idle.
    pub async fn try_enqueue(&self, prompt: String) -> EnqueueResult {
        let mut inner = self.inner.lock().await;
        if !inner.busy {
            inner.busy = true;
            return EnqueueResult::ProcessNow(prompt);
        }
        inner.pending.push_back(prompt);
        EnqueueResult::Queued
    }

    /// Take the next pending prompt, or mark the channel idle.
    pub async fn drain(&self) -> DrainResult {
        let mut inner = self.inner.lock().await;
        match inner.pending.pop_front() {
            Some(prompt) => DrainResult::Next(prompt),
            None => {
                inner.busy = false;
                DrainResult::Idle
            }
        }
    }

    /// Force the channel idle (used when a processing task dies without
    /// reaching its drain loop).
    pub async fn mark_idle(&self) {
        let mut inner = self.inner.lock().await;
        inner.busy = false;
    }
}

/// Collection of per-channel queues, created on first use.
#[derive(Clone)]
pub struct ChannelQueues {
    queues: Arc<DashMap<u64, Arc<ChannelQueue>>>,
}

impl ChannelQueues {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the queue for a channel.
    pub fn get(&self, channel_id: u64) -> Arc<ChannelQueue> {
        self.queues
            .entry(channel_id)
            .or_insert_with(|| Arc::new(ChannelQueue::new()))
            .clone()
    }

    /// Spawn a background task that drops queues nobody references anymore.
    pub fn spawn_cleanup_task(self) {
        let cleanup_interval = Duration::from_secs(3600);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let stale: Vec<u64> = self
                    .queues
                    .iter()
                    .filter(|entry| Arc::strong_count(entry.value()) == 1)
                    .map(|entry| *entry.key())
                    .collect();
                let removed = stale.len();
                for key in stale {
                    self.queues.remove(&key);
                }
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = self.queues.len(),
                        "Cleaned up idle channel queues"
                    );
                }
            }
        });
    }
}

impl Default for ChannelQueues {
    fn default() -> Self {
        Self::new()
    }
}
