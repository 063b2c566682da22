//! Discord dispatcher: receives channel messages, runs exchanges against the
//! claude CLI, and streams replies back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::all::{ChannelId, Context, CreateMessage, EventHandler, Message, Ready};
use serenity::http::Http;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::present::{truncate, OutputSink, SinkError, FRAGMENT_CAP};
use crate::queue::{ChannelQueue, ChannelQueues, DrainResult, EnqueueResult};
use crate::runner::ClaudeRunner;
use crate::session::SessionRegistry;

/// Discord message character limit.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// How often the typing indicator is refreshed while an exchange runs.
const TYPING_INTERVAL: Duration = Duration::from_secs(5);

/// The bot's serenity event handler plus everything an exchange needs.
pub struct Bridge {
    runner: Arc<ClaudeRunner>,
    registry: Arc<SessionRegistry>,
    queues: ChannelQueues,
}

impl Bridge {
    pub fn new(config: &Config) -> Self {
        let queues = ChannelQueues::new();
        queues.clone().spawn_cleanup_task();
        Self {
            runner: Arc::new(ClaudeRunner::new(&config.claude)),
            registry: Arc::new(SessionRegistry::with_capacity(config.sessions.max_entries)),
            queues,
        }
    }
}

#[async_trait]
impl EventHandler for Bridge {
    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages to avoid feedback loops.
        if msg.author.bot {
            return;
        }

        let channel_id = msg.channel_id.get();
        info!(
            channel_id,
            author = %msg.author.name,
            preview = truncate(&msg.content, 100),
            "Message received"
        );

        let queue = self.queues.get(channel_id);
        let prompt = match queue.try_enqueue(msg.content).await {
            EnqueueResult::ProcessNow(prompt) => prompt,
            // Another exchange owns this channel; its drain loop picks us up.
            EnqueueResult::Queued => return,
        };

        let runner = self.runner.clone();
        let registry = self.registry.clone();
        let http = ctx.http.clone();
        tokio::spawn(async move {
            let channel = ChannelId::new(channel_id);
            drive_channel(queue, prompt, move |prompt| {
                let runner = runner.clone();
                let registry = registry.clone();
                let http = http.clone();
                tokio::spawn(async move {
                    let _typing = TypingGuard(spawn_typing(http.clone(), channel));
                    let sink = DiscordSink::new(http, channel);
                    run_exchange(&runner, &registry, channel_id, &prompt, &sink).await;
                })
            })
            .await;
        });
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            user_id = %ready.user.id,
            "Discord bot connected"
        );
    }
}

/// One full prompt/response cycle against a channel's sink.
///
/// Never returns an error: failures become a bounded error message on the
/// sink, and a send failure at that point is only logged. Nothing from here
/// may propagate into serenity's event loop.
pub async fn run_exchange(
    runner: &ClaudeRunner,
    registry: &SessionRegistry,
    channel_id: u64,
    prompt: &str,
    sink: &dyn OutputSink,
) {
    let session_id = registry.get(channel_id);
    let started = Instant::now();

    match runner.run(prompt, session_id.as_deref(), sink).await {
        Ok(outcome) => {
            info!(
                channel_id,
                elapsed_secs = started.elapsed().as_secs_f64(),
                session_id = outcome.session_id.as_deref().unwrap_or("-"),
                "Exchange finished"
            );
            registry.record(channel_id, outcome.session_id);

            let text = outcome.text.as_deref().unwrap_or("(empty response)");
            if let Err(e) = sink.send(&format!("**Claude:** {text}")).await {
                error!(channel_id, error = %e, "Failed to send final answer");
            }
        }
        Err(e) => {
            warn!(channel_id, error = %e, "Exchange failed");
            let notice = format!("Error: {}", truncate(&e.to_string(), FRAGMENT_CAP));
            if let Err(send_err) = sink.send(&notice).await {
                error!(channel_id, error = %send_err, "Failed to send error notice");
            }
        }
    }
}

/// Run `exchange` for each prompt the channel queue hands over, starting
/// with `first`. Each exchange runs as its own task; if one panics the
/// channel is marked idle instead of staying busy forever.
pub async fn drive_channel<F>(queue: Arc<ChannelQueue>, first: String, mut exchange: F)
where
    F: FnMut(String) -> tokio::task::JoinHandle<()>,
{
    let mut prompt = first;
    loop {
        if exchange(prompt).await.is_err() {
            warn!("Exchange task panicked; releasing the channel");
            queue.mark_idle().await;
            return;
        }
        match queue.drain().await {
            DrainResult::Next(next) => prompt = next,
            DrainResult::Idle => return,
        }
    }
}

/// Aborts the typing refresher when the owning exchange ends, panics
/// included.
struct TypingGuard(tokio::task::JoinHandle<()>);

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Refresh the typing indicator immediately and on a fixed interval until
/// the returned task is aborted. The exchange holds it in a [`TypingGuard`],
/// so the recurring timer cannot leak.
fn spawn_typing(http: Arc<Http>, channel: ChannelId) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(TYPING_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = channel.broadcast_typing(&http).await {
                debug!(channel_id = channel.get(), error = %e, "Typing indicator failed");
            }
        }
    })
}

// ============================================================================
// Discord sink
// ============================================================================

/// Sends fragments to a Discord channel, split under the 2000-char limit.
pub struct DiscordSink {
    http: Arc<Http>,
    channel: ChannelId,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }
}

#[async_trait]
impl OutputSink for DiscordSink {
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        for chunk in chunk_message(text) {
            if chunk.is_empty() {
                continue;
            }
            self.channel
                .send_message(&self.http, CreateMessage::new().content(chunk))
                .await
                .map_err(|e| SinkError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Split a message into ordered pieces under Discord's limit, preferring to
/// break at a newline.
pub fn chunk_message(content: &str) -> Vec<&str> {
    if content.len() <= MAX_MESSAGE_LENGTH {
        return vec![content];
    }

    let mut chunks = Vec::new();
    let mut remaining = content;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LENGTH {
            chunks.push(remaining);
            break;
        }

        let boundary = floor_boundary(remaining, MAX_MESSAGE_LENGTH);
        let split_at = remaining[..boundary].rfind('\n').unwrap_or(boundary);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        // Skip the newline if we split at one
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}

fn floor_boundary(s: &str, max: usize) -> usize {
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    async fn claim_first(queue: &ChannelQueue, prompt: &str) -> String {
        match queue.try_enqueue(prompt.to_string()).await {
            EnqueueResult::ProcessNow(prompt) => prompt,
            EnqueueResult::Queued => panic!("channel should have been idle"),
        }
    }

    #[tokio::test]
    async fn drive_channel_processes_queued_prompts_in_order() {
        let queues = ChannelQueues::new();
        let queue = queues.get(1);
        let first = claim_first(&queue, "one").await;
        queue.try_enqueue("two".to_string()).await;
        queue.try_enqueue("three".to_string()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        drive_channel(queue.clone(), first, move |prompt| {
            let recorder = recorder.clone();
            tokio::spawn(async move {
                recorder.lock().unwrap().push(prompt);
            })
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
        // Channel went idle again.
        assert!(matches!(
            queue.try_enqueue("four".to_string()).await,
            EnqueueResult::ProcessNow(_)
        ));
    }

    #[tokio::test]
    async fn panicking_exchange_releases_the_channel() {
        let queues = ChannelQueues::new();
        let queue = queues.get(1);
        let first = claim_first(&queue, "boom").await;

        drive_channel(queue.clone(), first, |_prompt| {
            tokio::spawn(async { panic!("exchange died") })
        })
        .await;

        // A wedged busy flag would leave this Queued forever.
        assert!(matches!(
            queue.try_enqueue("next".to_string()).await,
            EnqueueResult::ProcessNow(_)
        ));
    }

    #[test]
    fn short_message_is_one_chunk() {
        assert_eq!(chunk_message("hello"), vec!["hello"]);
    }

    #[test]
    fn boundary_length_message_is_one_chunk() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH);
        assert_eq!(chunk_message(&text), vec![text.as_str()]);
    }

    #[test]
    fn long_message_splits_in_order() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH * 2 + 10);
        let chunks = chunk_message(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_prefers_newline_boundary() {
        let mut text = "a".repeat(MAX_MESSAGE_LENGTH - 100);
        text.push('\n');
        text.push_str(&"b".repeat(MAX_MESSAGE_LENGTH - 100));

        let chunks = chunk_message(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn split_never_breaks_a_char() {
        let text = "é".repeat(MAX_MESSAGE_LENGTH);
        let chunks = chunk_message(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_MESSAGE_LENGTH);
            // Each chunk must be valid standalone UTF-8; indexing proves it.
            assert!(chunk.chars().all(|c| c == 'é'));
        }
    }
}
