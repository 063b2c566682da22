//! Renders structured events into chat-sized message fragments.
//!
//! Presentation is total per event: a failure to deliver one fragment is
//! logged and swallowed so that a single bad event cannot abort the rest of
//! the exchange.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::events::{ClaudeEvent, ContentBlock};

/// Upper bound for a rendered fragment body, leaving headroom under
/// Discord's 2000-character message limit for the surrounding markup.
pub const FRAGMENT_CAP: usize = 1900;

/// Failure delivering a fragment to the chat transport.
#[derive(Debug)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "send failed: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// Destination for outbound chat messages.
///
/// Implementations own any transport-level chunking; callers hand over one
/// logical fragment at a time and fragments are delivered in call order.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), SinkError>;
}

/// Render one event against the sink.
///
/// Send failures are logged and swallowed here, never raised to the caller.
pub async fn present_event(event: &ClaudeEvent, sink: &dyn OutputSink) {
    for fragment in render_fragments(event) {
        if let Err(e) = sink.send(&fragment).await {
            warn!(error = %e, "Failed to deliver progress fragment");
        }
    }
}

/// Map an event to its ordered, already-truncated message fragments.
///
/// Only assistant content blocks and tool results render anything; `result`
/// events are consumed by the runner and unknown kinds are ignored.
pub fn render_fragments(event: &ClaudeEvent) -> Vec<String> {
    match event {
        ClaudeEvent::Assistant { message } => {
            message.content.iter().filter_map(render_block).collect()
        }
        ClaudeEvent::User {
            tool_use_result: Some(result),
        } => {
            let mut output = result.stdout.clone().unwrap_or_default();
            if let Some(stderr) = result.stderr.as_deref() {
                if !stderr.is_empty() {
                    output.push_str("\nstderr: ");
                    output.push_str(stderr);
                }
            }
            let output = output.trim();
            if output.is_empty() {
                Vec::new()
            } else {
                vec![format!(
                    "📋 **Result**\n```\n{}\n```",
                    truncate(output, FRAGMENT_CAP)
                )]
            }
        }
        _ => Vec::new(),
    }
}

fn render_block(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::ToolUse { name, input } => {
            let input = render_input(input);
            Some(format!(
                "🔧 **{name}**\n```\n{}\n```",
                truncate(&input, FRAGMENT_CAP)
            ))
        }
        ContentBlock::Thinking { thinking } if !thinking.is_empty() => Some(format!(
            "💭 *Thinking...*\n>>> {}",
            truncate(thinking, FRAGMENT_CAP)
        )),
        _ => None,
    }
}

/// Tool inputs are arbitrary JSON; strings go through verbatim, everything
/// else is pretty-printed.
fn render_input(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Truncate to at most `max` bytes, backing off to a char boundary.
pub fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
