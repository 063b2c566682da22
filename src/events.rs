//! Structured events emitted by the claude CLI in stream-json mode.
//!
//! The CLI writes newline-delimited JSON on stdout, each line tagged by a
//! `type` field. Only the kinds rendered into chat (or carrying the terminal
//! outcome) are modeled; everything else collapses into `Other`.

use serde::Deserialize;
use serde_json::Value;

/// One decoded event line from the claude subprocess.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeEvent {
    /// An assistant turn carrying ordered content blocks.
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },

    /// Echo of a tool execution fed back to the model.
    User {
        #[serde(default)]
        tool_use_result: Option<ToolUseResult>,
    },

    /// Terminal event with the final answer text and the session id.
    /// At most one is expected per invocation; if more occur, the last wins.
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Any event kind we do not render (system, deltas, ...).
    #[serde(other)]
    Other,
}

/// Body of an `assistant` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A sub-unit of an assistant message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A tool invocation request. `input` is arbitrary JSON.
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// Extended thinking text.
    Thinking {
        #[serde(default)]
        thinking: String,
    },

    /// Text and any other block kinds are not rendered as progress.
    #[serde(other)]
    Other,
}

/// Captured stdout/stderr of a tool execution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolUseResult {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}
