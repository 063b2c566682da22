//! Claudecord - bridges Discord channels to the claude CLI.
//!
//! Each inbound channel message is forwarded as a prompt to a `claude`
//! subprocess running in non-interactive stream-json mode. Progress events
//! (tool calls, thinking, tool results) are rendered back into the channel
//! while the subprocess runs, and the final answer carries a session id that
//! lets the next message in the same channel resume the conversation.

pub mod bot;
pub mod config;
pub mod events;
pub mod present;
pub mod queue;
pub mod runner;
pub mod session;
pub mod stream;
