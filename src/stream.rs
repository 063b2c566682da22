//! Incremental decoder for the claude CLI's newline-delimited JSON output.
//!
//! Chunks arrive with arbitrary boundaries, so a partial trailing line is
//! carried between feeds. The split step is a pure function so the
//! chunk-boundary behavior can be tested in isolation.

use tracing::debug;

use crate::events::ClaudeEvent;

/// Append `chunk` to `buffer` and split off all complete lines.
///
/// Returns the new pending buffer (the trailing segment without a newline)
/// and the complete lines in order.
pub fn split_complete_lines(buffer: String, chunk: &str) -> (String, Vec<String>) {
    let mut data = buffer;
    data.push_str(chunk);

    let mut lines: Vec<String> = data.split('\n').map(str::to_owned).collect();
    // split always yields at least one segment
    let pending = lines.pop().unwrap_or_default();
    (pending, lines)
}

/// Stateful decoder from raw text chunks to parsed events.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every event completed by this chunk, in emission order.
    ///
    /// Whitespace-only lines are skipped. A line that fails to parse is
    /// dropped; the subprocess protocol is trusted but not guaranteed
    /// byte-clean, and one bad line must not corrupt the rest of the stream.
    pub fn feed(&mut self, chunk: &str) -> Vec<ClaudeEvent> {
        let (pending, lines) = split_complete_lines(std::mem::take(&mut self.pending), chunk);
        self.pending = pending;
        lines.iter().filter_map(|line| parse_line(line)).collect()
    }
}

fn parse_line(line: &str) -> Option<ClaudeEvent> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(line = %line, error = %e, "Skipping unparseable event line");
            None
        }
    }
}
