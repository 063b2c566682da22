//! Common test utilities.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use claudecord::config::ClaudeConfig;
use claudecord::present::{OutputSink, SinkError};
use claudecord::runner::ClaudeRunner;

/// Sink that records every fragment it is asked to deliver.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Write an executable fake `claude` script into `dir` and return its path.
///
/// The script consumes stdin (the prompt) before running `body`, mirroring
/// the real CLI reading its prompt to end-of-input.
pub fn fake_claude(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("claude");
    // bash, not sh: dash's builtin `echo` expands `\n` escapes, which would
    // split JSON bodies containing literal `\n` across two lines.
    let script = format!("#!/usr/bin/env bash\ncat >/dev/null\n{body}\n");
    std::fs::write(&path, script).unwrap();

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();

    path
}

/// Runner wired to a fake claude script.
pub fn runner_for(script: &Path, dir: &TempDir) -> ClaudeRunner {
    ClaudeRunner::new(&ClaudeConfig {
        command: script.to_string_lossy().into_owned(),
        work_dir: dir.path().to_path_buf(),
        allowed_tools: vec!["Bash".to_string()],
    })
}
