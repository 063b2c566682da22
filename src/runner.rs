//! Spawns the claude CLI for one prompt and streams its output.
//!
//! One subprocess per invocation: the prompt goes in on stdin, stream-json
//! events come back on stdout and are presented as they arrive, stderr is
//! diagnostics only. The call resolves after the process exits.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ClaudeConfig;
use crate::events::ClaudeEvent;
use crate::present::{self, OutputSink};
use crate::stream::LineDecoder;

/// Environment marker the CLI sets inside its own tool sandboxes. Cleared
/// before each spawn so the child does not detect itself as nested.
const NESTED_MARKER: &str = "CLAUDECODE";

/// Outcome of one successful invocation.
///
/// Both fields may be absent: a zero exit without a `result` event is a
/// valid, empty-looking success. Callers substitute a placeholder when
/// presenting to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub text: Option<String>,
    pub session_id: Option<String>,
}

/// Failure of one invocation.
#[derive(Debug)]
pub enum RunnerError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    Exit { code: Option<i32> },
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::Spawn(e) => write!(f, "failed to spawn claude: {e}"),
            RunnerError::Io(e) => write!(f, "i/o error talking to claude: {e}"),
            RunnerError::Exit { code: Some(code) } => write!(f, "claude exited {code}"),
            RunnerError::Exit { code: None } => write!(f, "claude terminated by signal"),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunnerError::Spawn(e) | RunnerError::Io(e) => Some(e),
            RunnerError::Exit { .. } => None,
        }
    }
}

/// Runs claude CLI invocations with a fixed command, working directory and
/// tool allow-list.
pub struct ClaudeRunner {
    command: String,
    work_dir: PathBuf,
    allowed_tools: Vec<String>,
}

impl ClaudeRunner {
    pub fn new(config: &ClaudeConfig) -> Self {
        Self {
            command: config.command.clone(),
            work_dir: config.work_dir.clone(),
            allowed_tools: config.allowed_tools.clone(),
        }
    }

    /// Run one prompt to completion.
    ///
    /// Decoded events are presented against `sink` in emission order while
    /// the subprocess runs. `result` events additionally update the candidate
    /// outcome; the last one wins. Resolves after process exit: zero status
    /// yields the captured outcome, non-zero fails with the exit code.
    pub async fn run(
        &self,
        prompt: &str,
        session_id: Option<&str>,
        sink: &dyn OutputSink,
    ) -> Result<Outcome, RunnerError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.build_args(session_id))
            .current_dir(&self.work_dir)
            .env_remove(NESTED_MARKER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // On Linux, make sure the child dies with us.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;
        info!(pid = child.id().unwrap_or(0), "Spawned claude");

        // The subprocess is not interactive from this side: write the prompt
        // and signal end-of-input immediately.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(RunnerError::Io)?;
            stdin.shutdown().await.map_err(RunnerError::Io)?;
        }

        // stderr goes to the diagnostic log only, never to the sink.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "claudecord::claude_stderr", "{line}");
                }
            });
        }

        let mut stdout = child.stdout.take().expect("stdout is piped");
        let mut decoder = LineDecoder::new();
        let mut carry: Vec<u8> = Vec::new();
        let mut outcome = Outcome::default();
        let mut buf = [0u8; 8192];

        loop {
            let n = stdout.read(&mut buf).await.map_err(RunnerError::Io)?;
            if n == 0 {
                break;
            }
            carry.extend_from_slice(&buf[..n]);
            let chunk = take_valid_utf8(&mut carry);
            for event in decoder.feed(&chunk) {
                if let ClaudeEvent::Result { result, session_id } = &event {
                    outcome.text = result.clone();
                    outcome.session_id = session_id.clone();
                }
                present::present_event(&event, sink).await;
            }
        }

        let status = child.wait().await.map_err(RunnerError::Io)?;
        info!(status = %status, "claude exited");

        if !status.success() {
            return Err(RunnerError::Exit {
                code: status.code(),
            });
        }
        Ok(outcome)
    }

    /// Argument list for one invocation: non-interactive stream-json mode
    /// with verbose diagnostics and the tool allow-list, plus a resume
    /// directive when continuing a session.
    fn build_args(&self, session_id: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--allowedTools".to_string(),
        ];
        args.extend(self.allowed_tools.iter().cloned());
        if let Some(id) = session_id {
            args.push("--resume".to_string());
            args.push(id.to_string());
        }
        args
    }
}

/// Drain the decodable prefix of `carry`, leaving only a possibly-incomplete
/// trailing multi-byte sequence for the next read.
///
/// Invalid bytes are consumed and replaced with U+FFFD so a single bad byte
/// cannot wedge the buffer and starve every later event.
fn take_valid_utf8(carry: &mut Vec<u8>) -> String {
    let mut chunk = String::new();
    loop {
        match std::str::from_utf8(carry) {
            Ok(s) => {
                chunk.push_str(s);
                carry.clear();
                return chunk;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                chunk.push_str(&String::from_utf8_lossy(&carry[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        chunk.push(char::REPLACEMENT_CHARACTER);
                        carry.drain(..valid + bad);
                    }
                    None => {
                        // Split multi-byte sequence; the rest arrives next read.
                        carry.drain(..valid);
                        return chunk;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClaudeConfig;

    fn runner(tools: &[&str]) -> ClaudeRunner {
        ClaudeRunner::new(&ClaudeConfig {
            command: "claude".to_string(),
            work_dir: PathBuf::from("."),
            allowed_tools: tools.iter().map(|t| t.to_string()).collect(),
        })
    }

    #[test]
    fn args_without_session_have_no_resume() {
        let args = runner(&["Bash", "Read"]).build_args(None);
        assert_eq!(
            args,
            vec![
                "-p",
                "--output-format",
                "stream-json",
                "--verbose",
                "--allowedTools",
                "Bash",
                "Read",
            ]
        );
    }

    #[test]
    fn args_with_session_append_resume() {
        let args = runner(&["Bash"]).build_args(Some("S1"));
        assert_eq!(args[args.len() - 2], "--resume");
        assert_eq!(args[args.len() - 1], "S1");
    }

    #[test]
    fn take_valid_utf8_keeps_split_sequences() {
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte 'é'.
        let mut carry = bytes[..2].to_vec();
        let first = take_valid_utf8(&mut carry);
        assert_eq!(first, "h");
        assert_eq!(carry.len(), 1);

        carry.extend_from_slice(&bytes[2..]);
        let rest = take_valid_utf8(&mut carry);
        assert_eq!(rest, "éllo");
        assert!(carry.is_empty());
    }

    #[test]
    fn take_valid_utf8_replaces_invalid_bytes_and_moves_on() {
        let mut carry = b"ab\xffcd".to_vec();
        assert_eq!(take_valid_utf8(&mut carry), "ab\u{fffd}cd");
        assert!(carry.is_empty());

        // The buffer keeps draining on later reads.
        carry.extend_from_slice(b"\xff\xff tail");
        assert_eq!(take_valid_utf8(&mut carry), "\u{fffd}\u{fffd} tail");
        assert!(carry.is_empty());
    }

    #[test]
    fn take_valid_utf8_passes_clean_input_through() {
        let mut carry = b"plain ascii".to_vec();
        assert_eq!(take_valid_utf8(&mut carry), "plain ascii");
        assert!(carry.is_empty());
    }

    #[test]
    fn runner_error_messages() {
        assert_eq!(
            RunnerError::Exit { code: Some(1) }.to_string(),
            "claude exited 1"
        );
        assert_eq!(
            RunnerError::Exit { code: None }.to_string(),
            "claude terminated by signal"
        );
    }
}
