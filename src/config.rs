use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// -----------------------------------------------------------------------------
// Config (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            claude: ClaudeConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path);
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_yaml::from_str(&contents).map_err(ConfigError::Yaml)
    }

    /// Apply `CLAUDE_PATH` / `WORK_DIR` from the process environment on top
    /// of whatever the file configured.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("CLAUDE_PATH").ok(),
            std::env::var("WORK_DIR").ok(),
        );
    }

    fn apply_overrides(&mut self, claude_path: Option<String>, work_dir: Option<String>) {
        if let Some(path) = claude_path.filter(|p| !p.is_empty()) {
            self.claude.command = path;
        }
        if let Some(dir) = work_dir.filter(|d| !d.is_empty()) {
            self.claude.work_dir = PathBuf::from(dir);
        }
    }
}

// -----------------------------------------------------------------------------
// ClaudeConfig
// -----------------------------------------------------------------------------

/// Tools the claude CLI is allowed to use unless the config says otherwise.
pub const DEFAULT_ALLOWED_TOOLS: [&str; 10] = [
    "Bash",
    "Read",
    "Edit",
    "Write",
    "Glob",
    "Grep",
    "WebSearch",
    "WebFetch",
    "NotebookEdit",
    "Task",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeConfig {
    /// Command used to invoke the claude CLI.
    #[serde(default = "default_command")]
    pub command: String,
    /// Working directory the subprocess runs in.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Allow-list passed as `--allowedTools`.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            work_dir: default_work_dir(),
            allowed_tools: default_allowed_tools(),
        }
    }
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_allowed_tools() -> Vec<String> {
    DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect()
}

// -----------------------------------------------------------------------------
// SessionConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of channels to track sessions for.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> usize {
    crate::session::DEFAULT_MAX_SESSIONS
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {e}"),
            ConfigError::Yaml(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Yaml(e) => Some(e),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
