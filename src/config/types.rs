//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cli::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINE_BYTES};
use crate::executor::DEFAULT_HISTORY_CAPACITY;

/// Tools the child may use unless configured otherwise.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Glob",
    "Grep",
    "Task",
    "WebFetch",
    "WebSearch",
    "TodoWrite",
    "Skill",
    "SlashCommand",
    "AskUserQuestion",
];

/// Configuration for running the Claude Code child process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Binary to run.
    pub binary: String,
    /// Arguments placed before the generated flags.
    pub binary_args: Vec<String>,
    /// Directory the child runs in.
    pub working_dir: PathBuf,
    /// Wall-clock budget per invocation.
    pub timeout_secs: u64,
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    /// Bytes requested from stdout per read.
    pub chunk_size: usize,
    /// Records kept in the rolling history.
    pub history_capacity: usize,
    /// Lines longer than this are dropped.
    pub max_line_bytes: usize,
    /// Pass `--verbose` to the child.
    pub verbose: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            binary_args: Vec::new(),
            working_dir: PathBuf::from("."),
            timeout_secs: 900,
            max_turns: 10,
            allowed_tools: DEFAULT_ALLOWED_TOOLS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            verbose: true,
        }
    }
}

/// Sliding-window rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Requests admitted per window.
    pub limit: usize,
    pub window_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 60,
        }
    }
}

/// Output rendering configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Largest message delivered in one piece.
    pub message_chunk_size: usize,
    /// Disable truncation of progress output.
    pub raw_mode: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            message_chunk_size: 4096,
            raw_mode: false,
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub executor: ExecutorConfig,
    pub gate: GateConfig,
    pub display: DisplayConfig,
}
