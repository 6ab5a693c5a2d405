//! Colored console rendering of relay progress.
//!
//! Stands in for a chat transport: updates are printed as they arrive and
//! the final response is delivered in size-limited pieces.

use std::io::{self, Write};

use async_trait::async_trait;
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::executor::{AggregatedResponse, ListenerError, StreamUpdate, UpdateListener};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Largest byte index `<= index` that falls on a char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        format!("{}...", &s[..floor_char_boundary(s, max_len - 3)])
    }
}

/// Format tool input for display, truncating long values.
#[must_use]
pub fn format_tool_input(input: &serde_json::Value, raw_mode: bool) -> String {
    match input {
        serde_json::Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let value_str = match v {
                        serde_json::Value::String(s) => truncate(s, 50, raw_mode),
                        other => truncate(&other.to_string(), 50, raw_mode),
                    };
                    format!("{k}={value_str}")
                })
                .collect();
            pairs.join(", ")
        }
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

/// Split text into pieces of at most `max_len` bytes.
///
/// Breaks at the last newline inside the limit when there is one, otherwise
/// at the last char boundary. Never yields empty pieces.
#[must_use]
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(4);
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > max_len {
        let limit = floor_char_boundary(rest, max_len);
        let cut = match rest[..limit].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ => limit,
        };
        pieces.push(rest[..cut].to_string());
        rest = rest[cut..].strip_prefix('\n').unwrap_or(&rest[cut..]);
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Print one progress update.
pub fn print_update(update: &StreamUpdate, raw_mode: bool) {
    let ts = timestamp();
    match update {
        StreamUpdate::AssistantText { content } => {
            println!("{} {} {}", ts.dimmed(), "[CLAUDE]".blue().bold(), truncate(content, 200, raw_mode));
        }
        StreamUpdate::ToolInvocation { tool_calls, .. } => {
            for call in tool_calls {
                println!(
                    "{} {} {} ({})",
                    ts.dimmed(),
                    "[TOOL]".cyan().bold(),
                    call.name.bold(),
                    format_tool_input(&call.input, raw_mode).dimmed()
                );
            }
        }
        StreamUpdate::ToolResult { content, metadata, .. } => {
            let failed = metadata
                .get("is_error")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let tag = if failed {
                "[RESULT]".red().bold().to_string()
            } else {
                "[RESULT]".green().bold().to_string()
            };
            println!("{} {} {}", ts.dimmed(), tag, truncate(content, 150, raw_mode).dimmed());
        }
        StreamUpdate::TerminalResult { summary, .. } => {
            println!(
                "{} {} Session completed (cost: ${:.4}) {}",
                ts.dimmed(),
                "[SESSION]".blue().bold(),
                summary.cost_usd,
                format!("session_id={}", truncate(&summary.session_id, 20, raw_mode)).dimmed()
            );
        }
        StreamUpdate::Error { content } => print_error(&truncate(content, 200, raw_mode)),
        StreamUpdate::Unrecognized { discriminator } => {
            println!("{} {}", ts.dimmed(), format!("[{discriminator}]").yellow().bold());
        }
    }
    let _ = io::stdout().flush();
}

/// Print the final response, split into transport-sized pieces.
pub fn print_response(response: &AggregatedResponse, max_len: usize) {
    for piece in split_message(&response.content, max_len) {
        println!("{piece}");
    }
    if response.is_error {
        let category = response
            .error_category
            .map_or_else(String::new, |c| c.to_string());
        println!("{} {}", "[FAILED]".red().bold(), category.dimmed());
    } else {
        println!(
            "{} cost=${:.4} turns={} tools={} {}",
            "[DONE]".green().bold(),
            response.cost_usd,
            response.num_turns,
            response.tools_used.len(),
            format!("session_id={}", response.session_id).dimmed()
        );
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}

/// Listener that renders updates on the console.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleListener {
    pub raw_mode: bool,
}

#[async_trait]
impl UpdateListener for ConsoleListener {
    async fn on_update(&self, update: &StreamUpdate) -> Result<(), ListenerError> {
        print_update(update, self.raw_mode);
        Ok(())
    }
}
