//! Folding classified records into one final response.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cli::{ContentBlock, ParsedLine, ResultRecord, StreamRecord};

/// Default capacity of the rolling record history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Content substituted when the child produced no text.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No response";

/// Number of malformed-line diagnostics retained.
const MAX_DIAGNOSTICS: usize = 32;

/// Fixed-capacity history that silently evicts its oldest entries.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: usize,
}

impl<T> RollingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        self.items.push_back(item);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped so far.
    #[must_use]
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Oldest-first iterator over retained entries.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// The most recent `n` entries, newest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<&T> {
        self.items.iter().rev().take(n).collect()
    }
}

/// Failure category reported on an error-flagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The child exited non-zero.
    ProcessError,
    /// The wall-clock budget ran out.
    Timeout,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessError => "process_error",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation observed during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: serde_json::Value,
    pub id: Option<String>,
}

/// The final answer for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// Text in arrival order, or a placeholder when there was none.
    pub content: String,
    /// Session to resume from; empty if the child reported none.
    pub session_id: String,
    pub cost_usd: f64,
    pub duration_ms: u64,
    /// Records retained in history; capped by the history capacity.
    pub num_turns: usize,
    pub tools_used: Vec<ToolCallRecord>,
    pub is_error: bool,
    pub error_category: Option<ErrorCategory>,
    /// Malformed lines skipped during the run.
    pub diagnostics: usize,
}

impl AggregatedResponse {
    /// Build an error-flagged response for a child that exited non-zero.
    #[must_use]
    pub fn process_error(stderr: &str) -> Self {
        Self {
            content: format!("Error: {stderr}"),
            session_id: String::new(),
            cost_usd: 0.0,
            duration_ms: 0,
            num_turns: 0,
            tools_used: Vec::new(),
            is_error: true,
            error_category: Some(ErrorCategory::ProcessError),
            diagnostics: 0,
        }
    }

    /// Attach the measured wall-clock duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Accumulates everything one invocation needs for its final response.
///
/// Memory held here is bounded by the history capacity except for the
/// aggregated text and tool records, which are the response itself.
#[derive(Debug)]
pub struct ResultAggregator {
    history: RollingBuffer<serde_json::Value>,
    texts: Vec<String>,
    tools: Vec<ToolCallRecord>,
    terminal: Option<ResultRecord>,
    diagnostics: RollingBuffer<String>,
    diagnostic_count: usize,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ResultAggregator {
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: RollingBuffer::new(history_capacity),
            texts: Vec::new(),
            tools: Vec::new(),
            terminal: None,
            diagnostics: RollingBuffer::new(MAX_DIAGNOSTICS),
            diagnostic_count: 0,
        }
    }

    /// Fold one parsed record.
    ///
    /// Every record enters the history, including kinds that produce no
    /// update. A later result record replaces an earlier one.
    pub fn observe(&mut self, line: &ParsedLine) {
        self.history.push(line.raw.clone());

        match &line.record {
            Some(StreamRecord::Assistant(assistant)) => {
                for block in assistant.blocks() {
                    match block {
                        ContentBlock::Text { text } => self.texts.push(text.clone()),
                        ContentBlock::ToolUse { id, name, input } => {
                            self.tools.push(ToolCallRecord {
                                name: name.clone(),
                                input: input.clone(),
                                id: id.clone(),
                            });
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            Some(StreamRecord::Result(result)) => {
                if self.terminal.is_some() {
                    tracing::debug!("Replacing earlier result record");
                }
                self.terminal = Some(result.clone());
            }
            Some(StreamRecord::ToolResult(_) | StreamRecord::Unknown) | None => {}
        }
    }

    /// Record a line that failed structural parsing.
    pub fn record_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostic_count = self.diagnostic_count.saturating_add(1);
        self.diagnostics.push(message.into());
    }

    #[must_use]
    pub fn history(&self) -> &RollingBuffer<serde_json::Value> {
        &self.history
    }

    /// Most recent diagnostics, oldest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<&str> {
        self.diagnostics.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostic_count
    }

    /// The last result record seen, if any.
    #[must_use]
    pub fn terminal(&self) -> Option<&ResultRecord> {
        self.terminal.as_ref()
    }

    /// Produce the final response.
    #[must_use]
    pub fn finish(self) -> AggregatedResponse {
        let content = if self.texts.is_empty() {
            EMPTY_RESPONSE_PLACEHOLDER.to_string()
        } else {
            self.texts.join("\n")
        };
        let (session_id, cost_usd) = self
            .terminal
            .as_ref()
            .map_or((String::new(), 0.0), |r| (r.session().to_string(), r.cost()));

        AggregatedResponse {
            content,
            session_id,
            cost_usd,
            duration_ms: 0,
            num_turns: self.history.len(),
            tools_used: self.tools,
            is_error: false,
            error_category: None,
            diagnostics: self.diagnostic_count,
        }
    }
}
