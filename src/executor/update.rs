//! Classified progress updates.
//!
//! Each parsed stdout record maps to exactly one [`StreamUpdate`]. Only
//! forwarded variants reach listeners; [`StreamUpdate::Unrecognized`] exists
//! so classification stays exhaustive.

use serde::{Deserialize, Serialize};

use crate::cli::{ContentBlock, ParsedLine, StreamRecord};

/// A tool the child asked to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    pub name: String,
    pub input: serde_json::Value,
}

/// Cost and session summary carried by a terminal result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub cost_usd: f64,
    pub session_id: String,
    pub is_error: bool,
}

/// Kind tag of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    AssistantText,
    ToolInvocation,
    ToolResult,
    TerminalResult,
    Error,
    Unrecognized,
}

impl UpdateKind {
    /// Stable string tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssistantText => "assistant_text",
            Self::ToolInvocation => "tool_invocation",
            Self::ToolResult => "tool_result",
            Self::TerminalResult => "terminal_result",
            Self::Error => "error",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// One classified event derived from one output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamUpdate {
    /// Prose from the assistant, text blocks joined by newlines.
    AssistantText { content: String },
    /// The assistant requested one or more tools.
    ToolInvocation {
        content: String,
        tool_calls: Vec<ToolCallDescriptor>,
    },
    /// A tool finished; `metadata` is the full raw record.
    ToolResult {
        content: String,
        tool_use_id: Option<String>,
        metadata: serde_json::Value,
    },
    /// The child's end-of-work summary.
    TerminalResult {
        content: String,
        summary: ResultSummary,
    },
    /// The invocation failed.
    Error { content: String },
    /// Anything the relay does not act on.
    Unrecognized { discriminator: String },
}

impl StreamUpdate {
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::AssistantText { .. } => UpdateKind::AssistantText,
            Self::ToolInvocation { .. } => UpdateKind::ToolInvocation,
            Self::ToolResult { .. } => UpdateKind::ToolResult,
            Self::TerminalResult { .. } => UpdateKind::TerminalResult,
            Self::Error { .. } => UpdateKind::Error,
            Self::Unrecognized { .. } => UpdateKind::Unrecognized,
        }
    }

    /// Human-readable content, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::AssistantText { content }
            | Self::ToolInvocation { content, .. }
            | Self::ToolResult { content, .. }
            | Self::TerminalResult { content, .. }
            | Self::Error { content } => Some(content),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Tool calls carried by a tool invocation.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallDescriptor] {
        match self {
            Self::ToolInvocation { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Names of the requested tools.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_calls().iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        match self {
            Self::Error { .. } => true,
            Self::TerminalResult { summary, .. } => summary.is_error,
            _ => false,
        }
    }

    /// Whether listeners should see this update.
    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

/// Classify a parsed line into an update.
///
/// Returns `None` for assistant records with neither text nor tool-use
/// blocks, which are dropped silently.
#[must_use]
pub fn classify(line: &ParsedLine) -> Option<StreamUpdate> {
    let Some(record) = &line.record else {
        return Some(StreamUpdate::Unrecognized {
            discriminator: line.kind.clone(),
        });
    };

    match record {
        StreamRecord::Assistant(assistant) => {
            let tool_calls: Vec<ToolCallDescriptor> = assistant
                .blocks()
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { name, input, .. } => Some(ToolCallDescriptor {
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    _ => None,
                })
                .collect();

            if !tool_calls.is_empty() {
                let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                return Some(StreamUpdate::ToolInvocation {
                    content: format!("Using tools: {}", names.join(", ")),
                    tool_calls,
                });
            }

            let texts = assistant.texts();
            if texts.is_empty() {
                None
            } else {
                Some(StreamUpdate::AssistantText {
                    content: texts.join("\n"),
                })
            }
        }
        StreamRecord::ToolResult(result) => Some(StreamUpdate::ToolResult {
            content: format!(
                "Tool completed: {}",
                result.tool_use_id.as_deref().unwrap_or("unknown")
            ),
            tool_use_id: result.tool_use_id.clone(),
            metadata: line.raw.clone(),
        }),
        StreamRecord::Result(result) => Some(StreamUpdate::TerminalResult {
            content: "Execution completed".to_string(),
            summary: ResultSummary {
                cost_usd: result.cost(),
                session_id: result.session().to_string(),
                is_error: result.is_error,
            },
        }),
        StreamRecord::Unknown => Some(StreamUpdate::Unrecognized {
            discriminator: line.kind.clone(),
        }),
    }
}
