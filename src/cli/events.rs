//! Record types from Claude Code stream-json output.
//!
//! Each stdout line of `claude --output-format stream-json` is one JSON object
//! whose `type` field selects the record kind. Only the kinds the relay acts on
//! are modelled; everything else lands in [`StreamRecord::Unknown`].
//!
//! Fields are read leniently: a field holding an unexpected type is treated as
//! absent and a malformed content block is skipped, so one odd value never
//! discards the rest of its record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// One block inside an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Prose produced by the model.
    Text {
        /// The text content.
        #[serde(default)]
        text: String,
    },
    /// A request to run a tool.
    ToolUse {
        /// Tool use identifier, echoed back by the matching tool result.
        #[serde(default)]
        id: Option<String>,
        /// Name of the tool being invoked.
        name: String,
        /// Tool input parameters.
        #[serde(default = "empty_object")]
        input: serde_json::Value,
    },
    /// Catch-all for block kinds the relay ignores (thinking, images, ...).
    #[serde(other)]
    Other,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Deserialize an optional field, treating a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`lenient`] for flags; anything but a boolean reads as `false`.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let flag: Option<bool> = lenient(deserializer)?;
    Ok(flag.unwrap_or(false))
}

/// Deserialize content blocks one at a time, dropping those that do not fit.
fn lenient_blocks<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ContentBlock>, D::Error> {
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed content block");
                None
            }
        })
        .collect())
}

/// Message body of an assistant record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
}

/// Assistant record.
///
/// Current CLI versions nest the blocks under `message.content`; older ones
/// put a `content` array on the record itself. Both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<AssistantMessage>,
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
}

impl AssistantRecord {
    /// Content blocks in arrival order, wherever the CLI placed them.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.message {
            Some(message) if !message.content.is_empty() => &message.content,
            _ => &self.content,
        }
    }

    /// Text of every text block, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.blocks()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Tool execution result record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// Identifier matching the originating tool use.
    #[serde(default, deserialize_with = "lenient")]
    pub tool_use_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_error: bool,
}

/// Terminal result record, the child's end-of-work summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Result subtype (e.g., "success", "`error_max_turns`").
    #[serde(default, deserialize_with = "lenient")]
    pub subtype: Option<String>,
    /// Session identifier to resume from.
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
    /// Total cost in USD.
    #[serde(default, deserialize_with = "lenient")]
    pub total_cost_usd: Option<f64>,
    /// Cost field written by older CLI versions.
    #[serde(default, deserialize_with = "lenient")]
    pub cost_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_error: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub num_turns: Option<u32>,
    /// Final text, if the CLI included one.
    #[serde(default, deserialize_with = "lenient")]
    pub result: Option<String>,
}

impl ResultRecord {
    /// Cost in USD, zero when absent.
    #[must_use]
    pub fn cost(&self) -> f64 {
        self.total_cost_usd.or(self.cost_usd).unwrap_or(0.0)
    }

    /// Session identifier, empty when absent.
    #[must_use]
    pub fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or_default()
    }
}

/// Records emitted by Claude Code in stream-json format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// Assistant message (prose and/or tool requests).
    Assistant(AssistantRecord),
    /// Tool execution result.
    ToolResult(ToolResultRecord),
    /// Final result.
    Result(ResultRecord),
    /// Catch-all for record kinds the relay does not act on.
    #[serde(other)]
    Unknown,
}

impl StreamRecord {
    /// Returns true if this is a terminal record.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}
