//! Append-only conversation transcript, stored as structured events.
//!
//! The transcript is the only durable log of what happened on a call:
//! every caller turn, every agent reply, and every tool outcome (success
//! or failure) appends exactly one event. Events are never rewritten or
//! truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcomeKind {
    Success,
    Error,
}

impl ToolOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    CallerTurn { text: String },
    AgentTurn { text: String },
    ToolOutcome { tool: String, outcome: ToolOutcomeKind, message: String },
}

impl TranscriptEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallerTurn { .. } => "caller_turn",
            Self::AgentTurn { .. } => "agent_turn",
            Self::ToolOutcome { .. } => "tool_outcome",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub event_id: String,
    pub order_id: OrderId,
    pub entry: TranscriptEntry,
    pub occurred_at: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(order_id: OrderId, entry: TranscriptEntry) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            order_id,
            entry,
            occurred_at: Utc::now(),
        }
    }

    /// Single-line rendering for operator screens and plain-text exports.
    pub fn render_line(&self) -> String {
        let timestamp = self.occurred_at.format("%Y-%m-%d %H:%M:%S");
        match &self.entry {
            TranscriptEntry::CallerTurn { text } => format!("[{timestamp}] [caller] {text}"),
            TranscriptEntry::AgentTurn { text } => format!("[{timestamp}] [agent] {text}"),
            TranscriptEntry::ToolOutcome { tool, outcome, message } => {
                format!("[{timestamp}] [tool:{tool}] {} {message}", outcome.as_str())
            }
        }
    }
}
