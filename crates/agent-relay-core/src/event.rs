//! Event vocabulary pushed to observers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ToolCall, traits::SessionId};

/// A timestamped, tagged record emitted on the event channel.
///
/// On the wire this is a flat JSON object:
/// `{ "type": ..., "sessionId": ..., "timestamp": ..., ...fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    /// Originating session. Absent for process-wide notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Tag and payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event tag and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// Subprocess spawned; always the first event of a session.
    SessionStart {
        prompt: String,
        working_directory: PathBuf,
    },
    /// Subprocess exited; always the last event of a session.
    /// `exit_code` is `None` when the process was ended by a signal.
    SessionEnd { exit_code: Option<i32> },
    /// Parsed agent record, unmodified.
    AgentEvent { event: Value },
    /// A line that did not parse as JSON, verbatim.
    RawOutput { text: String },
    /// One line of subprocess stderr.
    Stderr { text: String },
    FeInit {
        model: Option<String>,
        tools: Value,
        cwd: Option<String>,
    },
    FeResult {
        success: bool,
        result: Option<String>,
        num_turns: Option<u64>,
        cost_usd: Option<f64>,
    },
    FeAssistantText { text: String },
    FeToolCall {
        tool_call_id: String,
        #[serde(flatten)]
        call: ToolCall,
        description: String,
    },
    FeToolResult {
        tool_call_id: String,
        output: String,
        is_error: bool,
    },
    FeFileChanged { file_path: String, action: FileAction },
}

impl EventKind {
    /// Wire value of the `type` tag.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::SessionEnd { .. } => "session_end",
            Self::AgentEvent { .. } => "agent_event",
            Self::RawOutput { .. } => "raw_output",
            Self::Stderr { .. } => "stderr",
            Self::FeInit { .. } => "fe_init",
            Self::FeResult { .. } => "fe_result",
            Self::FeAssistantText { .. } => "fe_assistant_text",
            Self::FeToolCall { .. } => "fe_tool_call",
            Self::FeToolResult { .. } => "fe_tool_result",
            Self::FeFileChanged { .. } => "fe_file_changed",
        }
    }
}

/// Kind of file mutation a tool invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Write,
    Edit,
}

impl RelayEvent {
    /// Stamp a new event with the current time.
    #[must_use]
    pub fn new(session_id: Option<SessionId>, kind: EventKind) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Stamp a new event belonging to `session_id`.
    #[must_use]
    pub fn for_session(session_id: SessionId, kind: EventKind) -> Self {
        Self::new(Some(session_id), kind)
    }

    /// Wire value of the `type` tag.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Convert to an SSE event named after the `type` tag.
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn to_sse_event(&self) -> axum::response::sse::Event {
        let event = axum::response::sse::Event::default().event(self.event_type());
        match serde_json::to_string(self) {
            Ok(json) => event.data(json),
            Err(e) => {
                tracing::error!("Failed to serialize event: {e}");
                event.data("{}")
            }
        }
    }
}
