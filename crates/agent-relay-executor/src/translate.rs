//! Translation of agent stream-json records into relay events.

use agent_relay_core::{EventKind, ExecutionContext, RelayEvent, SessionId, ToolCall};
use serde_json::Value;

use crate::correlation::{CorrelationTracker, PendingMutation};

/// Maps decoded frames of one session onto the relay event vocabulary.
///
/// Holds no state of its own; the only mutable input is the session's
/// [`CorrelationTracker`], which is passed in on every call.
#[derive(Debug, Clone)]
pub struct Translator {
    session_id: SessionId,
    ctx: ExecutionContext,
}

impl Translator {
    #[must_use]
    pub const fn new(session_id: SessionId, ctx: ExecutionContext) -> Self {
        Self { session_id, ctx }
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Translate one frame into zero or more events.
    ///
    /// A frame that is not JSON yields exactly one `raw_output` carrying it
    /// verbatim. Otherwise the first event is always the unmodified record as
    /// `agent_event`, followed by whatever the record's `type` translates to.
    pub fn translate(&self, frame: &str, tracker: &mut CorrelationTracker) -> Vec<RelayEvent> {
        let record: Value = match serde_json::from_str(frame.trim()) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(session_id = %self.session_id, "Unparseable frame: {e}");
                return vec![self.event(EventKind::RawOutput {
                    text: frame.to_string(),
                })];
            }
        };

        let mut kinds = Vec::new();
        match record.get("type").and_then(Value::as_str) {
            Some("system") => {
                if record.get("subtype").and_then(Value::as_str) == Some("init") {
                    kinds.push(init(&record));
                }
            }
            Some("result") => kinds.push(result(&record)),
            Some("assistant") => self.assistant(&record, tracker, &mut kinds),
            Some("user") => user(&record, tracker, &mut kinds),
            _ => {}
        }

        let mut events = Vec::with_capacity(kinds.len() + 1);
        events.push(self.event(EventKind::AgentEvent { event: record }));
        events.extend(kinds.into_iter().map(|kind| self.event(kind)));
        events
    }

    fn assistant(&self, record: &Value, tracker: &mut CorrelationTracker, out: &mut Vec<EventKind>) {
        for block in content_blocks(record) {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        out.push(EventKind::FeAssistantText {
                            text: text.to_string(),
                        });
                    }
                }
                Some("tool_use") => out.push(self.tool_use(block, tracker)),
                _ => {}
            }
        }
    }

    fn tool_use(&self, block: &Value, tracker: &mut CorrelationTracker) -> EventKind {
        let tool_call_id = block
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
        let input = block.get("input").cloned().unwrap_or(Value::Null);

        let call = ToolCall::from_invocation(name, &input);
        let description = call.describe(&self.ctx, &input);

        if let Some((path, action)) = call.mutation() {
            if tool_call_id.is_empty() {
                tracing::warn!(session_id = %self.session_id, tool = name, "Mutating tool call without id");
            } else {
                tracker.register(
                    tool_call_id.clone(),
                    PendingMutation {
                        target_path: self.ctx.relativize(path),
                        action,
                    },
                );
            }
        }

        EventKind::FeToolCall {
            tool_call_id,
            call,
            description,
        }
    }

    fn event(&self, kind: EventKind) -> RelayEvent {
        RelayEvent::for_session(self.session_id, kind)
    }
}

fn init(record: &Value) -> EventKind {
    EventKind::FeInit {
        model: str_field(record, "model"),
        tools: record.get("tools").cloned().unwrap_or(Value::Null),
        cwd: str_field(record, "cwd"),
    }
}

fn result(record: &Value) -> EventKind {
    let is_error = record
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let subtype_ok = record
        .get("subtype")
        .and_then(Value::as_str)
        .is_none_or(|subtype| subtype == "success");

    EventKind::FeResult {
        success: !is_error && subtype_ok,
        result: str_field(record, "result"),
        num_turns: record.get("num_turns").and_then(Value::as_u64),
        cost_usd: record
            .get("total_cost_usd")
            .or_else(|| record.get("cost_usd"))
            .and_then(Value::as_f64),
    }
}

fn user(record: &Value, tracker: &mut CorrelationTracker, out: &mut Vec<EventKind>) {
    for block in content_blocks(record) {
        if block.get("type").and_then(Value::as_str) != Some("tool_result") {
            continue;
        }
        let tool_call_id = block
            .get("tool_use_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mutation = tracker.take(&tool_call_id);
        out.push(EventKind::FeToolResult {
            tool_call_id,
            output: flatten_output(block.get("content").unwrap_or(&Value::Null)),
            is_error: block
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
        if let Some(PendingMutation {
            target_path,
            action,
        }) = mutation
        {
            out.push(EventKind::FeFileChanged {
                file_path: target_path,
                action,
            });
        }
    }
}

/// `message.content` as a list of blocks; a plain string content has none.
fn content_blocks(record: &Value) -> &[Value] {
    record
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Tool result content is either a string or a list of content blocks.
fn flatten_output(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| match b.get("type").and_then(Value::as_str) {
                Some("text") => b.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}
