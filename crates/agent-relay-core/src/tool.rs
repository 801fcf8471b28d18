//! Tool invocation shapes.
//!
//! Every tool name the agent may emit is mapped onto a closed set of
//! variants. Unrecognized names, and recognized names whose input does not
//! have the expected shape, land in [`ToolCall::Other`] with the raw input.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{ExecutionContext, FileAction};

/// Tool-specific payload of an `fe_tool_call` event.
///
/// Field values are the agent's input, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolCall {
    Read {
        file_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
    Write {
        file_path: String,
        content: String,
    },
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
        replace_all: bool,
    },
    MultiEdit {
        file_path: String,
        edits: Value,
    },
    Bash {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    Glob {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Grep {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        glob: Option<String>,
    },
    Task {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent_type: Option<String>,
    },
    /// Fallback for any tool without a dedicated shape.
    Other { name: String, input: Value },
}

/// Agent tool names with a dedicated translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    Read,
    Write,
    Edit,
    MultiEdit,
    Bash,
    Glob,
    Grep,
    Task,
    Other,
}

impl ToolKind {
    fn from_name(name: &str) -> Self {
        match name {
            "Read" => Self::Read,
            "Write" => Self::Write,
            "Edit" => Self::Edit,
            "MultiEdit" => Self::MultiEdit,
            "Bash" => Self::Bash,
            "Glob" => Self::Glob,
            "Grep" => Self::Grep,
            "Task" => Self::Task,
            _ => Self::Other,
        }
    }
}

#[derive(Deserialize)]
struct ReadInput {
    file_path: String,
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct WriteInput {
    file_path: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct EditInput {
    file_path: String,
    #[serde(default)]
    old_string: String,
    #[serde(default)]
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Deserialize)]
struct MultiEditInput {
    file_path: String,
    #[serde(default)]
    edits: Value,
}

#[derive(Deserialize)]
struct BashInput {
    command: String,
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct GlobInput {
    pattern: String,
    path: Option<String>,
}

#[derive(Deserialize)]
struct GrepInput {
    pattern: String,
    path: Option<String>,
    glob: Option<String>,
}

#[derive(Deserialize)]
struct TaskInput {
    prompt: String,
    subagent_type: Option<String>,
}

fn parse<T: DeserializeOwned>(input: &Value) -> Option<T> {
    serde_json::from_value(input.clone()).ok()
}

impl ToolCall {
    /// Map a `tool_use` block's name and input onto a tool shape.
    #[must_use]
    pub fn from_invocation(name: &str, input: &Value) -> Self {
        let call = match ToolKind::from_name(name) {
            ToolKind::Read => parse::<ReadInput>(input).map(|i| Self::Read {
                file_path: i.file_path,
                offset: i.offset,
                limit: i.limit,
            }),
            ToolKind::Write => parse::<WriteInput>(input).map(|i| Self::Write {
                file_path: i.file_path,
                content: i.content,
            }),
            ToolKind::Edit => parse::<EditInput>(input).map(|i| Self::Edit {
                file_path: i.file_path,
                old_string: i.old_string,
                new_string: i.new_string,
                replace_all: i.replace_all,
            }),
            ToolKind::MultiEdit => parse::<MultiEditInput>(input).map(|i| Self::MultiEdit {
                file_path: i.file_path,
                edits: i.edits,
            }),
            ToolKind::Bash => parse::<BashInput>(input).map(|i| Self::Bash {
                command: i.command,
                timeout: i.timeout,
            }),
            ToolKind::Glob => parse::<GlobInput>(input).map(|i| Self::Glob {
                pattern: i.pattern,
                path: i.path,
            }),
            ToolKind::Grep => parse::<GrepInput>(input).map(|i| Self::Grep {
                pattern: i.pattern,
                path: i.path,
                glob: i.glob,
            }),
            ToolKind::Task => parse::<TaskInput>(input).map(|i| Self::Task {
                prompt: i.prompt,
                subagent_type: i.subagent_type,
            }),
            ToolKind::Other => None,
        };

        call.unwrap_or_else(|| Self::Other {
            name: name.to_string(),
            input: input.clone(),
        })
    }

    /// The file this invocation mutates, if it mutates one.
    #[must_use]
    pub fn mutation(&self) -> Option<(&str, FileAction)> {
        match self {
            Self::Write { file_path, .. } => Some((file_path, FileAction::Write)),
            Self::Edit { file_path, .. } | Self::MultiEdit { file_path, .. } => {
                Some((file_path, FileAction::Edit))
            }
            Self::Read { .. }
            | Self::Bash { .. }
            | Self::Glob { .. }
            | Self::Grep { .. }
            | Self::Task { .. }
            | Self::Other { .. } => None,
        }
    }

    /// Human-readable summary of the invocation.
    ///
    /// Prefers an agent-supplied `description` input; otherwise one is built
    /// from the tool and its target, with paths relative to the working
    /// directory.
    #[must_use]
    pub fn describe(&self, ctx: &ExecutionContext, input: &Value) -> String {
        if let Some(description) = input.get("description").and_then(Value::as_str) {
            if !description.trim().is_empty() {
                return description.to_string();
            }
        }

        match self {
            Self::Read { file_path, .. } => format!("Read {}", ctx.relativize(file_path)),
            Self::Write { file_path, .. } => format!("Write {}", ctx.relativize(file_path)),
            Self::Edit { file_path, .. } | Self::MultiEdit { file_path, .. } => {
                format!("Edit {}", ctx.relativize(file_path))
            }
            Self::Bash { command, .. } => format!("Run {command}"),
            Self::Glob { pattern, path } => match path {
                Some(path) => format!("Find {pattern} in {}", ctx.relativize(path)),
                None => format!("Find {pattern}"),
            },
            Self::Grep { pattern, path, .. } => match path {
                Some(path) => format!("Search for {pattern} in {}", ctx.relativize(path)),
                None => format!("Search for {pattern}"),
            },
            Self::Task { subagent_type, .. } => match subagent_type {
                Some(kind) => format!("Run {kind} sub-task"),
                None => "Run sub-task".to_string(),
            },
            Self::Other { name, .. } => format!("Use {name}"),
        }
    }
}
