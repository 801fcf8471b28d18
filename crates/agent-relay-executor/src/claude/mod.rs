//! Claude Code CLI executor.

pub mod executor;

pub use executor::{ClaudeExecutor, ClaudeExecutorConfig, STREAM_JSON_ARGS};
