//! Agent subprocess execution and stream translation.
//!
//! Provides:
//! - `FrameDecoder` - Newline-delimited framing of subprocess output
//! - `Translator` - Agent stream-json records to relay events
//! - `CorrelationTracker` - Pending file mutations keyed by tool call id
//! - `ClaudeExecutor` - Spawns the Claude Code CLI
//! - Command building utilities

pub mod claude;
pub mod command;
pub mod correlation;
pub mod decoder;
pub mod resolve;
pub mod translate;

pub use claude::{ClaudeExecutor, ClaudeExecutorConfig};
pub use claude::executor::{spawn_piped, spawn_resolved};
pub use command::{CommandBuilder, CommandParts};
pub use correlation::{CorrelationTracker, PendingMutation};
pub use decoder::FrameDecoder;
pub use resolve::resolve_executable_path;
pub use translate::Translator;
