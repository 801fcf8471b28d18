//! Core abstractions for agent-relay.
//!
//! This crate provides the fundamental building blocks:
//! - `RelayEvent` - Timestamped, tagged event record pushed to observers
//! - `ToolCall` - Closed set of tool invocation shapes
//! - `EventHub` - Broadcast fan-out to every connected observer
//! - `ExecutionContext` - Working directory for a session's subprocess
//! - `Executor` trait and the `SessionId` type

pub mod context;
pub mod event;
pub mod hub;
pub mod tool;
pub mod traits;

pub use context::ExecutionContext;
pub use event::{EventKind, FileAction, RelayEvent};
pub use hub::EventHub;
pub use tool::ToolCall;
pub use traits::{Executor, ExecutorError, SessionId, SpawnedProcess};
