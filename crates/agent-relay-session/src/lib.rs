//! Session orchestration for agent relay.
//!
//! Provides:
//! - `SessionRegistry` - Spawn, list and terminate agent sessions
//! - A driver task per session that feeds its output into the event hub

mod driver;
pub mod registry;

pub use registry::{RegistryError, SessionRegistry, SessionState, SessionSummary};
