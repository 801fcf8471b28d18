//! Core traits for execution.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::ExecutionContext;

/// Session identifier.
pub type SessionId = Uuid;

/// Spawned process handle.
///
/// Stdout and stderr are expected to be piped; the session takes them out of
/// the child to read the agent's output.
pub struct SpawnedProcess {
    /// Child process group handle.
    pub child: command_group::AsyncGroupChild,
}

impl SpawnedProcess {
    /// Wrap a spawned child.
    #[must_use]
    pub const fn new(child: command_group::AsyncGroupChild) -> Self {
        Self { child }
    }

    /// OS process id, if the child has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Executor error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Working directory not found: {0}")]
    WorkingDirNotFound(String),
    #[error("Command build error: {0}")]
    CommandBuild(String),
}

/// Trait for agent executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Spawn a new agent subprocess for `prompt` in the context's working
    /// directory, with stdout and stderr piped.
    async fn spawn(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
    ) -> Result<SpawnedProcess, ExecutorError>;
}
