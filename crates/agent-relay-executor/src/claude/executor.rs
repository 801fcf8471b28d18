//! Spawning the Claude Code CLI in stream-json mode.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use agent_relay_core::{ExecutionContext, Executor, ExecutorError, SpawnedProcess};
use async_trait::async_trait;
use command_group::AsyncCommandGroup;

use crate::command::{CommandBuildError, CommandBuilder};

/// Arguments every session is started with, ahead of any extra arguments
/// and the prompt.
pub const STREAM_JSON_ARGS: [&str; 4] = ["--print", "--output-format", "stream-json", "--verbose"];

const SKIP_PERMISSIONS_ARG: &str = "--dangerously-skip-permissions";

/// Claude executor configuration.
#[derive(Debug, Clone)]
pub struct ClaudeExecutorConfig {
    /// Base command, shell-split before use.
    pub command: String,
    /// Extra arguments appended after the fixed set.
    pub extra_args: Vec<String>,
    /// Pass `--dangerously-skip-permissions`. Without it the agent cannot
    /// mutate files in non-interactive mode.
    pub skip_permissions: bool,
}

impl Default for ClaudeExecutorConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
            skip_permissions: true,
        }
    }
}

/// Executor that runs the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    builder: CommandBuilder,
}

impl ClaudeExecutor {
    #[must_use]
    pub fn new(config: ClaudeExecutorConfig) -> Self {
        let mut params: Vec<String> = STREAM_JSON_ARGS.iter().map(ToString::to_string).collect();
        if config.skip_permissions {
            params.push(SKIP_PERMISSIONS_ARG.to_string());
        }
        params.extend(config.extra_args);

        Self {
            builder: CommandBuilder::new(config.command).params(params),
        }
    }

    /// The builder used for every spawn.
    #[must_use]
    pub const fn command_builder(&self) -> &CommandBuilder {
        &self.builder
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new(ClaudeExecutorConfig::default())
    }
}

#[async_trait]
impl Executor for ClaudeExecutor {
    async fn spawn(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
    ) -> Result<SpawnedProcess, ExecutorError> {
        let parts = self
            .builder
            .build(prompt)
            .map_err(|e| ExecutorError::CommandBuild(e.to_string()))?;
        let (program, args) = parts.into_resolved().await.map_err(|e| match e {
            CommandBuildError::ExecutableNotFound(program) => ExecutorError::ExecutableNotFound(program),
            other => ExecutorError::CommandBuild(other.to_string()),
        })?;

        spawn_piped(&program, &args, &ctx.working_dir)
    }
}

/// Spawn `program` in its own process group with stdout and stderr piped and
/// stdin closed.
///
/// # Errors
/// Returns error if the working directory does not exist or the OS refuses
/// the spawn.
pub fn spawn_piped(
    program: &Path,
    args: &[String],
    working_dir: &Path,
) -> Result<SpawnedProcess, ExecutorError> {
    if !working_dir.is_dir() {
        return Err(ExecutorError::WorkingDirNotFound(
            working_dir.display().to_string(),
        ));
    }

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command
        .group_spawn()
        .map_err(|e| ExecutorError::SpawnFailed(format!("{}: {e}", program.display())))?;

    tracing::debug!(
        program = %program.display(),
        working_dir = %working_dir.display(),
        pid = ?child.id(),
        "Spawned agent process"
    );

    Ok(SpawnedProcess::new(child))
}

/// Resolve `program` on PATH and spawn it with [`spawn_piped`].
///
/// # Errors
/// Returns error if the program cannot be found or spawned.
pub async fn spawn_resolved(
    program: &str,
    args: &[String],
    working_dir: &Path,
) -> Result<SpawnedProcess, ExecutorError> {
    let resolved: PathBuf = crate::resolve::resolve_executable_path(program)
        .await
        .ok_or_else(|| ExecutorError::ExecutableNotFound(program.to_string()))?;
    spawn_piped(&resolved, args, working_dir)
}
