//! Command-line configuration.

use std::{net::SocketAddr, path::PathBuf};

use agent_relay_core::hub::DEFAULT_EVENT_BUFFER;
use agent_relay_executor::ClaudeExecutorConfig;
use clap::Parser;

/// Relay Claude Code sessions to web clients over HTTP, WebSocket and SSE.
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-relay", version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "AGENT_RELAY_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Default working directory for new sessions (defaults to the current directory)
    #[arg(long, env = "AGENT_RELAY_WORKDIR")]
    pub working_dir: Option<PathBuf>,

    /// Agent command, shell-split (e.g. "npx @anthropic-ai/claude-code")
    #[arg(long, env = "AGENT_RELAY_COMMAND", default_value = "claude")]
    pub agent_command: String,

    /// Extra argument passed to the agent before the prompt (repeatable)
    #[arg(long = "agent-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub agent_args: Vec<String>,

    /// Do not pass --dangerously-skip-permissions to the agent
    #[arg(long)]
    pub no_skip_permissions: bool,

    /// Directory of static files to serve at /
    #[arg(long, env = "AGENT_RELAY_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Per-observer event buffer; slower observers lose events
    #[arg(long, env = "AGENT_RELAY_EVENT_BUFFER", default_value_t = DEFAULT_EVENT_BUFFER)]
    pub event_buffer: usize,
}

impl Config {
    #[must_use]
    pub fn executor_config(&self) -> ClaudeExecutorConfig {
        ClaudeExecutorConfig {
            command: self.agent_command.clone(),
            extra_args: self.agent_args.clone(),
            skip_permissions: !self.no_skip_permissions,
        }
    }

    /// Working directory for sessions that do not name one, made absolute so
    /// reported file paths can be relativized against it.
    #[must_use]
    pub fn resolved_working_dir(&self) -> PathBuf {
        let dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        std::fs::canonicalize(&dir).unwrap_or(dir)
    }
}
