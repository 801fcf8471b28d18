//! Session registry for agent subprocesses.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use agent_relay_core::{
    EventHub, EventKind, ExecutionContext, RelayEvent,
    traits::{Executor, ExecutorError, SessionId},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::driver::SessionDriver;

/// Session registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Executor error: {0}")]
    Spawn(#[from] ExecutorError),
}

/// Read-only view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub working_directory: PathBuf,
}

/// Lifecycle of a registered session. A session that has ended is no
/// longer registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    /// Termination was requested; waiting for the subprocess to exit.
    Terminating,
}

/// Registry entry. The subprocess itself is owned by the session's driver
/// task; the registry only holds the channel used to ask it to stop.
pub(crate) struct ActiveSession {
    summary: SessionSummary,
    state: SessionState,
    terminate_tx: Option<oneshot::Sender<()>>,
}

pub(crate) type SessionMap = Arc<RwLock<HashMap<SessionId, ActiveSession>>>;

/// Owns the set of running agent sessions.
///
/// Each session is driven by its own task, which pumps the subprocess output
/// through a frame decoder and translator into the [`EventHub`], and which
/// removes the session from the registry when the subprocess exits.
pub struct SessionRegistry<E>
where
    E: Executor,
{
    executor: E,
    hub: Arc<EventHub>,
    default_working_dir: PathBuf,
    sessions: SessionMap,
}

impl<E> SessionRegistry<E>
where
    E: Executor,
{
    /// Create a registry publishing to `hub`. Sessions created without a
    /// working directory run in `default_working_dir`.
    #[must_use]
    pub fn new(executor: E, hub: Arc<EventHub>, default_working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            hub,
            default_working_dir: default_working_dir.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The hub every session publishes to.
    #[must_use]
    pub const fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    #[must_use]
    pub fn default_working_dir(&self) -> &Path {
        &self.default_working_dir
    }

    /// Spawn a new agent session.
    ///
    /// A relative `working_dir` is resolved against the default working
    /// directory. `session_start` is published before any other event of the
    /// session can be.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty prompt and `Spawn` if the
    /// subprocess cannot be started; nothing is registered in either case.
    pub async fn create_session(
        &self,
        prompt: &str,
        working_dir: Option<PathBuf>,
    ) -> Result<SessionId, RegistryError> {
        if prompt.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }

        let working_dir = working_dir.map_or_else(
            || self.default_working_dir.clone(),
            |dir| self.default_working_dir.join(dir),
        );
        let ctx = ExecutionContext::new(working_dir.clone());
        let process = self.executor.spawn(&ctx, prompt).await?;
        let pid = process.pid();

        let id = Uuid::new_v4();
        let summary = SessionSummary {
            id,
            prompt: prompt.to_string(),
            started_at: Utc::now(),
            working_directory: working_dir.clone(),
        };
        let (terminate_tx, terminate_rx) = oneshot::channel();

        self.sessions.write().await.insert(
            id,
            ActiveSession {
                summary,
                state: SessionState::Running,
                terminate_tx: Some(terminate_tx),
            },
        );

        self.hub.publish(RelayEvent::for_session(
            id,
            EventKind::SessionStart {
                prompt: prompt.to_string(),
                working_directory: working_dir,
            },
        ));

        let driver = SessionDriver::new(
            id,
            ctx,
            process,
            terminate_rx,
            Arc::clone(&self.hub),
            Arc::clone(&self.sessions),
        );
        tokio::spawn(driver.run());

        info!(session_id = %id, ?pid, "Session started");
        Ok(id)
    }

    /// Snapshot of the registered sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.summary.clone())
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Current lifecycle state, or `None` once the session has ended.
    pub async fn session_state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.read().await.get(&id).map(|s| s.state)
    }

    /// Number of registered sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ask a session's subprocess to stop. Does not wait for it to exit;
    /// `session_end` follows once it has.
    ///
    /// Repeated calls while the session is still terminating succeed
    /// without effect.
    ///
    /// # Errors
    /// Returns `NotFound` if no session with this id is registered.
    pub async fn terminate_session(&self, id: SessionId) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(RegistryError::NotFound(id))?;

        match session.state {
            SessionState::Running => {
                session.state = SessionState::Terminating;
                if let Some(tx) = session.terminate_tx.take() {
                    // The driver may already be past its last read; exit is
                    // reported either way.
                    let _ = tx.send(());
                }
                info!(session_id = %id, "Termination requested");
            }
            SessionState::Terminating => {
                debug!(session_id = %id, "Session already terminating");
            }
        }
        Ok(())
    }

    /// Request termination of every running session.
    pub async fn terminate_all(&self) {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        for id in ids {
            // Sessions that ended in between are simply gone.
            let _ = self.terminate_session(id).await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use agent_relay_core::{FileAction, SpawnedProcess, ToolCall};
    use agent_relay_executor::spawn_resolved;
    use async_trait::async_trait;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    use super::*;

    /// Runs a shell script in place of the agent.
    struct ScriptExecutor {
        script: String,
    }

    impl ScriptExecutor {
        fn new(script: impl Into<String>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    #[async_trait]
    impl Executor for ScriptExecutor {
        async fn spawn(
            &self,
            ctx: &ExecutionContext,
            _prompt: &str,
        ) -> Result<SpawnedProcess, ExecutorError> {
            spawn_resolved("sh", &["-c".to_string(), self.script.clone()], &ctx.working_dir).await
        }
    }

    fn registry(script: impl Into<String>, dir: &Path) -> SessionRegistry<ScriptExecutor> {
        SessionRegistry::new(
            ScriptExecutor::new(script),
            Arc::new(EventHub::new()),
            dir,
        )
    }

    /// Print each line on stdout, single-quoted for `sh`.
    fn print_lines(lines: &[&str]) -> String {
        let quoted: Vec<String> = lines.iter().map(|l| format!("'{l}'")).collect();
        format!("printf '%s\\n' {}", quoted.join(" "))
    }

    async fn collect_session(
        rx: &mut broadcast::Receiver<RelayEvent>,
        id: SessionId,
    ) -> Vec<EventKind> {
        let mut events = Vec::new();
        timeout(Duration::from_secs(10), async {
            loop {
                let event = rx.recv().await.expect("hub closed");
                if event.session_id != Some(id) {
                    continue;
                }
                let done = matches!(event.kind, EventKind::SessionEnd { .. });
                events.push(event.kind);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("session did not end in time");
        events
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("true", dir.path());
        let mut rx = registry.hub().subscribe();

        let err = registry.create_session("   ", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert!(registry.list_sessions().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_scenario_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let tool_use = format!(
            r#"{{"type":"assistant","message":{{"content":[{{"type":"tool_use","id":"x1","name":"Write","input":{{"file_path":"{}","content":"hi"}}}}]}}}}"#,
            file.display()
        );
        let tool_result = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"x1","content":"ok"}]}}"#;
        let registry = registry(print_lines(&[&tool_use, tool_result]), dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("hello", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;

        assert!(matches!(
            &events[0],
            EventKind::SessionStart { prompt, working_directory }
                if prompt == "hello" && working_directory == dir.path()
        ));
        assert!(matches!(events.last(), Some(EventKind::SessionEnd { exit_code: Some(0) })));

        let call = events
            .iter()
            .find_map(|e| match e {
                EventKind::FeToolCall { call, .. } => Some(call.clone()),
                _ => None,
            })
            .expect("tool call translated");
        assert_eq!(
            call,
            ToolCall::Write {
                file_path: file.display().to_string(),
                content: "hi".into(),
            }
        );

        let result_at = events
            .iter()
            .position(|e| matches!(e, EventKind::FeToolResult { .. }))
            .expect("tool result translated");
        assert_eq!(
            events[result_at + 1],
            EventKind::FeFileChanged {
                file_path: "a.txt".into(),
                action: FileAction::Write,
            }
        );
        let changes = events
            .iter()
            .filter(|e| matches!(e, EventKind::FeFileChanged { .. }))
            .count();
        assert_eq!(changes, 1);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_block_later_frames() {
        let dir = tempfile::tempdir().unwrap();
        let script = print_lines(&[
            "this is not json",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"still here"}]}}"#,
        ]);
        let registry = registry(script, dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("go", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;

        let raw: Vec<&EventKind> = events
            .iter()
            .filter(|e| matches!(e, EventKind::RawOutput { .. }))
            .collect();
        assert_eq!(
            raw,
            vec![&EventKind::RawOutput {
                text: "this is not json".into()
            }]
        );
        assert!(events.contains(&EventKind::FeAssistantText {
            text: "still here".into()
        }));
    }

    #[tokio::test]
    async fn test_stderr_and_exit_code_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("echo 'boom' >&2; exit 3", dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("fail", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;

        assert!(events.contains(&EventKind::Stderr {
            text: "boom".into()
        }));
        assert_eq!(events.last(), Some(&EventKind::SessionEnd { exit_code: Some(3) }));
        assert!(registry.list_sessions().await.is_empty());
        assert_eq!(registry.session_state(id).await, None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stderr_does_not_stop_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(r"printf 'bad \377\n' >&2; printf 'after\n' >&2", dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("go", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;

        let stderr: Vec<&EventKind> = events
            .iter()
            .filter(|e| matches!(e, EventKind::Stderr { .. }))
            .collect();
        assert_eq!(
            stderr,
            vec![
                &EventKind::Stderr {
                    text: "bad \u{fffd}".into()
                },
                &EventKind::Stderr {
                    text: "after".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_whitespace_line_is_raw_output() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(r"printf '   \n\n'", dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("go", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;
        assert_eq!(
            events[1..events.len() - 1],
            [EventKind::RawOutput { text: "   ".into() }]
        );
    }

    #[tokio::test]
    async fn test_session_ends_when_agent_exits_despite_inherited_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("sleep 5 & echo done", dir.path());
        let mut rx = registry.hub().subscribe();

        let started = std::time::Instant::now();
        let id = registry.create_session("go", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(events.contains(&EventKind::RawOutput {
            text: "done".into()
        }));
        assert_eq!(events.last(), Some(&EventKind::SessionEnd { exit_code: Some(0) }));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_terminate_all_stops_every_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("sleep 30", dir.path());
        let mut rx = registry.hub().subscribe();

        let a = registry.create_session("first", None).await.unwrap();
        let b = registry.create_session("second", None).await.unwrap();
        registry.terminate_all().await;

        let mut ended = Vec::new();
        timeout(Duration::from_secs(10), async {
            while ended.len() < 2 {
                let event = rx.recv().await.expect("hub closed");
                if matches!(event.kind, EventKind::SessionEnd { .. }) {
                    ended.extend(event.session_id);
                }
            }
        })
        .await
        .expect("sessions did not end in time");
        assert!(ended.contains(&a) && ended.contains(&b));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_translated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(
            r#"printf '%s' '{"type":"result","subtype":"success","is_error":false,"result":"done"}'"#,
            dir.path(),
        );
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("go", None).await.unwrap();
        let events = collect_session(&mut rx, id).await;
        assert!(events.iter().any(|e| matches!(
            e,
            EventKind::FeResult { success: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_terminate_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("true", dir.path());
        let err = registry.terminate_session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_terminate_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("sleep 30", dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry.create_session("wait", None).await.unwrap();
        assert_eq!(registry.session_state(id).await, Some(SessionState::Running));

        let listed = registry.list_sessions().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].prompt, "wait");

        timeout(Duration::from_secs(1), registry.terminate_session(id))
            .await
            .expect("terminate must not block")
            .unwrap();
        assert_eq!(
            registry.session_state(id).await,
            Some(SessionState::Terminating)
        );
        // Second request while still terminating is a no-op.
        tokio_test::assert_ok!(registry.terminate_session(id).await);

        let events = collect_session(&mut rx, id).await;
        assert!(matches!(events[0], EventKind::SessionStart { .. }));
        // Killed by SIGTERM: no exit code.
        assert_eq!(events.last(), Some(&EventKind::SessionEnd { exit_code: None }));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("true", dir.path());
        let mut rx = registry.hub().subscribe();

        let err = registry
            .create_session("hello", Some(PathBuf::from("missing-subdir")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Spawn(ExecutorError::WorkingDirNotFound(_))
        ));
        assert_eq!(registry.active_count().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relative_working_dir_resolves_against_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let registry = registry("true", dir.path());
        let mut rx = registry.hub().subscribe();

        let id = registry
            .create_session("hello", Some(PathBuf::from("sub")))
            .await
            .unwrap();
        let events = collect_session(&mut rx, id).await;
        assert!(matches!(
            &events[0],
            EventKind::SessionStart { working_directory, .. }
                if working_directory == &dir.path().join("sub")
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(
            print_lines(&[r#"{"type":"system","subtype":"init","model":"m","tools":[],"cwd":"/"}"#]),
            dir.path(),
        );
        let mut rx_a = registry.hub().subscribe();
        let mut rx_b = registry.hub().subscribe();

        let a = registry.create_session("first", None).await.unwrap();
        let b = registry.create_session("second", None).await.unwrap();
        assert_ne!(a, b);

        for (rx, id) in [(&mut rx_a, a), (&mut rx_b, b)] {
            let events = collect_session(rx, id).await;
            assert!(matches!(events[0], EventKind::SessionStart { .. }));
            assert_eq!(
                events
                    .iter()
                    .filter(|e| matches!(e, EventKind::FeInit { .. }))
                    .count(),
                1
            );
        }
    }
}
