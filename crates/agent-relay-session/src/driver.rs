//! Per-session task pumping subprocess output into the event hub.

use std::{io, sync::Arc, time::Duration};

use agent_relay_core::{
    EventHub, EventKind, ExecutionContext, RelayEvent, SessionId, SpawnedProcess,
};
use agent_relay_executor::{CorrelationTracker, FrameDecoder, Translator};
use command_group::AsyncGroupChild;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{ChildStderr, ChildStdout},
    sync::oneshot,
    time::timeout,
};
use tracing::{debug, error, info, warn};

use crate::registry::SessionMap;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long output already written by an exited agent is still collected.
/// Descendants that keep the pipes open do not hold the session beyond it.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Owns one session's subprocess until it exits.
///
/// Stdout is decoded into frames and translated in arrival order; stderr is
/// forwarded line by line. Once the process has been reaped and its pending
/// output collected, the session is removed from the registry and
/// `session_end` is published as its last event.
pub(crate) struct SessionDriver {
    id: SessionId,
    process: SpawnedProcess,
    translator: Translator,
    terminate_rx: oneshot::Receiver<()>,
    hub: Arc<EventHub>,
    sessions: SessionMap,
}

impl SessionDriver {
    pub(crate) fn new(
        id: SessionId,
        ctx: ExecutionContext,
        process: SpawnedProcess,
        terminate_rx: oneshot::Receiver<()>,
        hub: Arc<EventHub>,
        sessions: SessionMap,
    ) -> Self {
        Self {
            id,
            process,
            translator: Translator::new(id, ctx),
            terminate_rx,
            hub,
            sessions,
        }
    }

    pub(crate) async fn run(self) {
        let Self {
            id,
            mut process,
            translator,
            mut terminate_rx,
            hub,
            sessions,
        } = self;

        let stdout = process.child.inner().stdout.take();
        let stderr = process.child.inner().stderr.take();
        let mut output = OutputPump::new(translator, Arc::clone(&hub), stdout, stderr);
        let mut terminate_armed = true;
        let mut exited = None;

        while exited.is_none() && output.is_open() {
            tokio::select! {
                () = output.pump() => {}
                status = process.child.inner().wait() => exited = Some(status),
                requested = &mut terminate_rx, if terminate_armed => {
                    terminate_armed = false;
                    if requested.is_ok() {
                        signal_terminate(id, &mut process.child);
                    }
                }
            }
        }

        let status = match exited {
            Some(status) => {
                if timeout(DRAIN_GRACE, output.drain()).await.is_err() {
                    debug!(session_id = %id, "Agent exited with its output pipes still held open");
                }
                status
            }
            // Both pipes closed before the process exited.
            None => loop {
                tokio::select! {
                    status = process.child.inner().wait() => break status,
                    requested = &mut terminate_rx, if terminate_armed => {
                        terminate_armed = false;
                        if requested.is_ok() {
                            signal_terminate(id, &mut process.child);
                        }
                    }
                }
            },
        };
        output.close(id);

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                error!(session_id = %id, "Failed to wait for agent process: {e}");
                None
            }
        };

        sessions.write().await.remove(&id);
        hub.publish(RelayEvent::for_session(id, EventKind::SessionEnd { exit_code }));
        info!(session_id = %id, ?exit_code, "Session ended");
    }
}

/// Reads both output pipes of one agent and publishes what they carry.
struct OutputPump {
    translator: Translator,
    hub: Arc<EventHub>,
    tracker: CorrelationTracker,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stdout_frames: FrameDecoder,
    stderr_lines: FrameDecoder,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
}

impl OutputPump {
    fn new(
        translator: Translator,
        hub: Arc<EventHub>,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Self {
        Self {
            translator,
            hub,
            tracker: CorrelationTracker::new(),
            stdout,
            stderr,
            stdout_frames: FrameDecoder::new(),
            stderr_lines: FrameDecoder::new(),
            stdout_buf: vec![0u8; READ_CHUNK_SIZE],
            stderr_buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    const fn is_open(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    /// Wait for the next delivery on either pipe and publish the frames it
    /// completes. Cancel safe.
    async fn pump(&mut self) {
        tokio::select! {
            read = read_chunk(self.stdout.as_mut(), &mut self.stdout_buf), if self.stdout.is_some() => {
                self.on_stdout(read);
            }
            read = read_chunk(self.stderr.as_mut(), &mut self.stderr_buf), if self.stderr.is_some() => {
                self.on_stderr(read);
            }
            else => {}
        }
    }

    /// Pump until both pipes reach end of stream.
    async fn drain(&mut self) {
        while self.is_open() {
            self.pump().await;
        }
    }

    fn on_stdout(&mut self, read: io::Result<usize>) {
        match read {
            Ok(0) => {
                self.flush_stdout();
                self.stdout = None;
            }
            Ok(n) => {
                for frame in self.stdout_frames.push(&self.stdout_buf[..n]) {
                    self.emit_frame(&frame);
                }
            }
            Err(e) => {
                warn!(session_id = %self.translator.session_id(), "Failed to read agent stdout: {e}");
                self.flush_stdout();
                self.stdout = None;
            }
        }
    }

    fn on_stderr(&mut self, read: io::Result<usize>) {
        match read {
            Ok(0) => {
                self.flush_stderr();
                self.stderr = None;
            }
            Ok(n) => {
                for line in self.stderr_lines.push(&self.stderr_buf[..n]) {
                    self.emit_stderr(line);
                }
            }
            Err(e) => {
                warn!(session_id = %self.translator.session_id(), "Failed to read agent stderr: {e}");
                self.flush_stderr();
                self.stderr = None;
            }
        }
    }

    /// Stop reading, publishing any unterminated trailing line of either pipe.
    fn close(&mut self, id: SessionId) {
        self.flush_stdout();
        self.flush_stderr();
        self.stdout = None;
        self.stderr = None;
        if !self.tracker.is_empty() {
            debug!(session_id = %id, pending = self.tracker.len(), "Session ended with uncorrelated tool calls");
        }
    }

    fn flush_stdout(&mut self) {
        if let Some(frame) = std::mem::take(&mut self.stdout_frames).finish() {
            self.emit_frame(&frame);
        }
    }

    fn flush_stderr(&mut self) {
        if let Some(line) = std::mem::take(&mut self.stderr_lines).finish() {
            self.emit_stderr(line);
        }
    }

    fn emit_frame(&mut self, frame: &str) {
        // Only an empty line carries nothing; anything else is translated,
        // falling back to raw output.
        if frame.is_empty() {
            return;
        }
        for event in self.translator.translate(frame, &mut self.tracker) {
            self.hub.publish(event);
        }
    }

    fn emit_stderr(&self, mut text: String) {
        if text.ends_with('\r') {
            text.pop();
        }
        self.hub.publish(RelayEvent::for_session(
            self.translator.session_id(),
            EventKind::Stderr { text },
        ));
    }
}

async fn read_chunk<R>(pipe: Option<&mut R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Ask the whole process group to stop.
fn signal_terminate(id: SessionId, child: &mut AsyncGroupChild) {
    match request_stop(child) {
        Ok(()) => debug!(session_id = %id, "Sent termination signal"),
        // Usually the process has already exited.
        Err(e) => debug!(session_id = %id, "Termination signal not delivered: {e}"),
    }
}

#[cfg(unix)]
fn request_stop(child: &mut AsyncGroupChild) -> io::Result<()> {
    use command_group::{Signal, UnixChildExt};
    child.signal(Signal::SIGTERM)
}

#[cfg(not(unix))]
fn request_stop(child: &mut AsyncGroupChild) -> io::Result<()> {
    child.start_kill()
}
