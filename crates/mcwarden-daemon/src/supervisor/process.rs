//! Spawning the child and wiring its pipes.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mcwarden_core::LineSplitter;
use mcwarden_core::tracing_init::CONSOLE_TARGET;

use super::profile::LaunchProfile;
use super::types::SupervisorError;

const READ_CHUNK: usize = 8 * 1024;
const STDIN_QUEUE: usize = 32;

/// Messages on the output channel shared by every run of the child.
#[derive(Debug)]
pub(crate) enum Output {
    Line(String),
    /// Acknowledged once every line queued before it has been dispatched.
    Flush(oneshot::Sender<()>),
}

/// A running child with its stdin writer and output readers.
#[derive(Debug)]
pub(crate) struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<String>,
    pumps: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl ChildProcess {
    /// Spawn the child described by `profile`. Complete output lines from
    /// both stdout and stderr are sent to `output_tx`.
    pub(crate) fn spawn(
        profile: &LaunchProfile,
        output_tx: &mpsc::Sender<Output>,
    ) -> Result<Self, SupervisorError> {
        let spawn_failed = |reason: String| SupervisorError::SpawnFailed {
            program: profile.program.display().to_string(),
            reason,
        };

        let mut cmd = Command::new(&profile.program);
        cmd.args(&profile.args)
            .current_dir(&profile.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            program = %profile.program.display(),
            working_dir = %profile.working_directory.display(),
            args = profile.args.len(),
            "Spawning server process"
        );
        let mut child = cmd.spawn().map_err(|e| spawn_failed(e.to_string()))?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failed("Failed to capture stderr".to_string()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(STDIN_QUEUE);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!("Failed to write to server stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    error!("Failed to write newline: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!("Failed to flush server stdin: {}", e);
                    break;
                }
            }
        });

        let pumps = vec![
            tokio::spawn(pump_lines(stdout, "stdout", output_tx.clone())),
            tokio::spawn(pump_lines(stderr, "stderr", output_tx.clone())),
        ];

        info!(pid, "Server process started");
        Ok(Self {
            child,
            pid,
            stdin_tx,
            pumps,
            started_at: Instant::now(),
        })
    }

    pub(crate) const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Queue one command line for the child's stdin, waiting for room.
    pub(crate) async fn send(&self, line: String) -> Result<(), SupervisorError> {
        self.stdin_tx
            .send(line)
            .await
            .map_err(|_| SupervisorError::StdinClosed)
    }

    /// Queue one command line without waiting. Fails with
    /// [`SupervisorError::StdinFull`] when the child has stopped reading.
    pub(crate) fn try_send(&self, line: String) -> Result<(), SupervisorError> {
        self.stdin_tx.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => SupervisorError::StdinFull,
            TrySendError::Closed(_) => SupervisorError::StdinClosed,
        })
    }

    /// Wait for both output readers to reach end of stream, so every line the
    /// child wrote is queued for dispatch. Readers still open after `limit`
    /// (a grandchild holding the pipe) are abandoned.
    pub(crate) async fn finish_output(&mut self, limit: Duration) {
        let deadline = tokio::time::Instant::now() + limit;
        for pump in std::mem::take(&mut self.pumps) {
            let abort = pump.abort_handle();
            match tokio::time::timeout_at(deadline, pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(pid = self.pid, error = %e, "Output reader failed"),
                Err(_) => {
                    warn!(pid = self.pid, "Output still open after exit, abandoning reader");
                    abort.abort();
                }
            }
        }
    }

    /// Wait for the child to exit. Cancel safe.
    pub(crate) async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the child and reap it.
    pub(crate) async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

/// Read raw chunks from one output stream, reassemble lines and forward them.
async fn pump_lines<R>(mut reader: R, stream: &'static str, output_tx: mpsc::Sender<Output>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(stream, error = %e, "Output read failed");
                break;
            }
        };
        for line in splitter.feed(&buf[..n]) {
            if output_tx.send(Output::Line(line)).await.is_err() {
                debug!(stream, "Line channel closed");
                return;
            }
        }
    }
    if let Some(rest) = splitter.take_pending() {
        // never dispatched: it was not newline-terminated
        info!(target: CONSOLE_TARGET, stream, "{rest}");
    }
    debug!(stream, "Output reader finished");
}
