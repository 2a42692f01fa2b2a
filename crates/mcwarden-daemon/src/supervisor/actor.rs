//! The supervisor actor.
//!
//! All lifecycle decisions (crash restart, stop command, kill timeout) are
//! made by one task, so a natural exit racing the kill timer is resolved in
//! one place and the child is killed at most once.
//!
//! The actor never awaits the child's stdin while it could be watching for
//! shutdown: console commands are queued with `try_send`, and the stop command
//! is sent inside the kill deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mcwarden_core::LineDispatcher;

use super::policy::{CrashTracker, RestartPolicy};
use super::process::{ChildProcess, Output};
use super::profile::LaunchProfile;
use super::types::{ShutdownReport, StopOutcome, SupervisorError, SupervisorState};
use crate::bus::EventBus;

const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);
/// How long output readers may stay open after the child exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Control {
    Input(String),
    Shutdown,
}

enum RunEnd {
    Exited(Option<std::process::ExitStatus>),
    ShutdownRequested,
}

/// Supervisor configuration and collaborators, consumed by [`Supervisor::start`].
pub struct Supervisor {
    profile: LaunchProfile,
    policy: RestartPolicy,
    kill_timeout: Duration,
    bus: EventBus,
    dispatcher: Arc<LineDispatcher>,
}

impl Supervisor {
    pub fn new(profile: LaunchProfile, bus: EventBus, dispatcher: LineDispatcher) -> Self {
        Self {
            profile,
            policy: RestartPolicy::default(),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            bus,
            dispatcher: Arc::new(dispatcher),
        }
    }

    #[must_use]
    pub const fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Spawn the server and start supervising it.
    ///
    /// Fails if the first spawn fails; that is the only startup error.
    pub fn start(self) -> Result<SupervisorHandle, SupervisorError> {
        let (state_tx, state_rx) = watch::channel(SupervisorState::Starting);
        let (output_tx, mut output_rx) = mpsc::channel::<Output>(1024);

        let child = ChildProcess::spawn(&self.profile, &output_tx)?;

        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            while let Some(output) = output_rx.recv().await {
                match output {
                    Output::Line(line) => {
                        let _ = dispatcher.dispatch(&line);
                    }
                    Output::Flush(done) => {
                        if done.send(()).is_err() {
                            debug!("Output flush no longer awaited");
                        }
                    }
                }
            }
            debug!("Line dispatcher finished");
        });

        let (control_tx, control_rx) = mpsc::channel(32);
        let actor = Actor {
            profile: self.profile,
            kill_timeout: self.kill_timeout,
            bus: self.bus,
            crashes: CrashTracker::new(self.policy),
            output_tx,
            state_tx,
            control_rx,
            restarts: 0,
        };
        let task = tokio::spawn(actor.run(child));

        Ok(SupervisorHandle {
            control_tx,
            state_rx,
            task,
        })
    }
}

/// Handle to a running supervisor.
#[derive(Debug)]
pub struct SupervisorHandle {
    control_tx: mpsc::Sender<Control>,
    state_rx: watch::Receiver<SupervisorState>,
    task: JoinHandle<Result<ShutdownReport, SupervisorError>>,
}

impl SupervisorHandle {
    /// Forward one command line to the server's stdin.
    pub async fn send_command(&self, line: impl Into<String>) -> Result<(), SupervisorError> {
        if !self.state().accepts_input() {
            return Err(SupervisorError::NotRunning);
        }
        self.control_tx
            .send(Control::Input(line.into()))
            .await
            .map_err(|_| SupervisorError::NotRunning)
    }

    /// Request shutdown. Returns immediately; use [`wait`](Self::wait) for
    /// completion. Repeated requests are ignored.
    pub async fn shutdown(&self) {
        if self.control_tx.send(Control::Shutdown).await.is_err() {
            debug!("Supervisor already finished");
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_rx.clone()
    }

    /// Wait for the supervisor to finish.
    pub async fn wait(self) -> Result<ShutdownReport, SupervisorError> {
        self.task
            .await
            .map_err(|e| SupervisorError::Task(e.to_string()))?
    }

    /// Request shutdown and wait for it to complete.
    pub async fn shutdown_and_wait(self) -> Result<ShutdownReport, SupervisorError> {
        self.shutdown().await;
        self.wait().await
    }
}

struct Actor {
    profile: LaunchProfile,
    kill_timeout: Duration,
    bus: EventBus,
    crashes: CrashTracker,
    output_tx: mpsc::Sender<Output>,
    state_tx: watch::Sender<SupervisorState>,
    control_rx: mpsc::Receiver<Control>,
    restarts: u32,
}

impl Actor {
    fn set_state(&self, state: SupervisorState) {
        debug!(%state, "Supervisor state");
        self.state_tx.send_replace(state);
    }

    async fn run(mut self, mut child: ChildProcess) -> Result<ShutdownReport, SupervisorError> {
        loop {
            self.set_state(SupervisorState::Running);

            match self.supervise(&mut child).await {
                RunEnd::ShutdownRequested => return Ok(self.stop(child).await),
                RunEnd::Exited(status) => {
                    let uptime = child.uptime();
                    warn!(
                        pid = child.pid(),
                        ?status,
                        uptime_ms = uptime.as_millis(),
                        "Server exited unexpectedly, restarting"
                    );
                    // the dead run's last lines must not land after the restart
                    self.drain_output(&mut child).await;
                    drop(child);

                    self.set_state(SupervisorState::Starting);
                    self.bus.restart_session();
                    self.restarts += 1;

                    let delay = self.crashes.record_exit(uptime);
                    if !delay.is_zero() && !self.backoff(delay).await {
                        return Ok(self.finish(StopOutcome::NotRunning));
                    }

                    child = match ChildProcess::spawn(&self.profile, &self.output_tx) {
                        Ok(child) => child,
                        Err(e) => {
                            error!(error = %e, "Restart failed");
                            self.bus.close();
                            self.set_state(SupervisorState::Stopped);
                            return Err(e);
                        }
                    };
                    info!(restarts = self.restarts, "Server restarted");
                }
            }
        }
    }

    /// Run until the child exits or shutdown is requested.
    async fn supervise(&mut self, child: &mut ChildProcess) -> RunEnd {
        loop {
            tokio::select! {
                status = child.wait() => {
                    return RunEnd::Exited(status.ok());
                }
                control = self.control_rx.recv() => match control {
                    Some(Control::Input(line)) => {
                        if let Err(e) = child.try_send(line) {
                            warn!(error = %e, "Dropping console command");
                        }
                    }
                    Some(Control::Shutdown) | None => return RunEnd::ShutdownRequested,
                },
            }
        }
    }

    /// Wait until every line the exited child wrote has been dispatched.
    async fn drain_output(&self, child: &mut ChildProcess) {
        child.finish_output(OUTPUT_DRAIN_TIMEOUT).await;
        let (done_tx, done_rx) = oneshot::channel();
        if self.output_tx.send(Output::Flush(done_tx)).await.is_err() || done_rx.await.is_err() {
            warn!("Line dispatcher stopped before output was drained");
        }
    }

    /// Wait out a restart delay. Returns `false` if shutdown was requested.
    async fn backoff(&mut self, delay: Duration) -> bool {
        warn!(delay_ms = delay.as_millis(), "Server is crash looping, delaying restart");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                control = self.control_rx.recv() => match control {
                    Some(Control::Input(_)) => warn!("Server not running, dropping console command"),
                    Some(Control::Shutdown) | None => {
                        self.bus.close();
                        return false;
                    }
                },
            }
        }
    }

    /// Graceful stop with forced termination after the kill timeout.
    async fn stop(&mut self, mut child: ChildProcess) -> ShutdownReport {
        // From here on an exit is expected and never triggers a restart.
        self.set_state(SupervisorState::Stopping);
        self.bus.close();

        info!(
            pid = child.pid(),
            command = %self.profile.stop_command,
            timeout_ms = self.kill_timeout.as_millis(),
            "Stopping server"
        );
        let stop_command = self.profile.stop_command.clone();
        let graceful = async {
            // a child that stopped reading stdin can block this send
            if let Err(e) = child.send(stop_command).await {
                warn!(error = %e, "Failed to send stop command");
            }
            child.wait().await
        };
        let waited = tokio::time::timeout(self.kill_timeout, graceful).await;

        let outcome = match waited {
            Ok(Ok(status)) => {
                info!(?status, "Server stopped gracefully");
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for server, killing");
                Self::force_kill(&mut child).await;
                StopOutcome::Forced
            }
            Err(_) => {
                warn!("Timeout waiting for graceful shutdown, killing");
                Self::force_kill(&mut child).await;
                StopOutcome::Forced
            }
        };
        self.finish(outcome)
    }

    async fn force_kill(child: &mut ChildProcess) {
        if let Err(e) = child.kill().await {
            warn!(pid = child.pid(), error = %e, "Failed to kill server");
        }
    }

    fn finish(&self, outcome: StopOutcome) -> ShutdownReport {
        self.set_state(SupervisorState::Stopped);
        info!(?outcome, restarts = self.restarts, "Supervisor stopped");
        ShutdownReport {
            outcome,
            restarts: self.restarts,
        }
    }
}
