//! Supervisor types.

use std::fmt;

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SupervisorState {
    /// Whether stdin commands can be delivered in this state.
    pub const fn accepts_input(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// How the final stop completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited after the stop command, before the kill timeout.
    Graceful,
    /// The kill timeout fired and the process was killed.
    Forced,
    /// Shutdown arrived while no process was alive (restart backoff).
    NotRunning,
}

/// Summary returned when the supervisor finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcome: StopOutcome,
    /// Crash restarts performed during the supervisor's lifetime.
    pub restarts: u32,
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Server process is not running")]
    NotRunning,

    #[error("Server stdin is closed")]
    StdinClosed,

    #[error("Server stdin queue is full")]
    StdinFull,

    #[error("Supervisor task failed: {0}")]
    Task(String),
}
