//! Server process supervision.
//!
//! A single actor task owns the child process and its state machine:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               ^           |
//!               +-- crash --+
//! ```
//!
//! Output from both stdout and stderr is split into lines per stream and fed
//! through one shared dispatcher task, so handlers never run concurrently.
//! After a crash the actor waits for that task to dispatch the dead run's
//! remaining output before it resets the session.

mod actor;
mod policy;
mod process;
mod profile;
mod types;

pub use actor::{Supervisor, SupervisorHandle};
pub use policy::RestartPolicy;
pub use profile::LaunchProfile;
pub use types::{ShutdownReport, StopOutcome, SupervisorError, SupervisorState};
