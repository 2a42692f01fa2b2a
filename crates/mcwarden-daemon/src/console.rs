//! Operator console: the daemon's own stdin forwarded to the server.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::supervisor::SupervisorHandle;

/// Read stdin on a dedicated thread so a pending read never holds up runtime
/// shutdown. The channel closes at EOF.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                return;
            }
        }
        debug!("Console input closed");
    });
    rx
}

/// Forward non-empty operator lines to the server until input closes.
/// Returns the number of lines forwarded.
pub async fn forward(mut lines: mpsc::Receiver<String>, supervisor: &SupervisorHandle) -> usize {
    let mut forwarded = 0;
    while let Some(line) = lines.recv().await {
        if line.is_empty() {
            continue;
        }
        match supervisor.send_command(line).await {
            Ok(()) => forwarded += 1,
            Err(e) => warn!(error = %e, "Console command not delivered"),
        }
    }
    forwarded
}
