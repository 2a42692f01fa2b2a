//! Supervisor lifecycle against real `sh` child processes.
#![cfg(unix)]
#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use mcwarden_core::{EventKind, LineDispatcher};
use mcwarden_daemon::bus::{EventBus, Subscription};
use mcwarden_daemon::console;
use mcwarden_daemon::rules::default_dispatcher;
use mcwarden_daemon::supervisor::{
    LaunchProfile, RestartPolicy, StopOutcome, Supervisor, SupervisorError, SupervisorHandle,
    SupervisorState,
};

const STEP: Duration = Duration::from_secs(10);

/// Echoes every input line back as `got <line>` and exits on `stop`.
const OBEYS_STOP: &str = r#"
while read line; do
  if [ "$line" = stop ]; then exit 0; fi
  echo "got $line"
done
"#;

fn sh(dir: &Path, script: &str) -> LaunchProfile {
    LaunchProfile::new("sh", dir).arg("-c").arg(script)
}

async fn wait_for_state(handle: &SupervisorHandle, want: SupervisorState) {
    let mut rx = handle.subscribe_state();
    tokio::time::timeout(STEP, rx.wait_for(|s| *s == want))
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
}

async fn next_of_kind(sub: &mut Subscription, kind: &EventKind) -> mcwarden_core::Event {
    loop {
        let event = tokio::time::timeout(STEP, sub.recv())
            .await
            .expect("no event in time")
            .expect("subscription ended");
        if event.kind() == kind {
            return event;
        }
    }
}

#[tokio::test]
async fn graceful_stop_does_not_kill() {
    let dir = tempfile::tempdir().unwrap();
    // exits 100ms after receiving the stop command
    let script = r#"while read line; do if [ "$line" = stop ]; then sleep 0.1; exit 0; fi; done"#;
    let bus = EventBus::with_defaults();
    let handle = Supervisor::new(sh(dir.path(), script), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_kill_timeout(Duration::from_secs(5))
        .start()
        .unwrap();
    wait_for_state(&handle, SupervisorState::Running).await;

    let started = Instant::now();
    let report = handle.shutdown_and_wait().await.unwrap();

    assert_eq!(report.outcome, StopOutcome::Graceful);
    assert_eq!(report.restarts, 0);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(bus.is_closed());
}

#[tokio::test]
async fn hung_server_is_killed_once_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::with_defaults();
    let handle = Supervisor::new(sh(dir.path(), "exec sleep 30"), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_kill_timeout(Duration::from_millis(300))
        .start()
        .unwrap();
    wait_for_state(&handle, SupervisorState::Running).await;
    let mut states = handle.subscribe_state();

    let started = Instant::now();
    handle.shutdown().await;
    states
        .wait_for(|s| *s == SupervisorState::Stopping)
        .await
        .unwrap();
    let report = tokio::time::timeout(STEP, handle.wait()).await.unwrap().unwrap();

    assert_eq!(report.outcome, StopOutcome::Forced);
    assert_eq!(report.restarts, 0);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    // the kill was an expected exit, not a crash
    assert!(
        !bus.history()
            .iter()
            .any(|e| e.kind() == &EventKind::ServerRestart)
    );
}

#[tokio::test]
async fn crash_restarts_once_and_resets_online_users() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!(
        r#"
if [ -f crashed ]; then
  {OBEYS_STOP}
else
  touch crashed
  echo "[00:00:00] [Server thread/INFO]: Steve joined the game"
  exit 3
fi
"#
    );
    let bus = EventBus::with_defaults();
    let mut sub = bus.subscribe().unwrap();
    let handle = Supervisor::new(sh(dir.path(), &script), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_restart_policy(RestartPolicy::immediate())
        .start()
        .unwrap();

    next_of_kind(&mut sub, &EventKind::UserJoin).await;
    let restart = next_of_kind(&mut sub, &EventKind::ServerRestart).await;
    assert!(restart.payload().is_null());
    assert!(bus.presence().onliner.is_empty());

    wait_for_state(&handle, SupervisorState::Running).await;
    let report = handle.shutdown_and_wait().await.unwrap();

    assert_eq!(report.outcome, StopOutcome::Graceful);
    assert_eq!(report.restarts, 1);
    let restarts = bus
        .history()
        .iter()
        .filter(|e| e.kind() == &EventKind::ServerRestart)
        .count();
    assert_eq!(restarts, 1);
}

#[tokio::test]
async fn output_flushed_right_before_a_crash_lands_before_the_restart() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!(
        r#"
if [ -f crashed ]; then
  {OBEYS_STOP}
else
  touch crashed
  i=0
  while [ $i -lt 3000 ]; do
    echo "[00:00:00] [Server thread/INFO]: Preparing spawn area: $i"
    i=$((i+1))
  done
  echo "[00:00:00] [Server thread/INFO]: Steve joined the game"
  exit 3
fi
"#
    );
    let bus = EventBus::with_defaults();
    let mut sub = bus.subscribe().unwrap();
    let handle = Supervisor::new(sh(dir.path(), &script), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_restart_policy(RestartPolicy::immediate())
        .start()
        .unwrap();

    next_of_kind(&mut sub, &EventKind::UserJoin).await;
    next_of_kind(&mut sub, &EventKind::ServerRestart).await;
    wait_for_state(&handle, SupervisorState::Running).await;
    assert!(bus.presence().onliner.is_empty());

    let report = handle.shutdown_and_wait().await.unwrap();
    assert_eq!(report.restarts, 1);
    assert!(bus.presence().onliner.is_empty());
    let kinds: Vec<EventKind> = bus.history().iter().map(|e| e.kind().clone()).collect();
    assert_eq!(kinds, [EventKind::UserJoin, EventKind::ServerRestart]);
}

#[tokio::test]
async fn server_ignoring_stdin_is_still_killed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::with_defaults();
    let handle = Supervisor::new(sh(dir.path(), "exec sleep 30"), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_kill_timeout(Duration::from_millis(300))
        .start()
        .unwrap();
    wait_for_state(&handle, SupervisorState::Running).await;

    // several megabytes: fills the pipe and the stdin queue behind it
    let command = "x".repeat(100 * 1024);
    for _ in 0..40 {
        handle.send_command(command.clone()).await.unwrap();
    }

    let started = Instant::now();
    let report = tokio::time::timeout(STEP, handle.shutdown_and_wait())
        .await
        .expect("shutdown hung")
        .unwrap();

    assert_eq!(report.outcome, StopOutcome::Forced);
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[tokio::test]
async fn shutdown_during_crash_backoff_is_immediate() {
    let dir = tempfile::tempdir().unwrap();
    let policy = RestartPolicy {
        fast_exit_threshold: Duration::from_secs(60),
        initial_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(30),
    };
    let bus = EventBus::with_defaults();
    let mut sub = bus.subscribe().unwrap();
    let handle = Supervisor::new(sh(dir.path(), "exit 1"), bus.clone(), default_dispatcher(&bus).unwrap())
        .with_restart_policy(policy)
        .start()
        .unwrap();

    // first crash restarts at once, the second one enters backoff
    next_of_kind(&mut sub, &EventKind::ServerRestart).await;
    next_of_kind(&mut sub, &EventKind::ServerRestart).await;
    wait_for_state(&handle, SupervisorState::Starting).await;
    assert!(matches!(
        handle.send_command("list").await,
        Err(SupervisorError::NotRunning)
    ));

    let started = Instant::now();
    let report = tokio::time::timeout(STEP, handle.shutdown_and_wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.outcome, StopOutcome::NotRunning);
    assert_eq!(report.restarts, 2);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn console_lines_reach_server_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::with_defaults();
    let echo_bus = bus.clone();
    let dispatcher = LineDispatcher::builder()
        .rule("echo", r"^got (?P<line>.*)$", move |caps| {
            echo_bus.publish(EventKind::Custom("echo".into()), json!({ "line": &caps["line"] }));
        })
        .unwrap()
        .build();
    let mut sub = bus.subscribe().unwrap();
    let handle = Supervisor::new(sh(dir.path(), OBEYS_STOP), bus.clone(), dispatcher)
        .start()
        .unwrap();
    wait_for_state(&handle, SupervisorState::Running).await;

    let (tx, rx) = mpsc::channel(8);
    for line in ["say hi", "", "list"] {
        tx.send(line.to_string()).await.unwrap();
    }
    drop(tx);
    let forwarded = console::forward(rx, &handle).await;
    assert_eq!(forwarded, 2);

    let echo = EventKind::Custom("echo".into());
    assert_eq!(next_of_kind(&mut sub, &echo).await.payload()["line"], "say hi");
    assert_eq!(next_of_kind(&mut sub, &echo).await.payload()["line"], "list");

    let report = handle.shutdown_and_wait().await.unwrap();
    assert_eq!(report.outcome, StopOutcome::Graceful);
}

#[tokio::test]
async fn missing_executable_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::with_defaults();
    let profile = LaunchProfile::new(dir.path().join("no-such-server"), dir.path());
    let result = Supervisor::new(profile, bus.clone(), default_dispatcher(&bus).unwrap()).start();
    assert!(matches!(result, Err(SupervisorError::SpawnFailed { .. })));
}
