//! mcwarden daemon
//!
//! Runs the game server as a child process, restarts it when it crashes,
//! forwards the operator console to it and republishes what it logs as a
//! live event feed.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use mcwarden_core::settings::load_settings;
use mcwarden_daemon::bus::{BusConfig, EventBus};
use mcwarden_daemon::server::{AppState, SubscriptionServer, build_router, supervisor_stopping};
use mcwarden_daemon::supervisor::{LaunchProfile, RestartPolicy, Supervisor, SupervisorState};
use mcwarden_daemon::{console, rules};

#[derive(Parser, Debug)]
#[command(name = "mcwarden")]
#[command(version, about = "Game server supervisor with a live event feed")]
struct Args {
    /// Directory holding `settings/` and the server directory
    #[arg(long, env = "MCWARDEN_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// HTTP port for the event feed (overrides settings)
    #[arg(long)]
    port: Option<u16>,

    /// Durable events kept for replay (overrides settings)
    #[arg(long)]
    event_history: Option<usize>,

    /// Seconds to wait for the stop command before killing (overrides settings)
    #[arg(long)]
    kill_timeout: Option<u64>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "MCWARDEN_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "MCWARDEN_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = mcwarden_core::tracing_init::default_filter("mcwarden_daemon", &args.log_level);
    mcwarden_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let base_dir = match args.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut settings = load_settings(&base_dir)?;
    if let Some(port) = args.port {
        settings.web_port = port;
    }
    if let Some(n) = args.event_history {
        settings.event_history = n;
    }
    if let Some(secs) = args.kill_timeout {
        settings.kill_timeout_secs = secs;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_dir = %base_dir.display(),
        port = settings.web_port,
        "Starting mcwarden"
    );

    let bus = EventBus::new(BusConfig {
        history_capacity: settings.event_history,
        subscriber_queue: settings.subscriber_queue,
    });
    let dispatcher = rules::default_dispatcher(&bus)?;

    let public_dir = settings.public_dir.as_ref().map(|dir| base_dir.join(dir));
    let router = build_router(AppState::new(bus.clone()), public_dir.as_deref());
    let addr = SocketAddr::new(settings.bind_address, settings.web_port);
    let server = SubscriptionServer::bind(addr, router).await?;

    let profile = LaunchProfile::from_settings(&settings, &base_dir);
    let supervisor = Supervisor::new(profile, bus, dispatcher)
        .with_restart_policy(RestartPolicy::from(&settings.restart))
        .with_kill_timeout(settings.kill_timeout())
        .start()?;

    let server_task = tokio::spawn(server.serve(supervisor_stopping(supervisor.subscribe_state())));

    // Notify systemd that the daemon is ready (unix only). The `true`
    // parameter unsets $NOTIFY_SOCKET so the server process cannot notify.
    #[cfg(unix)]
    {
        if let Err(e) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
            warn!(error = %e, "systemd notification failed");
        }
    }

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    let mut state_rx = supervisor.subscribe_state();
    let console_input = console::spawn_stdin_reader();

    tokio::select! {
        forwarded = console::forward(console_input, &supervisor) => {
            info!(forwarded, "Console closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
        _ = state_rx.wait_for(|s| *s == SupervisorState::Stopped) => {
            warn!("Supervisor stopped on its own");
        }
    }

    let report = supervisor.shutdown_and_wait().await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Event feed failed"),
        Err(e) => warn!(error = %e, "Event feed task failed"),
    }
    let report = report?;

    info!(
        outcome = ?report.outcome,
        restarts = report.restarts,
        "mcwarden stopped"
    );
    Ok(())
}
