//! Settings resolution for mcwarden.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. `settings/settings.json` under the working directory
//! 3. Environment variables
//! 4. CLI arguments (applied by the binary)
//!
//! When `settings/settings.json` is missing but `settings/base.settings.json`
//! exists, the base file is moved into place on first start.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const SETTINGS_DIR: &str = "settings";
pub const SETTINGS_FILE: &str = "settings.json";
pub const BASE_SETTINGS_FILE: &str = "base.settings.json";

/// JVM flags the server is launched with unless overridden.
pub const DEFAULT_JVM_ARGS: &[&str] = &[
    "--add-modules=jdk.incubator.vector",
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:InitiatingHeapOccupancyPercent=15",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
    "-Dusing.aikars.flags=https://mcflags.emc.gs",
    "-Daikars.new.flags=true",
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
];

/// Complete mcwarden configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// HTTP port for the event feed.
    #[serde(rename = "WebPort")]
    pub web_port: u16,
    pub bind_address: IpAddr,
    /// Number of durable events kept for replay to new subscribers.
    pub event_history: usize,
    /// Seconds to wait for the stop command before killing the server.
    pub kill_timeout_secs: u64,
    /// Server working directory, relative to the daemon's working directory.
    pub server_dir: PathBuf,
    pub java: PathBuf,
    pub jvm_args: Vec<String>,
    pub server_jar: String,
    pub stop_command: String,
    /// Optional directory served as static files next to the event feed.
    pub public_dir: Option<PathBuf>,
    /// Per-subscriber delivery queue length before the subscriber is dropped.
    pub subscriber_queue: usize,
    pub restart: RestartSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            web_port: 8080,
            bind_address: IpAddr::from([127, 0, 0, 1]),
            event_history: 100,
            kill_timeout_secs: 5,
            server_dir: PathBuf::from("minecraft"),
            java: PathBuf::from("java"),
            jvm_args: DEFAULT_JVM_ARGS.iter().map(|s| (*s).to_string()).collect(),
            server_jar: "server.jar".to_string(),
            stop_command: "stop".to_string(),
            public_dir: None,
            subscriber_queue: 256,
            restart: RestartSettings::default(),
        }
    }
}

impl Settings {
    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }

    /// Full server argument list: JVM flags, then `-jar <jar> --nogui`.
    pub fn server_args(&self) -> Vec<String> {
        let mut args = self.jvm_args.clone();
        args.push("-jar".to_string());
        args.push(self.server_jar.clone());
        args.push("--nogui".to_string());
        args
    }
}

/// Crash restart pacing.
///
/// Runs that lived at least `fast_exit_threshold_secs` are restarted
/// immediately. Consecutive shorter runs back off exponentially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestartSettings {
    pub fast_exit_threshold_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            fast_exit_threshold_secs: 10,
            initial_backoff_ms: 1_000,
            max_backoff_secs: 30,
        }
    }
}

/// Load settings rooted at `base_dir` (normally the working directory).
pub fn load_settings(base_dir: &Path) -> Result<Settings> {
    let mut settings = match bootstrap_settings_file(base_dir)? {
        Some(path) => load_settings_file(&path)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Return the settings file to load, moving the base file into place if
/// only the base file exists.
fn bootstrap_settings_file(base_dir: &Path) -> Result<Option<PathBuf>> {
    let dir = base_dir.join(SETTINGS_DIR);
    let path = dir.join(SETTINGS_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    let base = dir.join(BASE_SETTINGS_FILE);
    if !base.exists() {
        return Ok(None);
    }

    std::fs::rename(&base, &path).map_err(|e| {
        Error::Config(format!(
            "Failed to move {} to {}: {}",
            base.display(),
            path.display(),
            e
        ))
    })?;
    info!(path = %path.display(), "Created settings file from base settings");
    Ok(Some(path))
}

fn load_settings_file(path: &Path) -> Result<Settings> {
    debug!(path = %path.display(), "Loading settings file");
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("MCWARDEN_WEB_PORT")
        && let Ok(n) = val.parse()
    {
        settings.web_port = n;
    }
    if let Ok(val) = std::env::var("MCWARDEN_EVENT_HISTORY")
        && let Ok(n) = val.parse()
    {
        settings.event_history = n;
    }
    if let Ok(val) = std::env::var("MCWARDEN_KILL_TIMEOUT")
        && let Ok(n) = val.parse()
    {
        settings.kill_timeout_secs = n;
    }
    if let Ok(val) = std::env::var("MCWARDEN_SERVER_DIR") {
        settings.server_dir = PathBuf::from(val);
    }
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.subscriber_queue == 0 {
        return Err(Error::Config("subscriberQueue must be at least 1".into()));
    }
    if settings.stop_command.trim().is_empty() {
        return Err(Error::Config("stopCommand must not be empty".into()));
    }
    Ok(())
}
