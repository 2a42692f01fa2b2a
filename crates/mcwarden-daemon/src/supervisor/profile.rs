//! How the supervised server is launched.

use std::path::{Path, PathBuf};

use mcwarden_core::Settings;

/// Fixed command line, working directory and stop command of the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    /// Written to the child's stdin to ask it to exit on its own.
    pub stop_command: String,
}

impl LaunchProfile {
    pub fn new(program: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: working_directory.into(),
            stop_command: "stop".to_string(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stop_command(mut self, command: impl Into<String>) -> Self {
        self.stop_command = command.into();
        self
    }

    /// Build the game server profile, resolving the server directory against
    /// `base_dir`.
    pub fn from_settings(settings: &Settings, base_dir: &Path) -> Self {
        Self::new(&settings.java, base_dir.join(&settings.server_dir))
            .args(settings.server_args())
            .stop_command(settings.stop_command.clone())
    }
}
