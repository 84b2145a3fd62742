//! Daemon process spawning utilities.
//!
//! Provides helpers for resolving the server binary path and spawning the
//! server process with the forwarded configuration arguments.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io;
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

/// Environment variable naming the server binary.
pub const SERVER_BIN_ENV_VAR: &str = "PYTABLES_SERVER_BIN";

const DEFAULT_SERVER_BINARY: &str = "pytables-server";

/// Observed state of a spawned server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// The process has not exited yet.
    Running,
    /// The process exited; `None` when it was killed by a signal.
    Exited(Option<i32>),
}

/// Handle to a server process started by a [`DaemonLauncher`].
pub trait LaunchedDaemon {
    /// Process identifier of the spawned process.
    fn id(&self) -> u32;

    /// Polls the process without blocking.
    ///
    /// # Errors
    ///
    /// Returns the OS error raised while polling.
    fn state(&mut self) -> io::Result<ChildState>;
}

/// Starts `pytables-server` processes.
pub trait DaemonLauncher {
    /// Handle returned for each launch.
    type Child: LaunchedDaemon;

    /// Spawns the server with `arguments` (program name excluded).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::LaunchDaemon`] when the binary cannot be
    /// executed.
    fn launch(&self, arguments: &[OsString]) -> Result<Self::Child, LifecycleError>;
}

/// Launcher executing the real server binary.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    binary_override: Option<OsString>,
}

impl SystemLauncher {
    /// Launcher that runs `binary` instead of the resolved default.
    #[must_use]
    pub fn with_binary(binary: impl Into<OsString>) -> Self {
        Self {
            binary_override: Some(binary.into()),
        }
    }
}

impl DaemonLauncher for SystemLauncher {
    type Child = SystemChild;

    fn launch(&self, arguments: &[OsString]) -> Result<Self::Child, LifecycleError> {
        let binary = resolve_daemon_binary(self.binary_override.as_deref());
        let mut command = Command::new(&binary);
        command
            .args(arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
            .spawn()
            .map(|child| SystemChild { child })
            .map_err(|source| LifecycleError::LaunchDaemon { binary, source })
    }
}

/// A server process spawned by [`SystemLauncher`].
#[derive(Debug)]
pub struct SystemChild {
    child: Child,
}

impl LaunchedDaemon for SystemChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn state(&mut self) -> io::Result<ChildState> {
        Ok(self
            .child
            .try_wait()?
            .map_or(ChildState::Running, |status| {
                ChildState::Exited(status.code())
            }))
    }
}

fn resolve_daemon_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(SERVER_BIN_ENV_VAR))
        .unwrap_or_else(|| OsString::from(DEFAULT_SERVER_BINARY))
}
