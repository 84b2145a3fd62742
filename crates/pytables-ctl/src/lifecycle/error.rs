//! Error types for daemon lifecycle operations.

use std::ffi::OsString;
use std::io;
use std::time::Duration;

use camino::Utf8PathBuf;
use pytables_config::{HealthError, ModeError, PidFileError, RuntimePathsError};
use thiserror::Error;

/// Exit status for an unknown mode, shared with `pytables-server`.
const EXIT_INVALID_MODE: u8 = 2;

/// Errors raised while executing lifecycle commands.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The configured mode is not in the registry.
    #[error(transparent)]
    Mode(#[from] ModeError),
    /// The server binary could not be executed.
    #[error("failed to spawn server binary '{binary:?}': {source}")]
    LaunchDaemon {
        /// Binary that was executed.
        binary: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server exited with an error before reporting ready.
    #[error("daemon exited before reporting ready (status: {exit_status:?})")]
    StartupFailed {
        /// Exit code of the server process, if it exited normally.
        exit_status: Option<i32>,
    },
    /// The server reported a terminal state before reaching ready.
    #[error("daemon reported '{status}' before reaching ready; check health snapshot at {path}")]
    StartupAborted {
        /// Health snapshot path.
        path: Utf8PathBuf,
        /// Reported status.
        status: String,
    },
    /// No fresh ready snapshot appeared in time.
    #[error("timed out waiting for ready snapshot in {timeout:?} at {health_path}")]
    StartupTimeout {
        /// Health snapshot path.
        health_path: Utf8PathBuf,
        /// How long the controller waited.
        timeout: Duration,
    },
    /// Polling the spawned server failed.
    #[error("failed to monitor daemon launch: {source}")]
    MonitorChild {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The health snapshot could not be read.
    #[error(transparent)]
    Health(#[from] HealthError),
    /// A PID file could not be read.
    #[error(transparent)]
    PidFile(#[from] PidFileError),
    /// The runtime directory could not be prepared.
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    /// Lifecycle output could not be written.
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
    /// SIGTERM could not be delivered.
    #[error("failed to signal daemon pid {pid}: {source}")]
    SignalFailed {
        /// Target process.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The daemon was signalled but did not exit in time.
    #[error("daemon shutdown did not complete within {timeout:?}; check {pid_path}")]
    ShutdownTimeout {
        /// PID file that is still present.
        pid_path: Utf8PathBuf,
        /// How long the controller waited.
        timeout: Duration,
    },
    /// A leftover runtime file could not be removed.
    #[error("failed to remove leftover runtime file {path}: {source}")]
    Cleanup {
        /// File that could not be removed.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The platform offers no way to signal processes.
    #[cfg(not(unix))]
    #[error("platform does not support daemon lifecycle signalling")]
    UnsupportedPlatform,
}

impl LifecycleError {
    /// Process exit status reported for this failure.
    ///
    /// An invalid mode exits with `2`. When the spawned server failed on its
    /// own, its exit status is passed through; everything else exits with
    /// `1`.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Mode(_) => EXIT_INVALID_MODE,
            Self::StartupFailed {
                exit_status: Some(code),
            } => u8::try_from(*code)
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}
