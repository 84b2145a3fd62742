//! Defines the unified error surface for daemon launch and supervision.

use std::io;
use std::time::SystemTimeError;

use camino::Utf8PathBuf;
use nix::errno::Errno;
use pytables_config::{ModeError, RuntimePathsError, Variant};
use thiserror::Error;

use crate::instance::InstanceError;
use crate::scheduler::SchedulerError;

use super::daemonizer::DaemonizeError;
use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The requested mode is not known to the registry.
    #[error(transparent)]
    Mode(#[from] ModeError),
    /// The runtime directory could not be prepared.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A running daemon already holds the lock.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded in the existing PID file.
        pid: u32,
    },
    /// Another launch is still initialising the runtime artefacts.
    #[error("daemon launch already in progress (lock: '{lock}', pid: {pid})")]
    StartupInProgress {
        /// Lock file guarding the active launch.
        lock: Utf8PathBuf,
        /// PID of the launching process.
        pid: u32,
    },
    /// Removing a stale runtime artefact failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Path of the artefact that could not be removed.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the health snapshot failed.
    #[error("failed to write health snapshot '{path}': {source}")]
    HealthWrite {
        /// Health file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising the health snapshot failed.
    #[error("failed to serialise health snapshot: {source}")]
    HealthSerialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {source}")]
    Clock {
        /// Underlying system time error.
        #[from]
        source: SystemTimeError,
    },
    /// Attempting to probe an existing PID failed.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// PID that failed to probe.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Health updates were attempted before writing the PID file.
    #[error("pid must be written before updating health state")]
    MissingPid,
    /// A server instance could not be created.
    #[error("failed to create {variant} server: {source}")]
    Instance {
        /// Variant being instantiated.
        variant: Variant,
        /// Underlying instance error.
        #[source]
        source: InstanceError,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[from]
        source: DaemonizeError,
    },
    /// Installing the shutdown listener failed.
    #[error("failed to install shutdown listener: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[from]
        source: ShutdownError,
    },
    /// The scheduler terminated with an error.
    #[error("server terminated: {source}")]
    Scheduler {
        /// Underlying scheduler error.
        #[from]
        source: SchedulerError,
    },
}
