//! Detaches `pytables-server` from the controlling terminal.

use std::ffi::OsStr;

use daemonize_me::Daemon;
use pytables_config::{RuntimePaths, SERVICE_NAME};
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Abstraction over daemonisation strategies.
pub trait Daemonizer {
    /// Detaches the process into the background. Only the detached child
    /// returns; the original process exits successfully.
    ///
    /// # Errors
    ///
    /// Fails when forking or session setup fails.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser that delegates to `daemonize-me`: double fork, new session,
/// standard streams on `/dev/null`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Builds a new system daemoniser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            runtime = %paths.runtime_dir(),
            "daemonising into background"
        );
        Daemon::new()
            .work_dir(paths.runtime_dir().as_std_path())
            .name(OsStr::new(SERVICE_NAME))
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "daemon process detached; continuing in child"
        );
        Ok(())
    }
}
