//! Daemon shutdown utilities.
//!
//! Provides helpers for signalling the daemon to stop, waiting for the
//! shutdown sequence to complete and clearing whatever it left behind.

use std::fs;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use pytables_config::{PidState, RuntimePaths, probe, process_alive};

use super::error::LifecycleError;
use super::monitoring::POLL_INTERVAL;

/// Delivers termination requests to daemon processes.
pub trait ProcessSignaller {
    /// Asks `pid` to shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SignalFailed`] when the signal cannot be
    /// delivered.
    fn terminate(&self, pid: u32) -> Result<(), LifecycleError>;

    /// Whether `pid` still exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signaller backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSignaller;

impl ProcessSignaller for SystemSignaller {
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<(), LifecycleError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| LifecycleError::SignalFailed {
            pid,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| LifecycleError::SignalFailed {
            pid,
            source: io::Error::from(errno),
        })
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> Result<(), LifecycleError> {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }

    fn is_alive(&self, pid: u32) -> bool {
        process_alive(pid)
    }
}

/// Waits until the PID file is gone and `pid` has exited.
///
/// # Errors
///
/// Returns [`LifecycleError::ShutdownTimeout`] when either condition still
/// holds after `timeout`.
pub(super) fn wait_for_shutdown<S: ProcessSignaller>(
    paths: &RuntimePaths,
    pid: u32,
    signaller: &S,
    timeout: Duration,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !paths.pid_path().exists() && !signaller.is_alive(pid) {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout,
    })
}

/// Removes runtime files no live process owns any more.
///
/// The PID file and lock are removed only when they name a dead process, so
/// a daemon starting concurrently keeps its artefacts. The health snapshot
/// goes along with a dead PID file. Returns whether anything was removed.
///
/// # Errors
///
/// Fails when a file exists but cannot be read or removed.
pub(super) fn clear_leftovers(paths: &RuntimePaths) -> Result<bool, LifecycleError> {
    let mut removed = false;
    if owner_is_gone(paths.pid_path())? {
        removed |= remove_if_present(paths.pid_path())?;
        removed |= remove_if_present(paths.health_path())?;
    }
    if owner_is_gone(paths.lock_path())? {
        removed |= remove_if_present(paths.lock_path())?;
    }
    Ok(removed)
}

fn owner_is_gone(path: &Utf8Path) -> Result<bool, LifecycleError> {
    Ok(matches!(
        probe(path)?,
        PidState::Absent | PidState::Stale(_) | PidState::Corrupt
    ))
}

fn remove_if_present(path: &Utf8Path) -> Result<bool, LifecycleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(LifecycleError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
