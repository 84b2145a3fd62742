//! PID file probing.
//!
//! The PID file is the single source of truth for "is the daemon running":
//! a daemon is alive when its file names a process that still exists.

use std::fs;
use std::io;
use std::num::ParseIntError;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors raised while reading a PID file.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// The file exists but could not be read.
    #[error("failed to read pid file '{path}': {source}")]
    Read {
        /// PID file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The file does not contain a process identifier.
    #[error("failed to parse pid file '{path}': {source}")]
    Parse {
        /// PID file path.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: ParseIntError,
    },
}

/// Outcome of probing a PID file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidState {
    /// No PID file (or an empty one).
    Absent,
    /// The file exists but its content is not a PID.
    Corrupt,
    /// The recorded process no longer exists.
    Stale(u32),
    /// The recorded process is alive.
    Live(u32),
}

impl PidState {
    /// Whether the probed daemon is running.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// Reads the PID recorded at `path`.
///
/// Returns `Ok(None)` when the file is missing or empty.
///
/// # Errors
///
/// Fails when the file cannot be read or holds something other than an
/// unsigned integer.
pub fn read_pid(path: &Utf8Path) -> Result<Option<u32>, PidFileError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| PidFileError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PidFileError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Probes the PID file at `path` without modifying anything.
///
/// # Errors
///
/// Fails only when the file exists but cannot be read.
pub fn probe(path: &Utf8Path) -> Result<PidState, PidFileError> {
    match read_pid(path) {
        Ok(None) => Ok(PidState::Absent),
        Ok(Some(pid)) if process_alive(pid) => Ok(PidState::Live(pid)),
        Ok(Some(pid)) => Ok(PidState::Stale(pid)),
        Err(PidFileError::Parse { .. }) => Ok(PidState::Corrupt),
        Err(error) => Err(error),
    }
}

/// Whether a process with `pid` exists. Processes owned by other users count
/// as alive.
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks of
    // `kill(2)` without delivering anything.
    let result = unsafe { libc::kill(raw, 0) };
    if result == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether a process with `pid` exists.
#[cfg(not(unix))]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let _ = pid;
    false
}
