//! Health snapshot schema shared by the daemon (writer) and the control tool
//! (reader).

use std::fmt;
use std::fs;
use std::io;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational state reported through the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    /// Instances are bound; the scheduler has not started yet.
    Starting,
    /// Every instance is registered and serving.
    Ready,
    /// The scheduler finished and the daemon is cleaning up.
    Stopping,
    /// The daemon terminated because of an error.
    Failed,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Ready => f.write_str("ready"),
            Self::Stopping => f.write_str("stopping"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// JSON document stored in `pytables-server.health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Current daemon state.
    pub status: DaemonStatus,
    /// Process ID of the daemon.
    pub pid: u32,
    /// Mode the daemon was started with.
    pub mode: String,
    /// Seconds since the Unix epoch when the snapshot was written.
    pub timestamp: u64,
}

impl HealthSnapshot {
    /// Builds a snapshot stamped with the current time.
    ///
    /// # Errors
    ///
    /// Fails when the system clock reads earlier than the Unix epoch.
    pub fn now(status: DaemonStatus, pid: u32, mode: &str) -> Result<Self, SystemTimeError> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        Ok(Self {
            status,
            pid,
            mode: mode.to_owned(),
            timestamp,
        })
    }

    /// Whether the snapshot was written no earlier than `started_at`, at
    /// whole-second precision.
    #[must_use]
    pub fn is_fresh_since(&self, started_at: SystemTime) -> bool {
        started_at
            .duration_since(UNIX_EPOCH)
            .map(|since| self.timestamp >= since.as_secs())
            .unwrap_or(false)
    }
}

/// Errors raised while reading a health snapshot.
#[derive(Debug, Error)]
pub enum HealthError {
    /// The snapshot exists but could not be read.
    #[error("failed to read health snapshot '{path}': {source}")]
    Read {
        /// Snapshot path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The snapshot is not valid JSON.
    #[error("failed to parse health snapshot '{path}': {source}")]
    Parse {
        /// Snapshot path.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the snapshot at `path`; `Ok(None)` when there is none.
///
/// # Errors
///
/// Fails when the file exists but is unreadable or malformed.
pub fn read_health(path: &Utf8Path) -> Result<Option<HealthSnapshot>, HealthError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| HealthError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(HealthError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
