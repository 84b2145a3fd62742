//! Derives and exposes runtime artefact paths for the daemon lifecycle.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::defaults::SERVICE_NAME;
use crate::mode::Variant;

/// Errors raised while preparing the runtime directory.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The runtime directory could not be created or secured.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be prepared.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Locations of the files that describe a daemon on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    runtime_dir: Utf8PathBuf,
    lock_path: Utf8PathBuf,
    pid_path: Utf8PathBuf,
    health_path: Utf8PathBuf,
    watchdog_pid_path: Utf8PathBuf,
}

impl RuntimePaths {
    /// Derives the paths and creates the runtime directory (mode `0700` for
    /// newly created directories).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError::RuntimeDirectory`] when the directory
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let paths = Self::from_config_readonly(config);
        create_runtime_dir(&paths.runtime_dir)?;
        Ok(paths)
    }

    /// Derives the paths without touching the filesystem; used by probes
    /// that must never mutate state.
    #[must_use]
    pub fn from_config_readonly(config: &Config) -> Self {
        let runtime_dir = config.runtime_dir.clone();
        Self {
            lock_path: runtime_dir.join(format!("{SERVICE_NAME}.lock")),
            pid_path: runtime_dir.join(format!("{SERVICE_NAME}.pid")),
            health_path: runtime_dir.join(format!("{SERVICE_NAME}.health")),
            watchdog_pid_path: config.watchdog_pid_path.clone(),
            runtime_dir,
        }
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Utf8Path {
        &self.runtime_dir
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Utf8Path {
        &self.lock_path
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Utf8Path {
        &self.pid_path
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Utf8Path {
        &self.health_path
    }

    /// Path to the watchdog PID file.
    #[must_use]
    pub fn watchdog_pid_path(&self) -> &Utf8Path {
        &self.watchdog_pid_path
    }

    /// Listening socket of one server instance.
    #[must_use]
    pub fn socket_path(&self, variant: Variant) -> Utf8PathBuf {
        self.runtime_dir.join(format!("pytables-{variant}.sock"))
    }
}

fn create_runtime_dir(path: &Utf8Path) -> Result<(), RuntimePathsError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: path.to_path_buf(),
            source,
        })
}
