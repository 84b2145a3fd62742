//! Configuration record and layered loading.
//!
//! Values are resolved once per invocation from four layers, lowest
//! precedence first: built-in defaults, the configuration file, the
//! environment and the command line.

use std::env;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::defaults::{
    CONFIG_ENV_VAR, DEBUG_ENV_VAR, DEFAULT_CONFIG_PATH, RUNTIME_DIR_ENV_VAR, SERVICE_NAME,
    default_console, default_debug, default_disk, default_log_dir, default_mode,
    default_runtime_dir, default_watchdog_pid_path,
};
use crate::file::ConfigFile;
use crate::logging::LogFormat;
use crate::mode::{Mode, ModeError, Variant, parse_mode};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML or has unexpected keys.
    #[error("failed to parse configuration file '{path}': {source}")]
    Parse {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying parser error.
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// Values supplied on the command line. `None` leaves the lower layers in
/// charge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--mode`.
    pub mode: Option<String>,
    /// `--debug` / `--no-debug`.
    pub debug: Option<bool>,
    /// `--disk` / `--no-disk`.
    pub disk: Option<bool>,
    /// `--console`.
    pub console: Option<bool>,
    /// `--config-path`.
    pub config_path: Option<Utf8PathBuf>,
    /// `--runtime-dir`.
    pub runtime_dir: Option<Utf8PathBuf>,
}

/// Values read from `PYTABLES_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// `PYTABLES_DEBUG`.
    pub debug: Option<bool>,
    /// `PYTABLES_CONFIG`.
    pub config_path: Option<Utf8PathBuf>,
    /// `PYTABLES_RUNTIME_DIR`.
    pub runtime_dir: Option<Utf8PathBuf>,
}

impl Environment {
    /// Snapshots the process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            debug: debug_from_env(env::var(DEBUG_ENV_VAR).ok().as_deref()),
            config_path: non_empty_path(CONFIG_ENV_VAR),
            runtime_dir: non_empty_path(RUNTIME_DIR_ENV_VAR),
        }
    }
}

fn non_empty_path(name: &str) -> Option<Utf8PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
}

/// Interprets `PYTABLES_DEBUG`: `1` enables, `0` disables, anything else
/// defers to the other layers.
#[must_use]
pub fn debug_from_env(value: Option<&str>) -> Option<bool> {
    match value.map(str::trim) {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

/// Immutable configuration record shared by the daemon and the control tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Requested mode, still textual; see [`Config::resolve_mode`].
    pub mode: String,
    /// Verbose logging.
    pub debug: bool,
    /// Log to the rotating file under `log_dir`.
    pub disk: bool,
    /// Log to standard error.
    pub console: bool,
    /// Formatter used by every log sink.
    pub log_format: LogFormat,
    /// Directory receiving log files.
    pub log_dir: Utf8PathBuf,
    /// Directory holding PID, lock, health and socket files.
    pub runtime_dir: Utf8PathBuf,
    /// PID file of the companion watchdog.
    pub watchdog_pid_path: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let runtime_dir = default_runtime_dir();
        Self {
            mode: default_mode(),
            debug: default_debug(),
            disk: default_disk(),
            console: default_console(),
            log_format: LogFormat::default(),
            log_dir: default_log_dir(),
            watchdog_pid_path: default_watchdog_pid_path(&runtime_dir),
            runtime_dir,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment, the configuration
    /// file and `overrides`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration file exists but is unreadable or
    /// malformed.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load_with(overrides, &Environment::capture())
    }

    /// Loads configuration with an explicit environment snapshot.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(
        overrides: &ConfigOverrides,
        environment: &Environment,
    ) -> Result<Self, ConfigError> {
        let path = config_path(overrides, environment);
        let file = ConfigFile::load(&path)?;
        Ok(Self::layer(overrides, environment, &file))
    }

    /// Combines the layers without touching the filesystem.
    #[must_use]
    pub fn layer(
        overrides: &ConfigOverrides,
        environment: &Environment,
        file: &ConfigFile,
    ) -> Self {
        let mode = overrides.mode.clone().unwrap_or_else(default_mode);
        let section = file.section_for(&mode);
        let runtime_dir = overrides
            .runtime_dir
            .clone()
            .or_else(|| environment.runtime_dir.clone())
            .or_else(|| file.runtime_dir.clone())
            .unwrap_or_else(default_runtime_dir);
        let watchdog_pid_path = file
            .watchdog_pid
            .clone()
            .unwrap_or_else(|| default_watchdog_pid_path(&runtime_dir));
        Self {
            debug: overrides
                .debug
                .or(section.debug)
                .or(environment.debug)
                .unwrap_or_else(default_debug),
            disk: overrides
                .disk
                .or(section.disk)
                .unwrap_or_else(default_disk),
            console: overrides
                .console
                .or(section.console)
                .unwrap_or_else(default_console),
            log_format: section.log_format.unwrap_or_default(),
            log_dir: section.log_dir.unwrap_or_else(default_log_dir),
            mode,
            runtime_dir,
            watchdog_pid_path,
        }
    }

    /// Parses [`Config::mode`] through the mode registry.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError::InvalidMode`] for unknown names.
    pub fn resolve_mode(&self) -> Result<Mode, ModeError> {
        parse_mode(&self.mode)
    }

    /// Variants the configured mode instantiates.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError::InvalidMode`] for unknown names.
    pub fn variants(&self) -> Result<&'static [Variant], ModeError> {
        self.resolve_mode().map(Mode::variants)
    }

    /// Service name used for log files: `pytables-server-<mode>` for a valid
    /// mode, `pytables-server` otherwise.
    #[must_use]
    pub fn service_name(&self) -> String {
        match self.resolve_mode() {
            Ok(mode) => format!("{SERVICE_NAME}-{mode}"),
            Err(_) => SERVICE_NAME.to_owned(),
        }
    }
}

/// Configuration file consulted for `overrides` and `environment`.
#[must_use]
pub fn config_path(overrides: &ConfigOverrides, environment: &Environment) -> Utf8PathBuf {
    overrides
        .config_path
        .clone()
        .or_else(|| environment.config_path.clone())
        .unwrap_or_else(|| Utf8Path::new(DEFAULT_CONFIG_PATH).to_path_buf())
}
