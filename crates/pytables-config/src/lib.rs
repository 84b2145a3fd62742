//! Shared configuration for the pytables service supervisor.
//!
//! This crate owns everything the daemon (`pytables-server`) and the control
//! tool (`pytables`) must agree on: the mode registry, the layered
//! configuration record, the shared command-line flags, the location of the
//! runtime artefacts and the formats of the PID and health files.

mod cli;
mod config;
mod defaults;
mod file;
mod health;
mod logging;
mod mode;
mod pidfile;
mod runtime;

pub use cli::ConfigArgs;
pub use config::{Config, ConfigError, ConfigOverrides, Environment, config_path, debug_from_env};
pub use defaults::{
    CONFIG_ENV_VAR, DEBUG_ENV_VAR, DEFAULT_CONFIG_PATH, FOREGROUND_ENV_VAR, IDLE_TIMEOUT,
    RUNTIME_DIR_ENV_VAR, SERVICE_NAME, SHUTDOWN_GRACE, default_log_dir, default_runtime_dir,
};
pub use file::{ConfigFile, Section};
pub use health::{DaemonStatus, HealthError, HealthSnapshot, read_health};
pub use logging::LogFormat;
pub use mode::{Mode, ModeError, Variant, parse_mode, resolve};
pub use pidfile::{PidFileError, PidState, probe, process_alive, read_pid};
pub use runtime::{RuntimePaths, RuntimePathsError};
