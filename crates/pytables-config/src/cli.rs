//! Configuration flags shared by `pytables-server` and `pytables`.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use clap::Args;

use crate::config::ConfigOverrides;

/// Command-line flags feeding the top configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ConfigArgs {
    /// Operating mode: ipv4, ipv6 or all.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,
    /// Enable verbose logging.
    #[arg(long, overrides_with = "no_debug")]
    pub debug: bool,
    /// Disable verbose logging, even when `PYTABLES_DEBUG=1`.
    #[arg(long = "no-debug", overrides_with = "debug")]
    pub no_debug: bool,
    /// Write logs to the rotating log file.
    #[arg(long, overrides_with = "no_disk")]
    pub disk: bool,
    /// Do not write logs to disk.
    #[arg(long = "no-disk", overrides_with = "disk")]
    pub no_disk: bool,
    /// Write logs to standard error.
    #[arg(long)]
    pub console: bool,
    /// Configuration file to read instead of the default.
    #[arg(long, value_name = "PATH")]
    pub config_path: Option<Utf8PathBuf>,
    /// Directory for PID, lock, health and socket files.
    #[arg(long, value_name = "PATH")]
    pub runtime_dir: Option<Utf8PathBuf>,
}

impl ConfigArgs {
    /// Overrides represented by these flags.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.clone(),
            debug: flag_pair(self.debug, self.no_debug),
            disk: flag_pair(self.disk, self.no_disk),
            console: self.console.then_some(true),
            config_path: self.config_path.clone(),
            runtime_dir: self.runtime_dir.clone(),
        }
    }

    /// Re-renders the flags so they can be forwarded to another process.
    #[must_use]
    pub fn to_arguments(&self) -> Vec<OsString> {
        let mut arguments = Vec::new();
        if let Some(mode) = &self.mode {
            arguments.push(OsString::from("--mode"));
            arguments.push(OsString::from(mode));
        }
        match flag_pair(self.debug, self.no_debug) {
            Some(true) => arguments.push(OsString::from("--debug")),
            Some(false) => arguments.push(OsString::from("--no-debug")),
            None => {}
        }
        match flag_pair(self.disk, self.no_disk) {
            Some(true) => arguments.push(OsString::from("--disk")),
            Some(false) => arguments.push(OsString::from("--no-disk")),
            None => {}
        }
        if self.console {
            arguments.push(OsString::from("--console"));
        }
        if let Some(path) = &self.config_path {
            arguments.push(OsString::from("--config-path"));
            arguments.push(OsString::from(path.as_str()));
        }
        if let Some(path) = &self.runtime_dir {
            arguments.push(OsString::from("--runtime-dir"));
            arguments.push(OsString::from(path.as_str()));
        }
        arguments
    }
}

const fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}
