//! Entry point shared by the binary and the integration tests.
//!
//! Parses the command line, loads the layered configuration, installs
//! telemetry and runs the daemon, then maps the outcome onto an exit code:
//! `2` for an invalid mode or a usage error, `0` when another daemon already
//! serves, `1` for any other failure.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pytables_config::Config;
use tracing::{error, info};

use crate::cli::ServerCli;
use crate::process::{LaunchError, run_daemon};
use crate::telemetry;

const FRONTEND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::frontend");

/// Exit status for an unknown mode.
const EXIT_INVALID_MODE: u8 = 2;

/// Runs `pytables-server` with `args` (program name first).
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match ServerCli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let rendered = error.render();
            if error.use_stderr() {
                let _ = write!(stderr, "{rendered}");
            } else {
                let _ = write!(stdout, "{rendered}");
            }
            return u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from);
        }
    };

    let config = match Config::load(&cli.config.overrides()) {
        Ok(config) => config,
        Err(error) => {
            let _ = writeln!(stderr, "pytables-server: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = telemetry::initialise(&config) {
        let _ = writeln!(stderr, "pytables-server: {error}");
        return ExitCode::FAILURE;
    }

    match run_daemon(&config, cli.foreground) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LaunchError::AlreadyRunning { pid }) => {
            info!(
                target: FRONTEND_TARGET,
                pid,
                "daemon already running, not starting"
            );
            ExitCode::SUCCESS
        }
        Err(LaunchError::Mode(source)) => {
            error!(
                target: FRONTEND_TARGET,
                error = %source,
                "could not start daemon: invalid mode"
            );
            if !config.console {
                let _ = writeln!(stderr, "pytables-server: {source}");
            }
            ExitCode::from(EXIT_INVALID_MODE)
        }
        Err(failure) => {
            error!(
                target: FRONTEND_TARGET,
                error = %failure,
                "{}",
                failed_action(&failure)
            );
            // The console layer already reported it. Otherwise this only
            // reaches a terminal when the failure happened before daemonising.
            if !config.console {
                let _ = writeln!(stderr, "pytables-server: {failure}");
            }
            ExitCode::FAILURE
        }
    }
}

const fn failed_action(error: &LaunchError) -> &'static str {
    match error {
        LaunchError::Scheduler { .. } => "daemon terminated with an error",
        LaunchError::Daemonize { .. } => "could not daemonise",
        _ => "could not start daemon",
    }
}
