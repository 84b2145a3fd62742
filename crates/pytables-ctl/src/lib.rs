//! The `pytables` control tool.
//!
//! `pytables [flags] <start|stop|status|restart|reload|condrestart>` drives
//! the `pytables-server` daemon through its runtime files: it spawns the
//! server and waits for a fresh `ready` health snapshot, signals the PID
//! recorded in the PID file, and reports status with init-script exit
//! codes. Configuration flags are resolved here and forwarded verbatim to
//! the server.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pytables_config::Config;

mod cli;
mod errors;
pub mod lifecycle;

#[cfg(test)]
mod tests;

use cli::Cli;
use errors::AppError;
use lifecycle::{
    DaemonLauncher, LifecycleCommand, LifecycleContext, LifecycleController, LifecycleOutput,
    ProcessSignaller, SystemLifecycle,
};

/// Runs the control tool using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_controller(args, stdout, stderr, &SystemLifecycle::default())
}

/// Runs the control tool with an explicit lifecycle controller.
#[must_use]
pub fn run_with_controller<I, W, E, L, S>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    controller: &LifecycleController<L, S>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: DaemonLauncher,
    S: ProcessSignaller,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            let _ = write!(stdout, "{}", error.render());
            return ExitCode::SUCCESS;
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };
    match execute(&cli, stdout, stderr, controller) {
        Ok(exit_code) => exit_code,
        Err(error) => report(stderr, &error),
    }
}

fn execute<W, E, L, S>(
    cli: &Cli,
    stdout: &mut W,
    stderr: &mut E,
    controller: &LifecycleController<L, S>,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
    L: DaemonLauncher,
    S: ProcessSignaller,
{
    let config = Config::load(&cli.config.overrides())?;
    let forwarded_arguments = cli.config.to_arguments();
    let command = LifecycleCommand::from(cli.action);
    let context = LifecycleContext {
        config: &config,
        forwarded_arguments: &forwarded_arguments,
    };
    let mut output = LifecycleOutput::new(stdout, stderr);
    controller
        .handle(command, context, &mut output)
        .map_err(|source| AppError::Lifecycle { command, source })
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    match error {
        AppError::CliUsage(usage) => {
            let _ = write!(stderr, "{}", usage.render());
        }
        _ => {
            let _ = writeln!(stderr, "pytables: {error}");
        }
    }
    ExitCode::from(error.exit_code())
}
