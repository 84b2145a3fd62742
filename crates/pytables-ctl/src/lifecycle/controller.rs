//! High-level orchestration for daemon lifecycle commands.
//!
//! This module wires the start/stop/status flows together and composes them
//! into the restart verbs, so `pytables` drives a single entrypoint when
//! interacting with `pytables-server`.

use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use pytables_config::{PidState, RuntimePaths, probe, read_health};

use super::error::LifecycleError;
use super::monitoring::wait_for_ready;
use super::shutdown::{ProcessSignaller, SystemSignaller, clear_leftovers, wait_for_shutdown};
use super::spawning::{DaemonLauncher, SystemLauncher};
use super::types::{LifecycleCommand, LifecycleContext, LifecycleOutput};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// `status` exit code when a PID file names a dead process.
const EXIT_STALE_PID: u8 = 1;
/// `status` exit code when the daemon is not running.
const EXIT_STOPPED: u8 = 3;

/// Production lifecycle controller.
pub type SystemLifecycle = LifecycleController<SystemLauncher, SystemSignaller>;

/// Runs lifecycle verbs with pluggable process launching and signalling.
#[derive(Debug, Clone)]
pub struct LifecycleController<L, S> {
    launcher: L,
    signaller: S,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Default for SystemLifecycle {
    fn default() -> Self {
        Self::new(SystemLauncher::default(), SystemSignaller)
    }
}

impl<L: DaemonLauncher, S: ProcessSignaller> LifecycleController<L, S> {
    /// Controller using the default startup and shutdown timeouts.
    pub const fn new(launcher: L, signaller: S) -> Self {
        Self {
            launcher,
            signaller,
            startup_timeout: STARTUP_TIMEOUT,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Overrides how long `start` and `stop` wait for the daemon.
    #[must_use]
    pub fn with_timeouts(mut self, startup: Duration, shutdown: Duration) -> Self {
        self.startup_timeout = startup;
        self.shutdown_timeout = shutdown;
        self
    }

    /// Executes `command`.
    ///
    /// # Errors
    ///
    /// Returns the first [`LifecycleError`] raised by the verb; see
    /// [`LifecycleError::exit_code`] for the resulting exit status.
    pub fn handle<W: Write, E: Write>(
        &self,
        command: LifecycleCommand,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match command {
            LifecycleCommand::Start => self.start(context, output),
            LifecycleCommand::Stop => self.stop(context, output),
            LifecycleCommand::Status => Self::status(context, output),
            LifecycleCommand::Restart | LifecycleCommand::Reload => {
                self.restart(context, output)
            }
            LifecycleCommand::Condrestart => self.condrestart(context, output),
        }
    }

    fn start<W: Write, E: Write>(
        &self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let mode = context.config.resolve_mode()?;
        let paths = RuntimePaths::from_config(context.config)?;
        if let PidState::Live(pid) = probe(paths.watchdog_pid_path())? {
            output.stdout_line(format_args!(
                "watchdog (pid {pid}) is running; leaving the start to it"
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        if let PidState::Live(pid) = probe(paths.pid_path())? {
            output.stdout_line(format_args!(
                "pytables-server is already running (pid {pid})"
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        // A crashed daemon keeps its `failed` snapshot for `status`; it must
        // not be mistaken for the new daemon's report.
        clear_leftovers(&paths)?;
        let started_at = SystemTime::now();
        let mut child = self.launcher.launch(context.forwarded_arguments)?;
        let snapshot = wait_for_ready(&paths, &mut child, started_at, self.startup_timeout)?;
        output.stdout_line(format_args!(
            "pytables-server ready (pid {}) in mode {mode}",
            snapshot.pid
        ))?;
        output.stderr_line(format_args!(
            "runtime artefacts stored under {}",
            paths.runtime_dir()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    fn stop<W: Write, E: Write>(
        &self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config);
        if let PidState::Live(pid) = probe(paths.watchdog_pid_path())? {
            output.stderr_line(format_args!(
                "warning: watchdog (pid {pid}) is running and may restart the daemon"
            ))?;
        }
        let PidState::Live(pid) = probe(paths.pid_path())? else {
            if paths.runtime_dir().is_dir() && clear_leftovers(&paths)? {
                output.stderr_line(format_args!(
                    "removed stale runtime files from {}",
                    paths.runtime_dir()
                ))?;
            }
            output.stdout_line(format_args!("pytables-server is not running"))?;
            return Ok(ExitCode::SUCCESS);
        };
        self.signaller.terminate(pid)?;
        wait_for_shutdown(&paths, pid, &self.signaller, self.shutdown_timeout)?;
        clear_leftovers(&paths)?;
        output.stdout_line(format_args!("pytables-server (pid {pid}) stopped"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config);
        match probe(paths.pid_path())? {
            PidState::Live(pid) => {
                match read_health(paths.health_path()) {
                    Ok(Some(snapshot)) => output.stdout_line(format_args!(
                        "pytables-server is running (pid {pid}, {}, mode {})",
                        snapshot.status, snapshot.mode
                    ))?,
                    Ok(None) | Err(_) => output.stdout_line(format_args!(
                        "pytables-server is running (pid {pid})"
                    ))?,
                }
                Ok(ExitCode::SUCCESS)
            }
            PidState::Stale(pid) => {
                output.stdout_line(format_args!(
                    "pytables-server is dead but pid file {} names pid {pid}",
                    paths.pid_path()
                ))?;
                Ok(ExitCode::from(EXIT_STALE_PID))
            }
            PidState::Corrupt => {
                output.stdout_line(format_args!(
                    "pytables-server is dead but pid file {} is unreadable",
                    paths.pid_path()
                ))?;
                Ok(ExitCode::from(EXIT_STALE_PID))
            }
            PidState::Absent => {
                output.stdout_line(format_args!("pytables-server is stopped"))?;
                Ok(ExitCode::from(EXIT_STOPPED))
            }
        }
    }

    fn restart<W: Write, E: Write>(
        &self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        context.config.resolve_mode()?;
        self.stop(context, output)?;
        self.start(context, output)
    }

    fn condrestart<W: Write, E: Write>(
        &self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config);
        if probe(paths.pid_path())?.is_live() {
            return self.restart(context, output);
        }
        output.stdout_line(format_args!(
            "pytables-server is not running; nothing to restart"
        ))?;
        Ok(ExitCode::SUCCESS)
    }
}
