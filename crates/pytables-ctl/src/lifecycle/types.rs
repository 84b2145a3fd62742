//! Lifecycle command types and output abstractions.
//!
//! Defines the payloads and IO wrappers shared across lifecycle commands so the
//! controller can remain agnostic of concrete writers.

use std::ffi::OsString;
use std::fmt;
use std::io::Write;

use pytables_config::Config;

use super::LifecycleError;

/// Supported lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Launch the daemon unless one is already running.
    Start,
    /// Terminate the running daemon.
    Stop,
    /// Probe the daemon without touching anything.
    Status,
    /// Stop, then start.
    Restart,
    /// Alias of [`LifecycleCommand::Restart`].
    Reload,
    /// Restart only when the daemon is running.
    Condrestart,
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => formatter.write_str("start"),
            Self::Stop => formatter.write_str("stop"),
            Self::Status => formatter.write_str("status"),
            Self::Restart => formatter.write_str("restart"),
            Self::Reload => formatter.write_str("reload"),
            Self::Condrestart => formatter.write_str("condrestart"),
        }
    }
}

/// Shared configuration context available to lifecycle handlers.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleContext<'a> {
    /// Configuration resolved for this invocation.
    pub config: &'a Config,
    /// Configuration flags forwarded verbatim to `pytables-server`.
    pub forwarded_arguments: &'a [OsString],
}

/// Output handle abstracting over stdout/stderr writers.
pub struct LifecycleOutput<W: Write, E: Write> {
    /// Destination for progress and status lines.
    pub stdout: W,
    /// Destination for warnings and diagnostics.
    pub stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    /// Wraps the two writers.
    pub const fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    /// Writes one line to stdout and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Io`] when the writer fails.
    pub fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stdout.write_fmt(args).map_err(LifecycleError::Io)?;
        self.stdout.write_all(b"\n").map_err(LifecycleError::Io)?;
        self.stdout.flush().map_err(LifecycleError::Io)
    }

    /// Writes one line to stderr and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Io`] when the writer fails.
    pub fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        self.stderr.write_fmt(args).map_err(LifecycleError::Io)?;
        self.stderr.write_all(b"\n").map_err(LifecycleError::Io)?;
        self.stderr.flush().map_err(LifecycleError::Io)
    }
}
