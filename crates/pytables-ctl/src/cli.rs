//! Command-line surface of `pytables`.

use clap::{Parser, ValueEnum};
use pytables_config::ConfigArgs;

use crate::lifecycle::LifecycleCommand;

/// Controls the `pytables-server` daemon.
#[derive(Debug, Parser)]
#[command(name = "pytables", version, about)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) config: ConfigArgs,
    /// Lifecycle action to perform.
    #[arg(value_enum, value_name = "ACTION")]
    pub(crate) action: DaemonAction,
}

/// Verbs accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DaemonAction {
    /// Start the daemon unless it is already running.
    Start,
    /// Stop a running daemon.
    Stop,
    /// Report whether the daemon is running.
    Status,
    /// Stop and start the daemon.
    Restart,
    /// Same as restart.
    Reload,
    /// Restart the daemon only if it is running.
    Condrestart,
}

impl From<DaemonAction> for LifecycleCommand {
    fn from(action: DaemonAction) -> Self {
        match action {
            DaemonAction::Start => Self::Start,
            DaemonAction::Stop => Self::Stop,
            DaemonAction::Status => Self::Status,
            DaemonAction::Restart => Self::Restart,
            DaemonAction::Reload => Self::Reload,
            DaemonAction::Condrestart => Self::Condrestart,
        }
    }
}
